//! Ledger client contract
//!
//! The engine never signs or builds raw transactions itself. Everything that
//! touches the network goes through [`LedgerClient`], so the JSON-RPC client
//! can be swapped for a test double.

pub mod rpc;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;

pub use rpc::JsonRpcLedgerClient;
pub use types::{
    drops_to_xrp, format_issued_value, xrp_to_drops, AccountInfo, Amount, Asset, BookOffer,
    IssuedAmount, LedgerTransaction, SubmitOutcome, TrustLine, WalletKeys, SUCCESS_CODE,
};

/// Operations consumed from the ledger
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Balances and sequence of an account
    async fn account_info(&self, address: &str) -> Result<AccountInfo>;

    /// Open offers that give `want` in exchange for `have`, best first
    async fn order_book(&self, want: &Asset, have: &Asset, limit: u32) -> Result<Vec<BookOffer>>;

    /// Sign with `wallet`, submit, and wait until the transaction is final
    async fn submit_and_wait(
        &self,
        tx: &LedgerTransaction,
        wallet: &WalletKeys,
    ) -> Result<SubmitOutcome>;

    /// Create (and on test networks, fund) a fresh account
    async fn generate_wallet(&self) -> Result<WalletKeys>;

    /// Derive the account for an existing seed
    async fn wallet_from_seed(&self, seed: &str) -> Result<WalletKeys>;
}
