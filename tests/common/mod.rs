//! Common test utilities for the sniper integration tests
//!
//! Provides a recording ledger double, a scripted feed connector, and frame
//! builders.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;

use xrpl_sniper::config::Config;
use xrpl_sniper::error::{Error, Result};
use xrpl_sniper::ledger::{
    AccountInfo, Amount, Asset, BookOffer, IssuedAmount, LedgerClient, LedgerTransaction,
    SubmitOutcome, TrustLine, WalletKeys,
};
use xrpl_sniper::store::{ConfigStore, MemoryBackend};
use xrpl_sniper::stream::{StreamConnection, StreamConnector};
use xrpl_sniper::SniperEngine;

pub const ISSUER: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";
pub const MAKER: &str = "rPEPPER7kfTD9w2To4CQk6UCfuHM9c6GDY";
pub const BUYER: &str = "rLHzPsX6oXkzU2qL12kHCH8G8cnZv1rBJh";
pub const SUBSCRIBE_ACK: &str =
    r#"{"id":1,"status":"success","type":"response","result":{"ledger_index":100}}"#;

pub fn buyer_keys() -> WalletKeys {
    WalletKeys {
        address: BUYER.to_string(),
        seed: "sEdTestSeed".to_string(),
    }
}

/// Ledger double that records every submission
#[derive(Default)]
pub struct RecordingLedger {
    submissions: Mutex<Vec<LedgerTransaction>>,
    book_queries: Mutex<Vec<(Asset, Asset)>>,
    /// Top offer for asset-for-base queries
    pub buy_book: Mutex<Option<BookOffer>>,
    /// Top offer for base-for-asset queries
    pub sell_book: Mutex<Option<BookOffer>>,
    pub lines: Mutex<Vec<TrustLine>>,
    pub trust_code: Mutex<Option<String>>,
    pub offer_code: Mutex<Option<String>>,
}

impl RecordingLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn submissions(&self) -> Vec<LedgerTransaction> {
        self.submissions.lock().unwrap().clone()
    }

    /// Submitted offers as (gives, wants)
    pub fn offers(&self) -> Vec<(Amount, Amount)> {
        self.submissions()
            .into_iter()
            .filter_map(|tx| match tx {
                LedgerTransaction::OfferCreate(offer) => Some((offer.taker_gets, offer.taker_pays)),
                _ => None,
            })
            .collect()
    }

    pub fn book_queries(&self) -> Vec<(Asset, Asset)> {
        self.book_queries.lock().unwrap().clone()
    }

    pub fn set_buy_book(&self, offer: BookOffer) {
        *self.buy_book.lock().unwrap() = Some(offer);
    }

    pub fn set_sell_book(&self, offer: BookOffer) {
        *self.sell_book.lock().unwrap() = Some(offer);
    }

    pub fn set_balance(&self, currency: &str, issuer: &str, balance: f64) {
        self.lines.lock().unwrap().push(TrustLine {
            currency: currency.to_string(),
            issuer: issuer.to_string(),
            balance,
            limit: 1e16,
        });
    }
}

#[async_trait]
impl LedgerClient for RecordingLedger {
    async fn account_info(&self, address: &str) -> Result<AccountInfo> {
        Ok(AccountInfo {
            address: address.to_string(),
            xrp_balance: 100.0,
            sequence: 1,
            lines: self.lines.lock().unwrap().clone(),
        })
    }

    async fn order_book(&self, want: &Asset, have: &Asset, _limit: u32) -> Result<Vec<BookOffer>> {
        self.book_queries
            .lock()
            .unwrap()
            .push((want.clone(), have.clone()));
        let top = match have {
            Asset::Base => self.buy_book.lock().unwrap().clone(),
            Asset::Issued { .. } => self.sell_book.lock().unwrap().clone(),
        };
        Ok(top.into_iter().collect())
    }

    async fn submit_and_wait(
        &self,
        tx: &LedgerTransaction,
        _wallet: &WalletKeys,
    ) -> Result<SubmitOutcome> {
        self.submissions.lock().unwrap().push(tx.clone());
        let code = match tx {
            LedgerTransaction::TrustSet(_) => self.trust_code.lock().unwrap().clone(),
            _ => self.offer_code.lock().unwrap().clone(),
        }
        .unwrap_or_else(|| "tesSUCCESS".to_string());

        Ok(SubmitOutcome {
            hash: Some(format!("HASH{}", self.submissions.lock().unwrap().len())),
            raw: serde_json::json!({ "meta": { "TransactionResult": code } }),
            result_code: code,
        })
    }

    async fn generate_wallet(&self) -> Result<WalletKeys> {
        Ok(buyer_keys())
    }

    async fn wallet_from_seed(&self, seed: &str) -> Result<WalletKeys> {
        if seed.starts_with('s') {
            Ok(WalletKeys {
                address: BUYER.to_string(),
                seed: seed.to_string(),
            })
        } else {
            Err(Error::InvalidSeed(seed.to_string()))
        }
    }
}

/// One scripted connect attempt
#[derive(Debug, Clone)]
pub enum Session {
    /// Connect fails
    Refuse,
    /// Connect succeeds, replays frames, then closes
    Close(Vec<String>),
    /// Connect succeeds, replays frames, then stays open
    Hold(Vec<String>),
}

/// Connector that plays back sessions in order and records connect times.
/// Once the script is exhausted every connect is refused.
pub struct ScriptedConnector {
    sessions: Mutex<VecDeque<Session>>,
    connects: mpsc::UnboundedSender<Instant>,
    pub sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConnector {
    pub fn new(sessions: Vec<Session>) -> (Arc<Self>, mpsc::UnboundedReceiver<Instant>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                sessions: Mutex::new(sessions.into()),
                connects: tx,
                sent: Arc::new(Mutex::new(Vec::new())),
            }),
            rx,
        )
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn StreamConnection>> {
        let _ = self.connects.send(Instant::now());
        let session = self
            .sessions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Session::Refuse);

        let (frames, hold) = match session {
            Session::Refuse => return Err(Error::StreamConnection("connection refused".into())),
            Session::Close(frames) => (frames, false),
            Session::Hold(frames) => (frames, true),
        };
        Ok(Box::new(ScriptedConnection {
            frames: frames.into(),
            hold,
            sent: self.sent.clone(),
        }))
    }
}

struct ScriptedConnection {
    frames: VecDeque<String>,
    hold: bool,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl StreamConnection for ScriptedConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn next_text(&mut self) -> Result<Option<String>> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(Some(frame));
        }
        if self.hold {
            std::future::pending::<()>().await;
        }
        Ok(None)
    }

    async fn close(&mut self) {}
}

/// Validated offer giving `currency.issuer` for XRP
pub fn liquidity_frame(currency: &str, issuer: &str, account: &str) -> String {
    serde_json::json!({
        "type": "transaction",
        "validated": true,
        "transaction": {
            "TransactionType": "OfferCreate",
            "Account": account,
            "TakerGets": { "currency": currency, "issuer": issuer, "value": "1000000" },
            "TakerPays": "100000000",
            "hash": "FEED01",
        }
    })
    .to_string()
}

pub fn offer(gets: Amount, pays: Amount) -> BookOffer {
    BookOffer {
        account: MAKER.to_string(),
        taker_gets: gets,
        taker_pays: pays,
    }
}

pub fn issued(currency: &str, issuer: &str, value: f64) -> Amount {
    Amount::Issued(IssuedAmount::new(currency, issuer, value))
}

pub fn memory_store() -> Arc<ConfigStore> {
    Arc::new(ConfigStore::load(Box::new(MemoryBackend::default())).unwrap())
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.trading.mev_delay_ms = 0;
    config
}

pub fn engine(
    ledger: Arc<RecordingLedger>,
    connector: Arc<ScriptedConnector>,
    store: Arc<ConfigStore>,
) -> SniperEngine {
    SniperEngine::new(test_config(), ledger, connector, store)
}
