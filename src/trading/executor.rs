//! Order execution
//!
//! Buys and sells are offers against the base asset. A buy first makes
//! sure the wallet can hold the asset, prices the order from the book, and
//! submits. Only `tesSUCCESS` counts as a filled order; submissions are never
//! retried since the price would be stale.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::pricing::{estimate_buy, estimate_sell, Confidence, PriceEstimate};
use crate::config::TradingConfig;
use crate::error::{Error, Result};
use crate::ledger::{
    Amount, Asset, IssuedAmount, LedgerClient, LedgerTransaction, SubmitOutcome, WalletKeys,
};
use crate::store::types::{is_classic_address, validate_buy_amount, validate_slippage};
use crate::store::{ConfigStore, OwnerId};

/// Trust-line results that do not block a buy
const TRUST_LINE_NON_FATAL: &[&str] = &["tecNO_LINE_REDUNDANT", "tecNO_LINE_INSUF_RESERVE"];

/// Parameters of one buy
#[derive(Debug, Clone, PartialEq)]
pub struct BuyOrder {
    pub currency: String,
    pub issuer: String,
    /// Base units to spend
    pub spend: f64,
    pub slippage: f64,
    /// Explicit transaction fee in base units
    pub max_fee: Option<f64>,
    pub mev_protect: bool,
}

/// Filled order
#[derive(Debug, Clone)]
pub struct OrderReceipt {
    pub hash: Option<String>,
    pub result_code: String,
    /// What was offered (base units for buys, asset units for sells)
    pub amount_in: f64,
    /// What was asked for in return
    pub amount_out: f64,
    pub confidence: Confidence,
}

impl OrderReceipt {
    fn new(outcome: SubmitOutcome, amount_in: f64, estimate: &PriceEstimate) -> Self {
        Self {
            hash: outcome.hash,
            result_code: outcome.result_code,
            amount_in,
            amount_out: estimate.amount_out,
            confidence: estimate.confidence,
        }
    }
}

pub struct OrderExecutor {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<ConfigStore>,
    config: TradingConfig,
}

impl OrderExecutor {
    pub fn new(ledger: Arc<dyn LedgerClient>, store: Arc<ConfigStore>, config: TradingConfig) -> Self {
        Self {
            ledger,
            store,
            config,
        }
    }

    async fn wallet_keys(&self, owner: OwnerId) -> Result<WalletKeys> {
        self.store
            .wallet(owner)
            .await
            .map(|w| w.keys())
            .ok_or(Error::WalletNotFound(owner))
    }

    /// Buy `order.currency.issuer` for `order.spend` base units
    pub async fn buy(&self, owner: OwnerId, order: &BuyOrder) -> Result<OrderReceipt> {
        let wallet = self.wallet_keys(owner).await?;
        validate_buy_amount(order.spend)?;
        validate_slippage(order.slippage)?;

        self.ensure_trust_line(&wallet, &order.currency, &order.issuer, order.max_fee)
            .await;

        let asset = Asset::issued(&order.currency, &order.issuer);
        let top = match self
            .ledger
            .order_book(&asset, &Asset::Base, self.config.book_depth)
            .await
        {
            Ok(offers) => offers.into_iter().next(),
            Err(e) => {
                warn!("Order book query for {} failed: {}", asset, e);
                None
            }
        };
        let estimate = estimate_buy(
            top.as_ref(),
            order.spend,
            order.slippage,
            self.config.fallback_rate,
        );

        self.mev_delay(order.mev_protect).await;

        let tx = LedgerTransaction::offer_create(
            &wallet.address,
            Amount::from_xrp(order.spend),
            Amount::Issued(IssuedAmount::new(
                &order.currency,
                &order.issuer,
                estimate.amount_out,
            )),
        )
        .with_max_fee(order.max_fee);

        info!(
            "Buying ~{} {} for {} XRP (owner {})",
            estimate.amount_out, asset, order.spend, owner
        );
        let outcome = self.submit(&tx, &wallet).await?;
        info!(
            "Buy of {} filled for owner {}: {:?}",
            asset, owner, outcome.hash
        );
        Ok(OrderReceipt::new(outcome, order.spend, &estimate))
    }

    /// Sell `percentage` (0-100] of the wallet's balance of `currency.issuer`
    pub async fn sell(
        &self,
        owner: OwnerId,
        currency: &str,
        issuer: &str,
        percentage: f64,
        max_fee: Option<f64>,
    ) -> Result<OrderReceipt> {
        if !(percentage.is_finite() && percentage <= 100.0) {
            return Err(Error::InvalidInput(format!(
                "sell percentage must be at most 100, got {}",
                percentage
            )));
        }
        let wallet = self.wallet_keys(owner).await?;

        let account = self.ledger.account_info(&wallet.address).await?;
        let balance = account.balance_of(currency, issuer);
        if balance <= 0.0 {
            warn!("Owner {} has no {}.{} to sell", owner, currency, issuer);
            return Err(Error::NoBalance {
                currency: currency.to_string(),
                issuer: issuer.to_string(),
            });
        }

        let amount = balance * percentage / 100.0;
        if amount <= 0.0 {
            warn!("Computed sell amount {} is not positive", amount);
            return Err(Error::InvalidSellAmount(amount));
        }

        let asset = Asset::issued(currency, issuer);
        let offers = self
            .ledger
            .order_book(&Asset::Base, &asset, self.config.book_depth)
            .await?;
        let estimate = estimate_sell(offers.first(), amount)?;

        let mev_protect = self.store.mev_protection(owner).await;
        self.mev_delay(mev_protect).await;

        let tx = LedgerTransaction::offer_create(
            &wallet.address,
            Amount::Issued(IssuedAmount::new(currency, issuer, amount)),
            Amount::from_xrp(estimate.amount_out),
        )
        .with_max_fee(max_fee);

        info!(
            "Selling {} {} ({}%) for ~{} XRP (owner {})",
            amount, asset, percentage, estimate.amount_out, owner
        );
        let outcome = self.submit(&tx, &wallet).await?;
        info!("Sell of {} filled for owner {}: {:?}", asset, owner, outcome.hash);
        Ok(OrderReceipt::new(outcome, amount, &estimate))
    }

    /// Send `amount` base units to `destination`
    pub async fn transfer(
        &self,
        owner: OwnerId,
        destination: &str,
        amount: f64,
    ) -> Result<SubmitOutcome> {
        if !is_classic_address(destination) {
            return Err(Error::InvalidInput(format!(
                "invalid destination address: {}",
                destination
            )));
        }
        if !(amount > 0.0 && amount.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "transfer amount must be positive, got {}",
                amount
            )));
        }
        let wallet = self.wallet_keys(owner).await?;

        let tx = LedgerTransaction::payment(&wallet.address, destination, Amount::from_xrp(amount));
        info!("Sending {} XRP from owner {} to {}", amount, owner, destination);
        self.submit(&tx, &wallet).await
    }

    /// Authorize holding the asset. Failures are logged, never fatal.
    async fn ensure_trust_line(
        &self,
        wallet: &WalletKeys,
        currency: &str,
        issuer: &str,
        max_fee: Option<f64>,
    ) {
        let tx = LedgerTransaction::trust_set(
            &wallet.address,
            currency,
            issuer,
            &self.config.trust_line_limit,
        )
        .with_max_fee(max_fee);

        match self.ledger.submit_and_wait(&tx, wallet).await {
            Ok(outcome) if outcome.is_success() => {
                info!("Trust line set for {}.{}", currency, issuer);
            }
            Ok(outcome) if TRUST_LINE_NON_FATAL.contains(&outcome.result_code.as_str()) => {
                info!(
                    "Trust line for {}.{}: {}, continuing",
                    currency, issuer, outcome.result_code
                );
            }
            Ok(outcome) => {
                warn!(
                    "Trust line for {}.{} failed with {}, continuing: {}",
                    currency, issuer, outcome.result_code, outcome.raw
                );
            }
            Err(e) => {
                warn!(
                    "Trust line for {}.{} failed, continuing: {}",
                    currency, issuer, e
                );
            }
        }
    }

    async fn mev_delay(&self, enabled: bool) {
        if enabled && self.config.mev_delay_ms > 0 {
            info!("MEV protection: delaying submission {}ms", self.config.mev_delay_ms);
            tokio::time::sleep(Duration::from_millis(self.config.mev_delay_ms)).await;
        }
    }

    /// Submit and require the definitive success code
    async fn submit(&self, tx: &LedgerTransaction, wallet: &WalletKeys) -> Result<SubmitOutcome> {
        let outcome = self.ledger.submit_and_wait(tx, wallet).await?;
        if outcome.is_success() {
            return Ok(outcome);
        }

        error!(
            "{} rejected with {}: {}",
            tx.kind(),
            outcome.result_code,
            outcome.raw
        );
        Err(Error::OrderRejected {
            code: outcome.result_code,
            raw: outcome.raw.to_string(),
        })
    }
}
