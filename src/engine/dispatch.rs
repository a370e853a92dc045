//! Liquidity event to buy order dispatch

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::filter::matches;
use crate::store::{ConfigStore, EnabledConfig};
use crate::stream::{LiquidityEvent, TransactionSink};
use crate::trading::{BuyOrder, OrderExecutor, OrderReceipt};

/// Matches liquidity events against enabled configs and spawns a buy per match.
///
/// Buys run as independent tasks; the caller only waits for the config
/// snapshot, never for an order.
pub struct SnipeDispatcher {
    store: Arc<ConfigStore>,
    executor: Arc<OrderExecutor>,
}

impl SnipeDispatcher {
    pub fn new(store: Arc<ConfigStore>, executor: Arc<OrderExecutor>) -> Self {
        Self { store, executor }
    }

    /// Spawn a buy for every enabled config matching `event`
    pub async fn dispatch(&self, event: &LiquidityEvent) -> Vec<JoinHandle<Result<OrderReceipt>>> {
        let mut handles = Vec::new();

        for EnabledConfig { owner_id, config } in self.store.enabled_configs().await {
            if !matches(&config, &event.currency, &event.issuer, &event.source_account) {
                continue;
            }

            let order = BuyOrder {
                currency: event.currency.clone(),
                issuer: event.issuer.clone(),
                spend: config.buy_amount,
                slippage: config.slippage,
                max_fee: config.max_fee,
                mev_protect: self.store.mev_protection(owner_id).await,
            };
            info!(
                "Config '{}' (owner {}) matched {}.{}, buying {} XRP",
                config.name, owner_id, order.currency, order.issuer, order.spend
            );

            let executor = self.executor.clone();
            let config_name = config.name;
            handles.push(tokio::spawn(async move {
                let result = executor.buy(owner_id, &order).await;
                match &result {
                    Ok(receipt) => info!(
                        "Snipe for '{}' filled: {} ({:?})",
                        config_name, receipt.result_code, receipt.hash
                    ),
                    Err(e) => error!("Snipe for '{}' failed: {}", config_name, e),
                }
                result
            }));
        }

        if handles.is_empty() {
            debug!("No config matched {}.{}", event.currency, event.issuer);
        }
        handles
    }
}

#[async_trait]
impl TransactionSink for SnipeDispatcher {
    async fn on_liquidity(&self, event: LiquidityEvent) {
        let handles = self.dispatch(&event).await;
        debug!("Dispatched {} snipe(s)", handles.len());
    }
}
