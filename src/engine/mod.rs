//! Sniper engine
//!
//! One instance per process. Owns the store, the executor and the stream
//! monitor, and is the only surface the operator layer calls into.

pub mod dispatch;

use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ledger::{AccountInfo, JsonRpcLedgerClient, LedgerClient, SubmitOutcome, WalletKeys};
use crate::store::types::is_classic_address;
use crate::store::{
    ConfigDraft, ConfigStore, DefaultTradeSettings, JsonFileBackend, OwnerId, SniperConfig, Wallet,
};
use crate::stream::{MonitorState, StreamConnector, StreamMonitor, WsConnector};
use crate::trading::{BuyOrder, OrderExecutor, OrderReceipt};

pub use dispatch::SnipeDispatcher;

/// Snapshot of the engine's running state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunningState {
    /// The receive loop is live. False as soon as `stop_sniper` returns.
    pub is_running: bool,
    /// At least one config is enabled, across all owners
    pub has_enabled_configs: bool,
    pub monitor_state: MonitorState,
    pub last_ledger_index: u64,
}

pub struct SniperEngine {
    config: Config,
    store: Arc<ConfigStore>,
    ledger: Arc<dyn LedgerClient>,
    executor: Arc<OrderExecutor>,
    monitor: StreamMonitor,
    /// Start the monitor when a config mutation leaves one enabled
    auto_start: bool,
}

impl SniperEngine {
    /// Wire an engine from explicit parts; tests pass fakes here
    pub fn new(
        config: Config,
        ledger: Arc<dyn LedgerClient>,
        connector: Arc<dyn StreamConnector>,
        store: Arc<ConfigStore>,
    ) -> Self {
        let executor = Arc::new(OrderExecutor::new(
            ledger.clone(),
            store.clone(),
            config.trading.clone(),
        ));
        let dispatcher = Arc::new(SnipeDispatcher::new(store.clone(), executor.clone()));
        let monitor = StreamMonitor::new(connector, dispatcher, config.stream.clone());

        Self {
            config,
            store,
            ledger,
            executor,
            monitor,
            auto_start: true,
        }
    }

    /// Turn monitor auto-start after config changes on or off.
    ///
    /// One-shot commands turn it off: the process exits right after the
    /// change, so a started monitor would only be torn down again.
    pub fn with_auto_start(mut self, enabled: bool) -> Self {
        self.auto_start = enabled;
        self
    }

    /// Wire the JSON-RPC client, WebSocket feed and JSON file store
    pub fn from_config(config: Config) -> Result<Self> {
        let ledger = Arc::new(JsonRpcLedgerClient::new(config.ledger.clone())?);
        let connector = Arc::new(WsConnector::new(&config.ledger.ws_url, &config.stream));
        let store = Arc::new(ConfigStore::load(Box::new(JsonFileBackend::new(
            &config.storage.data_file,
        )))?);
        Ok(Self::new(config, ledger, connector, store))
    }

    /// Configuration the engine was built from
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Backing store shared with the dispatcher and executor
    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    // Lifecycle

    /// Start monitoring. Returns false if already running.
    pub async fn start_sniper(&self) -> bool {
        self.monitor.start().await
    }

    /// Stop monitoring and wait for the receive loop to exit.
    /// Orders already submitted are left to finish.
    pub async fn stop_sniper(&self) {
        self.monitor.stop().await;
    }

    /// Current lifecycle snapshot
    pub async fn running_state(&self) -> RunningState {
        RunningState {
            is_running: self.monitor.is_running(),
            has_enabled_configs: self.store.has_enabled_configs().await,
            monitor_state: self.monitor.state(),
            last_ledger_index: self.monitor.last_ledger_index(),
        }
    }

    /// Start the monitor if a config is enabled. Never stops it.
    async fn refresh_running_state(&self) {
        if !self.auto_start {
            return;
        }
        if self.store.has_enabled_configs().await && !self.monitor.is_running() {
            info!("Enabled sniper config found, starting monitor");
            self.monitor.start().await;
        }
    }

    // Wallets

    /// Create a fresh wallet (funded on test networks) for `owner`
    pub async fn generate_wallet(&self, owner: OwnerId) -> Result<Wallet> {
        let keys = self.ledger.generate_wallet().await?;
        self.store.set_wallet(owner, keys).await
    }

    /// Import a wallet from its seed
    pub async fn import_wallet(&self, owner: OwnerId, seed: &str) -> Result<Wallet> {
        let keys = self.ledger.wallet_from_seed(seed.trim()).await?;
        self.store.set_wallet(owner, keys).await
    }

    /// Store known keys without contacting the ledger
    pub async fn add_wallet(&self, owner: OwnerId, address: &str, seed: &str) -> Result<Wallet> {
        if !is_classic_address(address) {
            return Err(Error::InvalidInput(format!("invalid address: {}", address)));
        }
        if seed.trim().is_empty() {
            return Err(Error::InvalidSeed("seed is empty".to_string()));
        }
        let keys = WalletKeys {
            address: address.to_string(),
            seed: seed.trim().to_string(),
        };
        self.store.set_wallet(owner, keys).await
    }

    /// The owner's wallet, if one is set
    pub async fn wallet(&self, owner: OwnerId) -> Option<Wallet> {
        self.store.wallet(owner).await
    }

    /// Base balance and issued-asset holdings of the owner's wallet
    pub async fn positions(&self, owner: OwnerId) -> Result<AccountInfo> {
        let wallet = self
            .store
            .wallet(owner)
            .await
            .ok_or(Error::WalletNotFound(owner))?;
        self.ledger.account_info(&wallet.address).await
    }

    /// Send `amount` XRP from the owner's wallet to `destination`
    pub async fn transfer(
        &self,
        owner: OwnerId,
        destination: &str,
        amount: f64,
    ) -> Result<SubmitOutcome> {
        self.executor.transfer(owner, destination, amount).await
    }

    // Sniper configs

    /// Create a new (disabled) config from a draft
    pub async fn create_sniper_config(
        &self,
        owner: OwnerId,
        draft: ConfigDraft,
    ) -> Result<SniperConfig> {
        let result = self
            .store
            .create_sniper_config(
                owner,
                draft,
                self.config.trading.default_buy_amount,
                self.config.trading.default_slippage,
            )
            .await;
        self.refresh_running_state().await;
        result
    }

    /// Insert or replace a complete config
    pub async fn save_sniper_config(&self, owner: OwnerId, config: SniperConfig) -> Result<()> {
        let result = self.store.save_sniper_config(owner, config).await;
        self.refresh_running_state().await;
        result
    }

    /// Apply the fields set in `patch`; the result is re-validated
    pub async fn update_sniper_config(
        &self,
        owner: OwnerId,
        config_id: &str,
        patch: &ConfigDraft,
    ) -> Result<SniperConfig> {
        self.store.update_sniper_config(owner, config_id, patch).await
    }

    /// Enable or disable a config
    pub async fn update_sniper_config_status(
        &self,
        owner: OwnerId,
        config_id: &str,
        enabled: bool,
    ) -> Result<SniperConfig> {
        let result = self.store.set_config_enabled(owner, config_id, enabled).await;
        self.refresh_running_state().await;
        result
    }

    /// Remove a config, returning it. The monitor keeps running.
    pub async fn delete_sniper_config(&self, owner: OwnerId, config_id: &str) -> Result<SniperConfig> {
        let result = self.store.delete_sniper_config(owner, config_id).await;
        self.refresh_running_state().await;
        result
    }

    /// One config by id, `ConfigNotFound` if the owner has no such config
    pub async fn sniper_config(&self, owner: OwnerId, config_id: &str) -> Result<SniperConfig> {
        self.store
            .sniper_config(owner, config_id)
            .await
            .ok_or_else(|| Error::ConfigNotFound(config_id.to_string()))
    }

    /// All of an owner's configs, oldest first
    pub async fn sniper_configs(&self, owner: OwnerId) -> Vec<SniperConfig> {
        self.store.sniper_configs(owner).await
    }

    // Trading

    /// Buy with fully specified parameters
    pub async fn buy(&self, owner: OwnerId, order: &BuyOrder) -> Result<OrderReceipt> {
        self.executor.buy(owner, order).await
    }

    /// Buy with the owner's defaults filling in anything not given
    pub async fn manual_buy(
        &self,
        owner: OwnerId,
        currency: &str,
        issuer: &str,
        amount: Option<f64>,
    ) -> Result<OrderReceipt> {
        let defaults = self.store.default_trade_settings(owner).await;
        let order = BuyOrder {
            currency: currency.to_string(),
            issuer: issuer.to_string(),
            spend: amount
                .or(defaults.buy_amount)
                .unwrap_or(self.config.trading.default_buy_amount),
            slippage: defaults
                .slippage
                .unwrap_or(self.config.trading.default_slippage),
            max_fee: defaults.max_fee,
            mev_protect: self.store.mev_protection(owner).await,
        };
        self.executor.buy(owner, &order).await
    }

    /// Sell `percentage` of a holding, using the owner's default max fee
    pub async fn sell(
        &self,
        owner: OwnerId,
        currency: &str,
        issuer: &str,
        percentage: f64,
    ) -> Result<OrderReceipt> {
        let max_fee = self.store.default_trade_settings(owner).await.max_fee;
        self.executor
            .sell(owner, currency, issuer, percentage, max_fee)
            .await
    }

    // Presets, defaults, MEV protection

    /// Buy amounts in XRP, ascending
    pub async fn buy_presets(&self, owner: OwnerId) -> Vec<f64> {
        self.store.buy_presets(owner).await
    }

    /// Returns false if the amount was already a preset
    pub async fn add_buy_preset(&self, owner: OwnerId, amount: f64) -> Result<bool> {
        self.store.add_buy_preset(owner, amount).await
    }

    /// Returns false if the amount was not a preset
    pub async fn remove_buy_preset(&self, owner: OwnerId, amount: f64) -> Result<bool> {
        self.store.remove_buy_preset(owner, amount).await
    }

    /// Sell percentages, ascending
    pub async fn sell_presets(&self, owner: OwnerId) -> Vec<u8> {
        self.store.sell_presets(owner).await
    }

    /// Returns false if the percentage was already a preset
    pub async fn add_sell_preset(&self, owner: OwnerId, percentage: u8) -> Result<bool> {
        self.store.add_sell_preset(owner, percentage).await
    }

    /// Returns false if the percentage was not a preset
    pub async fn remove_sell_preset(&self, owner: OwnerId, percentage: u8) -> Result<bool> {
        self.store.remove_sell_preset(owner, percentage).await
    }

    /// The owner's stored manual-trade defaults
    pub async fn default_trade_settings(&self, owner: OwnerId) -> DefaultTradeSettings {
        self.store.default_trade_settings(owner).await
    }

    /// Replace the owner's manual-trade defaults
    pub async fn set_default_trade_settings(
        &self,
        owner: OwnerId,
        settings: DefaultTradeSettings,
    ) -> Result<()> {
        self.store.set_default_trade_settings(owner, settings).await
    }

    /// Whether the owner's orders are delayed before submission
    pub async fn mev_protection(&self, owner: OwnerId) -> bool {
        self.store.mev_protection(owner).await
    }

    /// Turn the owner's submission delay on or off
    pub async fn set_mev_protection(&self, owner: OwnerId, enabled: bool) -> Result<()> {
        self.store.set_mev_protection(owner, enabled).await
    }
}
