//! Config, wallet and preset store
//!
//! All persisted state lives in one [`StoreDocument`] guarded by an async
//! `RwLock`. Every mutation is applied in memory first and then flushed in
//! full through the [`PersistenceBackend`]. A failed flush is reported as
//! `Error::Persistence` but the in-memory change stands.

pub mod backend;
pub mod types;

use tokio::sync::RwLock;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::ledger::WalletKeys;

pub use backend::{JsonFileBackend, MemoryBackend, PersistenceBackend};
pub use types::{
    validate_config, ConfigDraft, ConfigId, DefaultTradeSettings, MevProtectionSetting, OwnerId,
    SniperConfig, StoreDocument, Wallet,
};

/// An enabled config together with its owner, as seen by the matching path
#[derive(Debug, Clone, PartialEq)]
pub struct EnabledConfig {
    pub owner_id: OwnerId,
    pub config: SniperConfig,
}

pub struct ConfigStore {
    doc: RwLock<StoreDocument>,
    backend: Box<dyn PersistenceBackend>,
}

impl ConfigStore {
    /// Load the store from its backend
    pub fn load(backend: Box<dyn PersistenceBackend>) -> Result<Self> {
        let doc = backend.load()?;
        Ok(Self {
            doc: RwLock::new(doc),
            backend,
        })
    }

    /// Persist the whole document. Called with the write guard held so saves
    /// land in mutation order.
    async fn flush(&self, doc: &StoreDocument) -> Result<()> {
        self.backend.save(doc).await.map_err(|e| {
            error!("Failed to save store: {}", e);
            match e {
                Error::Persistence(msg) => Error::Persistence(msg),
                other => Error::Persistence(other.to_string()),
            }
        })
    }

    // Wallets

    /// Store `keys` as the owner's wallet, replacing any previous one
    pub async fn set_wallet(&self, owner: OwnerId, keys: WalletKeys) -> Result<Wallet> {
        let wallet = Wallet::new(owner, keys);
        let mut doc = self.doc.write().await;
        doc.wallets.insert(owner, wallet.clone());
        info!("Wallet set for owner {}: {}", owner, wallet.address);
        self.flush(&doc).await?;
        Ok(wallet)
    }

    /// The owner's wallet, if one is set
    pub async fn wallet(&self, owner: OwnerId) -> Option<Wallet> {
        self.doc.read().await.wallets.get(&owner).cloned()
    }

    // Sniper configs

    /// Insert or replace a config under its own id
    pub async fn save_sniper_config(&self, owner: OwnerId, config: SniperConfig) -> Result<()> {
        validate_config(&config)?;
        let mut doc = self.doc.write().await;
        let configs = doc.sniper_configs.entry(owner).or_default();
        if configs
            .values()
            .any(|c| c.name == config.name && c.config_id != config.config_id)
        {
            return Err(Error::DuplicateConfigName(config.name));
        }
        info!("Sniper config {} saved for owner {}", config.config_id, owner);
        configs.insert(config.config_id.clone(), config);
        self.flush(&doc).await
    }

    /// Finish a draft into a new (disabled) config
    pub async fn create_sniper_config(
        &self,
        owner: OwnerId,
        draft: ConfigDraft,
        default_buy_amount: f64,
        default_slippage: f64,
    ) -> Result<SniperConfig> {
        let config = draft.build(default_buy_amount, default_slippage)?;
        self.save_sniper_config(owner, config.clone()).await?;
        Ok(config)
    }

    /// Apply the fields set in `patch` to an existing config
    pub async fn update_sniper_config(
        &self,
        owner: OwnerId,
        config_id: &str,
        patch: &ConfigDraft,
    ) -> Result<SniperConfig> {
        let mut doc = self.doc.write().await;
        let configs = doc
            .sniper_configs
            .get_mut(&owner)
            .ok_or_else(|| Error::ConfigNotFound(config_id.to_string()))?;

        if let Some(name) = patch.name.as_deref().map(str::trim) {
            if configs
                .values()
                .any(|c| c.name == name && c.config_id != config_id)
            {
                return Err(Error::DuplicateConfigName(name.to_string()));
            }
        }

        let config = configs
            .get_mut(config_id)
            .ok_or_else(|| Error::ConfigNotFound(config_id.to_string()))?;
        patch.apply_to(config)?;
        let updated = config.clone();

        info!("Sniper config {} updated for owner {}", config_id, owner);
        self.flush(&doc).await?;
        Ok(updated)
    }

    /// Flip a config's enabled flag, returning the updated config
    pub async fn set_config_enabled(
        &self,
        owner: OwnerId,
        config_id: &str,
        enabled: bool,
    ) -> Result<SniperConfig> {
        let mut doc = self.doc.write().await;
        let config = doc
            .sniper_configs
            .get_mut(&owner)
            .and_then(|configs| configs.get_mut(config_id))
            .ok_or_else(|| Error::ConfigNotFound(config_id.to_string()))?;
        config.enabled = enabled;
        let updated = config.clone();

        info!(
            "Sniper config {} for owner {} {}",
            config_id,
            owner,
            if enabled { "enabled" } else { "disabled" }
        );
        self.flush(&doc).await?;
        Ok(updated)
    }

    /// Remove a config, returning it
    pub async fn delete_sniper_config(&self, owner: OwnerId, config_id: &str) -> Result<SniperConfig> {
        let mut doc = self.doc.write().await;
        let configs = doc
            .sniper_configs
            .get_mut(&owner)
            .ok_or_else(|| Error::ConfigNotFound(config_id.to_string()))?;
        let removed = configs
            .remove(config_id)
            .ok_or_else(|| Error::ConfigNotFound(config_id.to_string()))?;
        if configs.is_empty() {
            doc.sniper_configs.remove(&owner);
        }

        info!("Sniper config {} deleted for owner {}", config_id, owner);
        self.flush(&doc).await?;
        Ok(removed)
    }

    /// One config by id
    pub async fn sniper_config(&self, owner: OwnerId, config_id: &str) -> Option<SniperConfig> {
        self.doc
            .read()
            .await
            .sniper_configs
            .get(&owner)
            .and_then(|configs| configs.get(config_id))
            .cloned()
    }

    /// All of an owner's configs, oldest first
    pub async fn sniper_configs(&self, owner: OwnerId) -> Vec<SniperConfig> {
        let doc = self.doc.read().await;
        let mut configs: Vec<SniperConfig> = doc
            .sniper_configs
            .get(&owner)
            .map(|configs| configs.values().cloned().collect())
            .unwrap_or_default();
        configs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        configs
    }

    /// Snapshot of every enabled config across all owners
    pub async fn enabled_configs(&self) -> Vec<EnabledConfig> {
        let doc = self.doc.read().await;
        doc.sniper_configs
            .iter()
            .flat_map(|(owner, configs)| {
                configs
                    .values()
                    .filter(|c| c.enabled)
                    .map(move |c| EnabledConfig {
                        owner_id: *owner,
                        config: c.clone(),
                    })
            })
            .collect()
    }

    /// True if any owner has an enabled config
    pub async fn has_enabled_configs(&self) -> bool {
        self.doc.read().await.has_enabled_configs()
    }

    // Manual trade defaults and MEV protection

    /// Stored manual-trade defaults, empty if never set
    pub async fn default_trade_settings(&self, owner: OwnerId) -> DefaultTradeSettings {
        self.doc
            .read()
            .await
            .default_trade_settings
            .get(&owner)
            .cloned()
            .unwrap_or_default()
    }

    /// Replace the owner's manual-trade defaults
    pub async fn set_default_trade_settings(
        &self,
        owner: OwnerId,
        settings: DefaultTradeSettings,
    ) -> Result<()> {
        settings.validate()?;
        let mut doc = self.doc.write().await;
        info!("Default trade settings updated for owner {}: {:?}", owner, settings);
        doc.default_trade_settings.insert(owner, settings);
        self.flush(&doc).await
    }

    /// Whether the owner asked for delayed submission
    pub async fn mev_protection(&self, owner: OwnerId) -> bool {
        self.doc
            .read()
            .await
            .mev_protection_settings
            .get(&owner)
            .map(|s| s.enabled)
            .unwrap_or(false)
    }

    /// Turn the owner's delayed submission on or off
    pub async fn set_mev_protection(&self, owner: OwnerId, enabled: bool) -> Result<()> {
        let mut doc = self.doc.write().await;
        doc.mev_protection_settings
            .insert(owner, MevProtectionSetting { enabled });
        info!("MEV protection for owner {} set to {}", owner, enabled);
        self.flush(&doc).await
    }

    // Presets

    /// Buy amounts in XRP, ascending
    pub async fn buy_presets(&self, owner: OwnerId) -> Vec<f64> {
        self.doc
            .read()
            .await
            .buy_presets
            .get(&owner)
            .cloned()
            .unwrap_or_default()
    }

    /// Add a buy amount; returns false if it was already present
    pub async fn add_buy_preset(&self, owner: OwnerId, amount: f64) -> Result<bool> {
        types::validate_buy_amount(amount)?;
        let mut doc = self.doc.write().await;
        let presets = doc.buy_presets.entry(owner).or_default();
        if presets.contains(&amount) {
            return Ok(false);
        }
        presets.push(amount);
        presets.sort_by(|a, b| a.total_cmp(b));
        info!("Buy preset {} XRP added for owner {}", amount, owner);
        self.flush(&doc).await?;
        Ok(true)
    }

    /// Remove a buy amount; returns false if it was not present
    pub async fn remove_buy_preset(&self, owner: OwnerId, amount: f64) -> Result<bool> {
        let mut doc = self.doc.write().await;
        let Some(presets) = doc.buy_presets.get_mut(&owner) else {
            return Ok(false);
        };
        let before = presets.len();
        presets.retain(|p| *p != amount);
        if presets.len() == before {
            return Ok(false);
        }
        info!("Buy preset {} XRP removed for owner {}", amount, owner);
        self.flush(&doc).await?;
        Ok(true)
    }

    /// Sell percentages, ascending
    pub async fn sell_presets(&self, owner: OwnerId) -> Vec<u8> {
        self.doc
            .read()
            .await
            .sell_presets
            .get(&owner)
            .cloned()
            .unwrap_or_default()
    }

    /// Add a sell percentage (1-100); returns false if it was already present
    pub async fn add_sell_preset(&self, owner: OwnerId, percentage: u8) -> Result<bool> {
        if !(1..=100).contains(&percentage) {
            return Err(Error::InvalidInput(format!(
                "sell percentage must be 1-100, got {}",
                percentage
            )));
        }
        let mut doc = self.doc.write().await;
        let presets = doc.sell_presets.entry(owner).or_default();
        if presets.contains(&percentage) {
            return Ok(false);
        }
        presets.push(percentage);
        presets.sort_unstable();
        info!("Sell preset {}% added for owner {}", percentage, owner);
        self.flush(&doc).await?;
        Ok(true)
    }

    /// Remove a sell percentage; returns false if it was not present
    pub async fn remove_sell_preset(&self, owner: OwnerId, percentage: u8) -> Result<bool> {
        let mut doc = self.doc.write().await;
        let Some(presets) = doc.sell_presets.get_mut(&owner) else {
            return Ok(false);
        };
        let before = presets.len();
        presets.retain(|p| *p != percentage);
        if presets.len() == before {
            return Ok(false);
        }
        info!("Sell preset {}% removed for owner {}", percentage, owner);
        self.flush(&doc).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const ISSUER: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";

    fn memory_store() -> ConfigStore {
        ConfigStore::load(Box::new(MemoryBackend::default())).unwrap()
    }

    fn usd_draft(name: &str) -> ConfigDraft {
        ConfigDraft::named(name)
            .target_currency("USD")
            .buy_amount(10.0)
            .slippage(0.05)
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let store = memory_store();
        let created = store
            .create_sniper_config(1, usd_draft("usd").target_issuer(ISSUER).max_fee(0.001), 10.0, 0.01)
            .await
            .unwrap();

        let loaded = store.sniper_config(1, &created.config_id).await.unwrap();
        assert_eq!(loaded, created);
        assert!(store.sniper_config(2, &created.config_id).await.is_none());
    }

    #[tokio::test]
    async fn test_round_trip_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sniper_data.json");

        let store = ConfigStore::load(Box::new(JsonFileBackend::new(&path))).unwrap();
        let created = store
            .create_sniper_config(9, usd_draft("usd").tip(0.1), 10.0, 0.01)
            .await
            .unwrap();
        drop(store);

        let reloaded = ConfigStore::load(Box::new(JsonFileBackend::new(&path))).unwrap();
        assert_eq!(
            reloaded.sniper_config(9, &created.config_id).await,
            Some(created)
        );
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let store = memory_store();
        store
            .create_sniper_config(1, usd_draft("same"), 10.0, 0.01)
            .await
            .unwrap();
        let err = store
            .create_sniper_config(1, usd_draft("same"), 10.0, 0.01)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateConfigName(_)));

        // Names are scoped per owner
        assert!(store
            .create_sniper_config(2, usd_draft("same"), 10.0, 0.01)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_config() {
        let store = memory_store();
        let original = store
            .create_sniper_config(1, usd_draft("usd"), 10.0, 0.01)
            .await
            .unwrap();
        let was_enabled = store.has_enabled_configs().await;

        store
            .set_config_enabled(1, &original.config_id, true)
            .await
            .unwrap();
        assert!(store.has_enabled_configs().await);
        store
            .set_config_enabled(1, &original.config_id, false)
            .await
            .unwrap();

        assert_eq!(
            store.sniper_config(1, &original.config_id).await.unwrap(),
            original
        );
        assert_eq!(store.has_enabled_configs().await, was_enabled);
    }

    #[tokio::test]
    async fn test_enabled_configs_snapshot() {
        let store = memory_store();
        let a = store
            .create_sniper_config(1, usd_draft("a"), 10.0, 0.01)
            .await
            .unwrap();
        store
            .create_sniper_config(2, usd_draft("b"), 10.0, 0.01)
            .await
            .unwrap();
        store.set_config_enabled(1, &a.config_id, true).await.unwrap();

        let enabled = store.enabled_configs().await;
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].owner_id, 1);
        assert_eq!(enabled[0].config.config_id, a.config_id);
    }

    #[tokio::test]
    async fn test_delete_missing_config() {
        let store = memory_store();
        let err = store.delete_sniper_config(1, "nope").await.unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(_)));
    }

    #[tokio::test]
    async fn test_presets_sorted_and_deduplicated() {
        let store = memory_store();
        assert!(store.add_buy_preset(1, 50.0).await.unwrap());
        assert!(store.add_buy_preset(1, 5.0).await.unwrap());
        assert!(!store.add_buy_preset(1, 50.0).await.unwrap());
        assert!(store.add_buy_preset(1, 20.0).await.unwrap());
        assert_eq!(store.buy_presets(1).await, vec![5.0, 20.0, 50.0]);
        assert!(store.remove_buy_preset(1, 20.0).await.unwrap());
        assert!(!store.remove_buy_preset(1, 20.0).await.unwrap());

        assert!(store.add_sell_preset(1, 100).await.unwrap());
        assert!(store.add_sell_preset(1, 25).await.unwrap());
        assert!(!store.add_sell_preset(1, 25).await.unwrap());
        assert_eq!(store.sell_presets(1).await, vec![25, 100]);
        assert!(store.add_sell_preset(1, 0).await.is_err());
        assert!(store.add_sell_preset(1, 101).await.is_err());
    }

    #[tokio::test]
    async fn test_wallet_replaced() {
        let store = memory_store();
        store
            .set_wallet(1, WalletKeys { address: "rOld".into(), seed: "sOld".into() })
            .await
            .unwrap();
        store
            .set_wallet(1, WalletKeys { address: "rNew".into(), seed: "sNew".into() })
            .await
            .unwrap();
        assert_eq!(store.wallet(1).await.unwrap().address, "rNew");
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_memory_state() {
        let backend = Arc::new(MemoryBackend::default());
        let store = ConfigStore::load(Box::new(SharedBackend(backend.clone()))).unwrap();
        backend.set_fail_writes(true);

        let err = store.set_mev_protection(1, true).await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert!(store.mev_protection(1).await);
        assert!(!backend.snapshot().mev_protection_settings.contains_key(&1));
    }

    #[tokio::test]
    async fn test_default_settings_validated() {
        let store = memory_store();
        let err = store
            .set_default_trade_settings(
                1,
                DefaultTradeSettings {
                    slippage: Some(2.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.default_trade_settings(1).await, DefaultTradeSettings::default());
    }

    struct SharedBackend(Arc<MemoryBackend>);

    #[async_trait::async_trait]
    impl PersistenceBackend for SharedBackend {
        fn load(&self) -> Result<StoreDocument> {
            self.0.load()
        }

        async fn save(&self, doc: &StoreDocument) -> Result<()> {
            self.0.save(doc).await
        }
    }
}
