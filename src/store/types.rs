//! Persisted entities: wallets, sniper configs, trade defaults and presets

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::ledger::WalletKeys;

/// Chat-user identity owning wallets and configs
pub type OwnerId = i64;

/// Opaque generated config identifier
pub type ConfigId = String;

lazy_static! {
    static ref CLASSIC_ADDRESS: Regex = Regex::new(r"^r[1-9A-HJ-NP-Za-km-z]{24,34}$").unwrap();
    static ref CURRENCY_CODE: Regex =
        Regex::new(r"^([A-Za-z0-9?!@#$%^&*<>(){}\[\]|]{3}|[0-9A-Fa-f]{40})$").unwrap();
}

/// Check the shape of a classic account address
pub fn is_classic_address(address: &str) -> bool {
    CLASSIC_ADDRESS.is_match(address)
}

/// Check the shape of an issued currency code (3-char standard or 40-hex)
pub fn is_currency_code(code: &str) -> bool {
    CURRENCY_CODE.is_match(code) && !code.eq_ignore_ascii_case("XRP")
}

/// An owner's trading wallet. One per owner; storing a new one replaces the old.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub owner_id: OwnerId,
    pub address: String,
    pub seed: String,
}

impl Wallet {
    pub fn new(owner_id: OwnerId, keys: WalletKeys) -> Self {
        Self {
            owner_id,
            address: keys.address,
            seed: keys.seed,
        }
    }

    pub fn keys(&self) -> WalletKeys {
        WalletKeys {
            address: self.address.clone(),
            seed: self.seed.clone(),
        }
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("owner_id", &self.owner_id)
            .field("address", &self.address)
            .field("seed", &"***")
            .finish()
    }
}

/// Automatic-buy rule
///
/// Criteria fields are OR-ed: any one present field equal to the observed
/// value is a match. A config with no criteria never matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SniperConfig {
    pub config_id: ConfigId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_wallet_address: Option<String>,
    #[serde(rename = "buy_amount_xrp")]
    pub buy_amount: f64,
    /// Fraction in [0, 1)
    pub slippage: f64,
    #[serde(
        rename = "max_fee_xrp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub max_fee: Option<f64>,
    /// Stored for display; the ledger has no tip field to apply it to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip: Option<f64>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl SniperConfig {
    pub fn has_criteria(&self) -> bool {
        self.target_currency.is_some()
            || self.target_issuer.is_some()
            || self.dev_wallet_address.is_some()
    }
}

/// In-progress config collected field by field before it is saved.
///
/// Also used as a patch: `Some("")` clears an optional text field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDraft {
    pub name: Option<String>,
    pub target_currency: Option<String>,
    pub target_issuer: Option<String>,
    pub dev_wallet_address: Option<String>,
    pub buy_amount: Option<f64>,
    pub slippage: Option<f64>,
    pub max_fee: Option<f64>,
    pub tip: Option<f64>,
}

impl ConfigDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn target_currency(mut self, code: impl Into<String>) -> Self {
        self.target_currency = Some(code.into());
        self
    }

    pub fn target_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.target_issuer = Some(issuer.into());
        self
    }

    pub fn dev_wallet(mut self, address: impl Into<String>) -> Self {
        self.dev_wallet_address = Some(address.into());
        self
    }

    pub fn buy_amount(mut self, amount: f64) -> Self {
        self.buy_amount = Some(amount);
        self
    }

    pub fn slippage(mut self, slippage: f64) -> Self {
        self.slippage = Some(slippage);
        self
    }

    pub fn max_fee(mut self, fee: f64) -> Self {
        self.max_fee = Some(fee);
        self
    }

    pub fn tip(mut self, tip: f64) -> Self {
        self.tip = Some(tip);
        self
    }

    /// Finish the draft into a new, disabled config
    pub fn build(self, default_buy_amount: f64, default_slippage: f64) -> Result<SniperConfig> {
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::InvalidInput("config name cannot be empty".to_string()))?
            .to_string();

        let mut config = SniperConfig {
            config_id: uuid::Uuid::new_v4().to_string(),
            name,
            target_currency: None,
            target_issuer: None,
            dev_wallet_address: None,
            buy_amount: default_buy_amount,
            slippage: default_slippage,
            max_fee: None,
            tip: None,
            enabled: false,
            created_at: Utc::now(),
        };
        self.apply_to(&mut config)?;
        Ok(config)
    }

    /// Apply the fields present in this draft to an existing config, then validate it
    pub fn apply_to(&self, config: &mut SniperConfig) -> Result<()> {
        let mut updated = config.clone();

        if let Some(name) = self.name.as_deref().map(str::trim) {
            if name.is_empty() {
                return Err(Error::InvalidInput("config name cannot be empty".to_string()));
            }
            updated.name = name.to_string();
        }
        if let Some(code) = &self.target_currency {
            updated.target_currency = non_empty(code);
        }
        if let Some(issuer) = &self.target_issuer {
            updated.target_issuer = non_empty(issuer);
        }
        if let Some(dev) = &self.dev_wallet_address {
            updated.dev_wallet_address = non_empty(dev);
        }
        if let Some(amount) = self.buy_amount {
            updated.buy_amount = amount;
        }
        if let Some(slippage) = self.slippage {
            updated.slippage = slippage;
        }
        if self.max_fee.is_some() {
            updated.max_fee = self.max_fee;
        }
        if self.tip.is_some() {
            updated.tip = self.tip;
        }

        validate_config(&updated)?;
        *config = updated;
        Ok(())
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Field-level checks shared by drafts and direct saves
pub fn validate_config(config: &SniperConfig) -> Result<()> {
    if !config.has_criteria() {
        return Err(Error::InvalidInput(
            "set at least one of currency, issuer or dev wallet".to_string(),
        ));
    }
    if let Some(code) = &config.target_currency {
        if !is_currency_code(code) {
            return Err(Error::InvalidInput(format!("invalid currency code: {}", code)));
        }
    }
    for address in [&config.target_issuer, &config.dev_wallet_address]
        .into_iter()
        .flatten()
    {
        if !is_classic_address(address) {
            return Err(Error::InvalidInput(format!("invalid address: {}", address)));
        }
    }
    validate_buy_amount(config.buy_amount)?;
    validate_slippage(config.slippage)?;
    if let Some(fee) = config.max_fee {
        validate_fee(fee)?;
    }
    if matches!(config.tip, Some(tip) if !(tip >= 0.0 && tip.is_finite())) {
        return Err(Error::InvalidInput("tip cannot be negative".to_string()));
    }
    Ok(())
}

pub fn validate_buy_amount(amount: f64) -> Result<()> {
    if amount > 0.0 && amount.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("buy amount must be positive, got {}", amount)))
    }
}

pub fn validate_slippage(slippage: f64) -> Result<()> {
    if (0.0..1.0).contains(&slippage) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "slippage must be a fraction in [0, 1), got {}",
            slippage
        )))
    }
}

pub fn validate_fee(fee: f64) -> Result<()> {
    if fee > 0.0 && fee.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("fee must be positive, got {}", fee)))
    }
}

/// Parameters for manual (non-sniper) trades
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultTradeSettings {
    #[serde(
        rename = "buy_amount_xrp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub buy_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slippage: Option<f64>,
    #[serde(
        rename = "max_fee_xrp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub max_fee: Option<f64>,
}

impl DefaultTradeSettings {
    pub fn validate(&self) -> Result<()> {
        if let Some(amount) = self.buy_amount {
            validate_buy_amount(amount)?;
        }
        if let Some(slippage) = self.slippage {
            validate_slippage(slippage)?;
        }
        if let Some(fee) = self.max_fee {
            validate_fee(fee)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MevProtectionSetting {
    pub enabled: bool,
}

/// The whole persisted state; rewritten in full on every save
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub wallets: BTreeMap<OwnerId, Wallet>,
    #[serde(default)]
    pub sniper_configs: BTreeMap<OwnerId, BTreeMap<ConfigId, SniperConfig>>,
    #[serde(default)]
    pub default_trade_settings: BTreeMap<OwnerId, DefaultTradeSettings>,
    #[serde(default)]
    pub mev_protection_settings: BTreeMap<OwnerId, MevProtectionSetting>,
    #[serde(default)]
    pub buy_presets: BTreeMap<OwnerId, Vec<f64>>,
    #[serde(default)]
    pub sell_presets: BTreeMap<OwnerId, Vec<u8>>,
}

impl StoreDocument {
    pub fn config_count(&self) -> usize {
        self.sniper_configs.values().map(BTreeMap::len).sum()
    }

    pub fn has_enabled_configs(&self) -> bool {
        self.sniper_configs
            .values()
            .flat_map(BTreeMap::values)
            .any(|c| c.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";

    #[test]
    fn test_address_and_currency_shapes() {
        assert!(is_classic_address(ISSUER));
        assert!(!is_classic_address("not-an-address"));
        assert!(is_currency_code("USD"));
        assert!(is_currency_code("534F4C4F00000000000000000000000000000000"));
        assert!(!is_currency_code("XRP"));
        assert!(!is_currency_code("TOOLONG"));
    }

    #[test]
    fn test_draft_builds_disabled_config() {
        let config = ConfigDraft::named("usd")
            .target_currency("USD")
            .buy_amount(10.0)
            .slippage(0.05)
            .build(25.0, 0.01)
            .unwrap();
        assert!(!config.enabled);
        assert_eq!(config.buy_amount, 10.0);
        assert_eq!(config.slippage, 0.05);
        assert!(!config.config_id.is_empty());
    }

    #[test]
    fn test_draft_without_criteria_is_rejected() {
        let err = ConfigDraft::named("empty").build(10.0, 0.01).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_draft_rejects_bad_slippage() {
        let err = ConfigDraft::named("x")
            .target_currency("USD")
            .slippage(1.5)
            .build(10.0, 0.01)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_patch_clears_field_but_keeps_validity() {
        let mut config = ConfigDraft::named("both")
            .target_currency("USD")
            .target_issuer(ISSUER)
            .build(10.0, 0.01)
            .unwrap();

        ConfigDraft {
            target_currency: Some(String::new()),
            ..Default::default()
        }
        .apply_to(&mut config)
        .unwrap();
        assert_eq!(config.target_currency, None);
        assert_eq!(config.target_issuer.as_deref(), Some(ISSUER));

        // Clearing the last criterion would leave a config that can never match
        let before = config.clone();
        let err = ConfigDraft {
            target_issuer: Some(String::new()),
            ..Default::default()
        }
        .apply_to(&mut config)
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(config, before);
    }

    #[test]
    fn test_document_uses_string_owner_keys() {
        let mut doc = StoreDocument::default();
        doc.buy_presets.insert(123, vec![5.0, 10.0]);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["buy_presets"]["123"][1], 10.0);

        let back: StoreDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_wallet_debug_redacts_seed() {
        let wallet = Wallet {
            owner_id: 1,
            address: ISSUER.to_string(),
            seed: "sEdSecret".to_string(),
        };
        assert!(!format!("{:?}", wallet).contains("sEdSecret"));
    }
}
