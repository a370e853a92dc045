//! Ledger value types and transaction builders
//!
//! Amounts follow the XRP Ledger wire format: the base asset is a string of
//! drops, issued assets are `{currency, issuer, value}` objects.

use serde::{Deserialize, Serialize};

/// Drops per whole base unit
pub const DROPS_PER_XRP: f64 = 1_000_000.0;

/// Result code of a definitively successful transaction
pub const SUCCESS_CODE: &str = "tesSUCCESS";

/// Convert base units to drops (rounded to the nearest drop)
pub fn xrp_to_drops(xrp: f64) -> u64 {
    (xrp * DROPS_PER_XRP).round().max(0.0) as u64
}

/// Convert drops to base units
pub fn drops_to_xrp(drops: u64) -> f64 {
    drops as f64 / DROPS_PER_XRP
}

/// Format an issued-asset value within the ledger's 16 significant digits.
///
/// Uses exponent notation, which the ledger accepts for all issued values.
pub fn format_issued_value(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return "0".to_string();
    }
    let formatted = format!("{:.14e}", value);
    let (mantissa, exponent) = formatted
        .split_once('e')
        .unwrap_or((formatted.as_str(), "0"));
    let mantissa = if mantissa.contains('.') {
        mantissa.trim_end_matches('0').trim_end_matches('.')
    } else {
        mantissa
    };
    if exponent == "0" {
        mantissa.to_string()
    } else {
        format!("{}e{}", mantissa, exponent)
    }
}

/// One side of a trading pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Asset {
    /// The ledger's native settlement currency
    Base,
    Issued { currency: String, issuer: String },
}

impl Asset {
    pub fn issued(currency: impl Into<String>, issuer: impl Into<String>) -> Self {
        Asset::Issued {
            currency: currency.into(),
            issuer: issuer.into(),
        }
    }

    /// Request-shaped JSON (`{"currency":"XRP"}` for the base asset)
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Asset::Base => serde_json::json!({ "currency": "XRP" }),
            Asset::Issued { currency, issuer } => {
                serde_json::json!({ "currency": currency, "issuer": issuer })
            }
        }
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Asset::Base => write!(f, "XRP"),
            Asset::Issued { currency, issuer } => write!(f, "{}.{}", currency, issuer),
        }
    }
}

/// An issued-asset amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedAmount {
    pub currency: String,
    pub issuer: String,
    pub value: String,
}

impl IssuedAmount {
    pub fn new(currency: impl Into<String>, issuer: impl Into<String>, value: f64) -> Self {
        Self {
            currency: currency.into(),
            issuer: issuer.into(),
            value: format_issued_value(value),
        }
    }

    pub fn value_f64(&self) -> Option<f64> {
        self.value.parse().ok()
    }
}

/// Amount in ledger wire format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    /// Base asset, in drops
    Drops(String),
    Issued(IssuedAmount),
}

impl Amount {
    pub fn from_xrp(xrp: f64) -> Self {
        Amount::Drops(xrp_to_drops(xrp).to_string())
    }

    pub fn is_base(&self) -> bool {
        matches!(self, Amount::Drops(_))
    }

    /// Base-asset amount in whole units, if this is a base amount
    pub fn as_xrp(&self) -> Option<f64> {
        match self {
            Amount::Drops(drops) => drops.parse::<u64>().ok().map(drops_to_xrp),
            Amount::Issued(_) => None,
        }
    }

    pub fn as_issued(&self) -> Option<&IssuedAmount> {
        match self {
            Amount::Issued(amount) => Some(amount),
            Amount::Drops(_) => None,
        }
    }
}

/// A standing offer from an order book
#[derive(Debug, Clone, Deserialize)]
pub struct BookOffer {
    #[serde(rename = "Account", default)]
    pub account: String,
    /// What the offer owner gives
    #[serde(rename = "TakerGets")]
    pub taker_gets: Amount,
    /// What the offer owner wants in return
    #[serde(rename = "TakerPays")]
    pub taker_pays: Amount,
}

/// Balance of one issued asset held by an account
#[derive(Debug, Clone, PartialEq)]
pub struct TrustLine {
    pub currency: String,
    pub issuer: String,
    pub balance: f64,
    pub limit: f64,
}

/// Account state relevant to trading
#[derive(Debug, Clone, PartialEq)]
pub struct AccountInfo {
    pub address: String,
    pub xrp_balance: f64,
    pub sequence: u32,
    pub lines: Vec<TrustLine>,
}

impl AccountInfo {
    /// Balance of `currency.issuer`, zero when no line exists
    pub fn balance_of(&self, currency: &str, issuer: &str) -> f64 {
        self.lines
            .iter()
            .find(|line| line.currency == currency && line.issuer == issuer)
            .map(|line| line.balance)
            .unwrap_or(0.0)
    }
}

/// Key material for a ledger account. The seed never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletKeys {
    pub address: String,
    pub seed: String,
}

impl std::fmt::Debug for WalletKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletKeys")
            .field("address", &self.address)
            .field("seed", &"***")
            .finish()
    }
}

/// Trust-line authorization
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrustSet {
    pub account: String,
    pub limit_amount: IssuedAmount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<String>,
}

/// Order placement
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OfferCreate {
    pub account: String,
    /// What the submitter gives
    pub taker_gets: Amount,
    /// What the submitter wants in return
    pub taker_pays: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<String>,
}

/// Direct transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Payment {
    pub account: String,
    pub destination: String,
    pub amount: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<String>,
}

/// Unsigned transaction handed to the ledger client for signing and submission
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "TransactionType")]
pub enum LedgerTransaction {
    TrustSet(TrustSet),
    OfferCreate(OfferCreate),
    Payment(Payment),
}

impl LedgerTransaction {
    /// Authorize holding `currency.issuer` up to `limit`
    pub fn trust_set(account: &str, currency: &str, issuer: &str, limit: &str) -> Self {
        LedgerTransaction::TrustSet(TrustSet {
            account: account.to_string(),
            limit_amount: IssuedAmount {
                currency: currency.to_string(),
                issuer: issuer.to_string(),
                value: limit.to_string(),
            },
            fee: None,
        })
    }

    /// Offer `gives` in exchange for `wants`
    pub fn offer_create(account: &str, gives: Amount, wants: Amount) -> Self {
        LedgerTransaction::OfferCreate(OfferCreate {
            account: account.to_string(),
            taker_gets: gives,
            taker_pays: wants,
            fee: None,
        })
    }

    pub fn payment(account: &str, destination: &str, amount: Amount) -> Self {
        LedgerTransaction::Payment(Payment {
            account: account.to_string(),
            destination: destination.to_string(),
            amount,
            fee: None,
        })
    }

    /// Pin the fee instead of letting the node autofill it
    pub fn with_max_fee(mut self, max_fee_xrp: Option<f64>) -> Self {
        if let Some(fee) = max_fee_xrp {
            let drops = Some(xrp_to_drops(fee).to_string());
            match &mut self {
                LedgerTransaction::TrustSet(tx) => tx.fee = drops,
                LedgerTransaction::OfferCreate(tx) => tx.fee = drops,
                LedgerTransaction::Payment(tx) => tx.fee = drops,
            }
        }
        self
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LedgerTransaction::TrustSet(_) => "TrustSet",
            LedgerTransaction::OfferCreate(_) => "OfferCreate",
            LedgerTransaction::Payment(_) => "Payment",
        }
    }
}

/// Final outcome of a submitted transaction
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub result_code: String,
    pub hash: Option<String>,
    pub raw: serde_json::Value,
}

impl SubmitOutcome {
    pub fn is_success(&self) -> bool {
        self.result_code == SUCCESS_CODE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_conversion() {
        assert_eq!(xrp_to_drops(10.0), 10_000_000);
        assert_eq!(xrp_to_drops(0.000001), 1);
        assert_eq!(drops_to_xrp(2_500_000), 2.5);
    }

    #[test]
    fn test_format_issued_value() {
        assert_eq!(format_issued_value(0.0), "0");
        assert_eq!(format_issued_value(9500.0), "9.5e3");
        assert_eq!(format_issued_value(1.0), "1");
        assert_eq!(format_issued_value(0.25), "2.5e-1");
        // Within 16 significant digits
        let v = format_issued_value(1.0 / 3.0);
        let mantissa = v.split('e').next().unwrap();
        assert!(mantissa.chars().filter(|c| c.is_ascii_digit()).count() <= 16);
        assert!((v.parse::<f64>().unwrap() - 1.0 / 3.0).abs() < 1e-14);
    }

    #[test]
    fn test_amount_wire_format() {
        let base: Amount = serde_json::from_str(r#""1500000""#).unwrap();
        assert_eq!(base.as_xrp(), Some(1.5));

        let issued: Amount = serde_json::from_str(
            r#"{"currency":"USD","issuer":"rIssuer","value":"12.5"}"#,
        )
        .unwrap();
        assert!(!issued.is_base());
        assert_eq!(issued.as_issued().unwrap().value_f64(), Some(12.5));
    }

    #[test]
    fn test_offer_create_serialization() {
        let tx = LedgerTransaction::offer_create(
            "rBuyer",
            Amount::from_xrp(10.0),
            Amount::Issued(IssuedAmount::new("USD", "rIssuer", 9500.0)),
        )
        .with_max_fee(Some(0.00002));

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["TransactionType"], "OfferCreate");
        assert_eq!(json["Account"], "rBuyer");
        assert_eq!(json["TakerGets"], "10000000");
        assert_eq!(json["TakerPays"]["currency"], "USD");
        assert_eq!(json["Fee"], "20");
    }

    #[test]
    fn test_trust_set_omits_fee_by_default() {
        let tx = LedgerTransaction::trust_set("rA", "USD", "rIssuer", "1000");
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["TransactionType"], "TrustSet");
        assert_eq!(json["LimitAmount"]["value"], "1000");
        assert!(json.get("Fee").is_none());
    }

    #[test]
    fn test_wallet_keys_debug_redacts_seed() {
        let keys = WalletKeys {
            address: "rA".into(),
            seed: "sSecretSeed".into(),
        };
        let shown = format!("{:?}", keys);
        assert!(!shown.contains("sSecretSeed"));
    }
}
