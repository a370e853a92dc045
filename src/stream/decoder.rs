//! Frame decoder for the ledger subscription feed
//!
//! Decodes JSON frames and classifies transactions that open a market
//! against the base asset.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ledger::{Amount, IssuedAmount};

/// Request id used for the subscribe command
pub const SUBSCRIBE_ID: u64 = 1;

/// Subscribe to validated transactions and ledger closes
pub fn subscribe_request() -> String {
    serde_json::json!({
        "id": SUBSCRIBE_ID,
        "command": "subscribe",
        "streams": ["transactions", "ledger"],
    })
    .to_string()
}

/// Decoded feed frame
#[derive(Debug, Clone)]
pub enum StreamFrame {
    Transaction(TransactionFrame),
    LedgerClosed { ledger_index: u64 },
    /// Reply to a command we sent
    Response {
        id: Option<u64>,
        success: bool,
        error: Option<String>,
        ledger_index: Option<u64>,
    },
    /// Any other frame type, by its type tag
    Other(String),
}

#[derive(Debug, Clone)]
pub struct TransactionFrame {
    pub validated: bool,
    pub hash: Option<String>,
    pub event: TransactionEvent,
}

/// Transaction body, decoded only for the types we act on
#[derive(Debug, Clone)]
pub enum TransactionEvent {
    OfferCreate {
        account: String,
        taker_gets: Amount,
        taker_pays: Amount,
    },
    TrustSet {
        account: String,
        limit_amount: IssuedAmount,
    },
    /// Skipped after reading the type tag
    Other(String),
}

/// A new market for an issued asset priced directly against the base asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidityEvent {
    pub currency: String,
    pub issuer: String,
    pub source_account: String,
    pub hash: Option<String>,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    validated: bool,
    #[serde(default)]
    transaction: Option<Value>,
    /// API v2 name for `transaction`
    #[serde(default)]
    tx_json: Option<Value>,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    ledger_index: Option<u64>,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawOfferCreate {
    account: String,
    taker_gets: Amount,
    taker_pays: Amount,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTrustSet {
    account: String,
    limit_amount: IssuedAmount,
}

/// Decode one text frame from the feed
pub fn decode_frame(text: &str) -> Result<StreamFrame> {
    let raw: RawFrame = serde_json::from_str(text)
        .map_err(|e| Error::StreamDecode(format!("invalid frame: {}", e)))?;

    match raw.kind.as_deref() {
        Some("transaction") => {
            let body = raw
                .transaction
                .or(raw.tx_json)
                .ok_or_else(|| Error::StreamDecode("transaction frame without body".to_string()))?;
            let hash = raw
                .hash
                .or_else(|| body.get("hash").and_then(Value::as_str).map(String::from));
            Ok(StreamFrame::Transaction(TransactionFrame {
                validated: raw.validated,
                hash,
                event: decode_transaction(body)?,
            }))
        }
        Some("ledgerClosed") => {
            let ledger_index = raw
                .ledger_index
                .ok_or_else(|| Error::StreamDecode("ledgerClosed without ledger_index".to_string()))?;
            Ok(StreamFrame::LedgerClosed { ledger_index })
        }
        Some("response") => Ok(StreamFrame::Response {
            id: raw.id,
            success: raw.status.as_deref() == Some("success"),
            error: raw.error,
            ledger_index: raw
                .result
                .as_ref()
                .and_then(|r| r.get("ledger_index"))
                .and_then(Value::as_u64),
        }),
        Some(other) => Ok(StreamFrame::Other(other.to_string())),
        None => Err(Error::StreamDecode("frame without type".to_string())),
    }
}

fn decode_transaction(body: Value) -> Result<TransactionEvent> {
    let kind = body
        .get("TransactionType")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::StreamDecode("transaction without TransactionType".to_string()))?
        .to_string();

    match kind.as_str() {
        "OfferCreate" => {
            let tx: RawOfferCreate = serde_json::from_value(body)
                .map_err(|e| Error::StreamDecode(format!("OfferCreate: {}", e)))?;
            Ok(TransactionEvent::OfferCreate {
                account: tx.account,
                taker_gets: tx.taker_gets,
                taker_pays: tx.taker_pays,
            })
        }
        "TrustSet" => {
            let tx: RawTrustSet = serde_json::from_value(body)
                .map_err(|e| Error::StreamDecode(format!("TrustSet: {}", e)))?;
            Ok(TransactionEvent::TrustSet {
                account: tx.account,
                limit_amount: tx.limit_amount,
            })
        }
        _ => Ok(TransactionEvent::Other(kind)),
    }
}

/// Classify an offer as liquidity for a new issued asset.
///
/// Either side may carry the issued asset as long as the other side is the
/// base asset. Asset-for-asset offers are not liquidity events.
pub fn classify_liquidity(frame: &TransactionFrame) -> Option<LiquidityEvent> {
    let TransactionEvent::OfferCreate {
        account,
        taker_gets,
        taker_pays,
    } = &frame.event
    else {
        return None;
    };

    let issued = match (taker_gets, taker_pays) {
        (Amount::Issued(issued), Amount::Drops(_)) | (Amount::Drops(_), Amount::Issued(issued)) => {
            issued
        }
        _ => {
            debug!("Offer from {} has no base-asset leg, skipping", account);
            return None;
        }
    };

    Some(LiquidityEvent {
        currency: issued.currency.clone(),
        issuer: issued.issuer.clone(),
        source_account: account.clone(),
        hash: frame.hash.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";
    const MAKER: &str = "rPEPPER7kfTD9w2To4CQk6UCfuHM9c6GDY";

    fn offer_frame(gets: Value, pays: Value, validated: bool) -> String {
        serde_json::json!({
            "type": "transaction",
            "validated": validated,
            "engine_result": "tesSUCCESS",
            "ledger_index": 90_000_001u64,
            "transaction": {
                "Account": MAKER,
                "TransactionType": "OfferCreate",
                "TakerGets": gets,
                "TakerPays": pays,
                "hash": "ABC123",
            }
        })
        .to_string()
    }

    fn usd(value: &str) -> Value {
        serde_json::json!({ "currency": "USD", "issuer": ISSUER, "value": value })
    }

    fn classify(text: &str) -> Option<LiquidityEvent> {
        match decode_frame(text).unwrap() {
            StreamFrame::Transaction(frame) => classify_liquidity(&frame),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_subscribe_request_shape() {
        let v: Value = serde_json::from_str(&subscribe_request()).unwrap();
        assert_eq!(v["command"], "subscribe");
        assert_eq!(v["streams"], serde_json::json!(["transactions", "ledger"]));
    }

    #[test]
    fn test_issued_for_base_is_liquidity() {
        let event = classify(&offer_frame(usd("1000"), Value::from("5000000"), true)).unwrap();
        assert_eq!(event.currency, "USD");
        assert_eq!(event.issuer, ISSUER);
        assert_eq!(event.source_account, MAKER);
        assert_eq!(event.hash.as_deref(), Some("ABC123"));
    }

    #[test]
    fn test_base_for_issued_is_liquidity() {
        assert!(classify(&offer_frame(Value::from("5000000"), usd("1000"), true)).is_some());
    }

    #[test]
    fn test_asset_for_asset_is_not_liquidity() {
        let eur = serde_json::json!({ "currency": "EUR", "issuer": ISSUER, "value": "1" });
        assert!(classify(&offer_frame(usd("1"), eur, true)).is_none());
    }

    #[test]
    fn test_validated_flag_is_kept() {
        let frame = decode_frame(&offer_frame(usd("1"), Value::from("1"), false)).unwrap();
        assert!(matches!(frame, StreamFrame::Transaction(f) if !f.validated));
    }

    #[test]
    fn test_other_transaction_types_only_read_tag() {
        let text = serde_json::json!({
            "type": "transaction",
            "validated": true,
            "transaction": { "TransactionType": "Payment", "Amount": {"weird": true} }
        })
        .to_string();
        match decode_frame(&text).unwrap() {
            StreamFrame::Transaction(f) => {
                assert!(matches!(f.event, TransactionEvent::Other(ref t) if t == "Payment"))
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_trust_set_decoded() {
        let text = serde_json::json!({
            "type": "transaction",
            "validated": true,
            "transaction": {
                "TransactionType": "TrustSet",
                "Account": MAKER,
                "LimitAmount": usd("1000000"),
            }
        })
        .to_string();
        let StreamFrame::Transaction(frame) = decode_frame(&text).unwrap() else {
            panic!("expected transaction");
        };
        assert!(matches!(frame.event, TransactionEvent::TrustSet { .. }));
        assert!(classify_liquidity(&frame).is_none());
    }

    #[test]
    fn test_ledger_closed_and_response() {
        let closed = decode_frame(r#"{"type":"ledgerClosed","ledger_index":42}"#).unwrap();
        assert!(matches!(closed, StreamFrame::LedgerClosed { ledger_index: 42 }));

        let ack = decode_frame(
            r#"{"id":1,"status":"success","type":"response","result":{"ledger_index":41}}"#,
        )
        .unwrap();
        assert!(matches!(
            ack,
            StreamFrame::Response { id: Some(1), success: true, ledger_index: Some(41), .. }
        ));
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        assert!(decode_frame("not json").is_err());
        assert!(decode_frame(r#"{"validated":true}"#).is_err());
        assert!(decode_frame(r#"{"type":"transaction","validated":true}"#).is_err());
        let bad_offer = serde_json::json!({
            "type": "transaction",
            "transaction": { "TransactionType": "OfferCreate", "Account": MAKER }
        })
        .to_string();
        assert!(matches!(decode_frame(&bad_offer), Err(Error::StreamDecode(_))));
    }
}
