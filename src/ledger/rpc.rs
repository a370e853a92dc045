//! JSON-RPC ledger client
//!
//! Talks to a rippled-compatible node over HTTP. Signing is delegated to the
//! node (`submit` with `secret`), so no key handling happens in-process.
//! Read-only calls are retried on transport errors; submissions never are,
//! since re-sending a priced order against a moved book is worse than failing.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::types::{
    drops_to_xrp, AccountInfo, Asset, BookOffer, LedgerTransaction, SubmitOutcome, TrustLine,
    WalletKeys,
};
use super::LedgerClient;
use crate::config::LedgerConfig;
use crate::error::{Error, Result};

/// Preliminary result prefixes that are already final (never applied)
const TERMINAL_PREFIXES: [&str; 3] = ["tem", "tef", "tel"];

/// Maximum fee multiplier the node may apply when autofilling `Fee`
const FEE_MULT_MAX: u32 = 1000;

/// `wallet_propose` codes that mean the seed itself is unusable
const SEED_ERROR_CODES: [&str; 2] = ["badSeed", "invalidParams"];

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Value,
}

#[derive(Debug, Deserialize)]
struct RawTrustLine {
    /// Counterparty, i.e. the issuer from our side of the line
    account: String,
    balance: String,
    currency: String,
    limit: String,
}

/// A `status: "error"` reply from the node
#[derive(Debug, Clone, PartialEq)]
struct NodeError {
    code: String,
    message: String,
}

impl NodeError {
    fn from_result(result: &Value) -> Option<Self> {
        if result.get("status").and_then(Value::as_str) != Some("error") {
            return None;
        }
        let field = |name: &str| {
            result
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let code = field("error");
        Some(Self {
            code: if code.is_empty() { "unknown".to_string() } else { code },
            message: field("error_message"),
        })
    }

    fn into_error(self, method: &str) -> Error {
        let hint = if self.code == "forbidden" {
            " (admin access required: point ledger.rpc_url at your own node)"
        } else {
            ""
        };
        Error::Rpc(format!(
            "{} failed: {} {}{}",
            method, self.code, self.message, hint
        ))
    }

    /// Seed lookups: only seed-specific codes are the caller's bad input
    fn into_seed_error(self) -> Error {
        if SEED_ERROR_CODES.contains(&self.code.as_str()) {
            Error::InvalidSeed(format!("{} {}", self.code, self.message))
        } else {
            self.into_error("wallet_propose")
        }
    }
}

/// rippled JSON-RPC client
pub struct JsonRpcLedgerClient {
    client: Client,
    config: LedgerConfig,
}

impl JsonRpcLedgerClient {
    pub fn new(config: LedgerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        info!("Ledger RPC client initialized for {}", config.rpc_url);

        Ok(Self { client, config })
    }

    /// Single JSON-RPC call; node-level errors become `Error::Rpc`
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let result = self.post(method, params).await?;
        match NodeError::from_result(&result) {
            Some(err) => Err(err.into_error(method)),
            None => Ok(result),
        }
    }

    /// Raw `result` object of a call, including node-level error replies
    async fn post(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({ "method": method, "params": [params] });

        let response = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(format!("Invalid {} response: {}", method, e)))?;

        Ok(envelope.result)
    }

    /// Read-only call with retry on transient failures
    async fn call_with_retry(&self, method: &str, params: Value) -> Result<Value> {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_millis(self.config.timeout_ms),
            max_elapsed_time: Some(Duration::from_millis(
                self.config.timeout_ms * u64::from(self.config.max_retries.max(1)),
            )),
            ..Default::default()
        };

        retry(backoff, || async {
            match self.call(method, params.clone()).await {
                Ok(result) => Ok(result),
                Err(e) if e.is_retryable() => {
                    warn!("Retryable RPC error on {}: {}", method, e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::RpcTimeout(self.config.timeout_ms)
        } else {
            Error::from(e)
        }
    }

    async fn account_lines(&self, address: &str) -> Result<Vec<TrustLine>> {
        let mut lines = Vec::new();
        let mut marker: Option<Value> = None;

        loop {
            let mut params = json!({ "account": address, "ledger_index": "validated" });
            if let Some(m) = marker.take() {
                params["marker"] = m;
            }

            let result = self.call_with_retry("account_lines", params).await?;
            let raw: Vec<RawTrustLine> =
                serde_json::from_value(result.get("lines").cloned().unwrap_or(Value::Null))
                    .map_err(|e| Error::Deserialization(format!("Invalid trust lines: {}", e)))?;

            lines.extend(raw.into_iter().map(|line| TrustLine {
                currency: line.currency,
                issuer: line.account,
                balance: line.balance.parse().unwrap_or(0.0),
                limit: line.limit.parse().unwrap_or(0.0),
            }));

            match result.get("marker") {
                Some(m) if !m.is_null() => marker = Some(m.clone()),
                _ => break,
            }
        }

        Ok(lines)
    }

    /// Poll `tx` until the transaction is in a validated ledger
    async fn await_validation(&self, hash: &str) -> Result<SubmitOutcome> {
        let deadline = Instant::now() + Duration::from_secs(self.config.finality_timeout_secs);
        let poll = Duration::from_millis(self.config.finality_poll_ms);

        loop {
            tokio::time::sleep(poll).await;

            match self.call("tx", json!({ "transaction": hash })).await {
                Ok(result) => {
                    if result.get("validated").and_then(Value::as_bool) == Some(true) {
                        let code = result
                            .pointer("/meta/TransactionResult")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown")
                            .to_string();
                        debug!("Transaction {} validated with {}", hash, code);
                        return Ok(SubmitOutcome {
                            result_code: code,
                            hash: Some(hash.to_string()),
                            raw: result,
                        });
                    }
                }
                // Not yet known to the node
                Err(Error::Rpc(msg)) if msg.contains("txnNotFound") => {}
                Err(e) if e.is_retryable() => warn!("Polling {} failed: {}", hash, e),
                Err(e) => return Err(e),
            }

            if Instant::now() >= deadline {
                return Err(Error::FinalityTimeout(hash.to_string()));
            }
        }
    }

    async fn fund_from_faucet(&self, faucet_url: &str) -> Result<WalletKeys> {
        let response = self
            .client
            .post(faucet_url)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(format!("Invalid faucet response: {}", e)))?;

        let address = body
            .pointer("/account/classicAddress")
            .or_else(|| body.pointer("/account/address"))
            .and_then(Value::as_str);
        let seed = body
            .get("seed")
            .or_else(|| body.pointer("/account/secret"))
            .and_then(Value::as_str);

        match (address, seed) {
            (Some(address), Some(seed)) => Ok(WalletKeys {
                address: address.to_string(),
                seed: seed.to_string(),
            }),
            _ => Err(Error::Rpc("Faucet response missing account keys".to_string())),
        }
    }

    fn keys_from_proposal(result: &Value) -> Option<WalletKeys> {
        Some(WalletKeys {
            address: result.get("account_id")?.as_str()?.to_string(),
            seed: result.get("master_seed")?.as_str()?.to_string(),
        })
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedgerClient {
    async fn account_info(&self, address: &str) -> Result<AccountInfo> {
        let result = self
            .call_with_retry(
                "account_info",
                json!({ "account": address, "ledger_index": "validated" }),
            )
            .await?;

        let data = result
            .get("account_data")
            .ok_or_else(|| Error::Deserialization("account_info without account_data".into()))?;

        let drops = data
            .get("Balance")
            .and_then(Value::as_str)
            .and_then(|b| b.parse::<u64>().ok())
            .unwrap_or(0);
        let sequence = data.get("Sequence").and_then(Value::as_u64).unwrap_or(0) as u32;

        let lines = self.account_lines(address).await?;

        Ok(AccountInfo {
            address: address.to_string(),
            xrp_balance: drops_to_xrp(drops),
            sequence,
            lines,
        })
    }

    async fn order_book(&self, want: &Asset, have: &Asset, limit: u32) -> Result<Vec<BookOffer>> {
        let result = self
            .call_with_retry(
                "book_offers",
                json!({
                    "taker_gets": want.to_json(),
                    "taker_pays": have.to_json(),
                    "limit": limit,
                }),
            )
            .await?;

        let offers: Vec<BookOffer> =
            serde_json::from_value(result.get("offers").cloned().unwrap_or(json!([])))
                .map_err(|e| Error::Deserialization(format!("Invalid book offers: {}", e)))?;

        debug!("Book {} for {}: {} offer(s)", want, have, offers.len());
        Ok(offers)
    }

    async fn submit_and_wait(
        &self,
        tx: &LedgerTransaction,
        wallet: &WalletKeys,
    ) -> Result<SubmitOutcome> {
        let tx_json = serde_json::to_value(tx)?;

        let result = self
            .call(
                "submit",
                json!({
                    "tx_json": tx_json,
                    "secret": wallet.seed,
                    "fee_mult_max": FEE_MULT_MAX,
                }),
            )
            .await?;

        let preliminary = result
            .get("engine_result")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let hash = result
            .pointer("/tx_json/hash")
            .and_then(Value::as_str)
            .map(str::to_string);

        debug!("{} submitted: preliminary {}", tx.kind(), preliminary);

        let hash = match hash {
            Some(hash) if !TERMINAL_PREFIXES.iter().any(|p| preliminary.starts_with(p)) => hash,
            hash => {
                return Ok(SubmitOutcome {
                    result_code: preliminary,
                    hash,
                    raw: result,
                })
            }
        };

        self.await_validation(&hash).await
    }

    async fn generate_wallet(&self) -> Result<WalletKeys> {
        if let Some(faucet) = &self.config.faucet_url {
            return self.fund_from_faucet(faucet).await;
        }

        let result = self
            .call("wallet_propose", json!({ "key_type": "ed25519" }))
            .await?;
        Self::keys_from_proposal(&result)
            .ok_or_else(|| Error::Rpc("wallet_propose returned no keys".to_string()))
    }

    async fn wallet_from_seed(&self, seed: &str) -> Result<WalletKeys> {
        let result = self.post("wallet_propose", json!({ "seed": seed })).await?;
        if let Some(err) = NodeError::from_result(&result) {
            return Err(err.into_seed_error());
        }
        Self::keys_from_proposal(&result)
            .ok_or_else(|| Error::InvalidSeed("seed did not resolve to an account".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Serve `reply` as the JSON-RPC `result` to every request
    async fn serve_result(reply: Value) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = json!({ "result": reply }).to_string();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let body = body.clone();
                tokio::spawn(async move {
                    read_request(&mut socket).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}/", addr)
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let len = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len {
                    return;
                }
            }
        }
    }

    async fn client_for(reply: Value) -> JsonRpcLedgerClient {
        let rpc_url = serve_result(reply).await;
        JsonRpcLedgerClient::new(LedgerConfig {
            rpc_url,
            ..LedgerConfig::default()
        })
        .unwrap()
    }

    fn error_reply(code: &str, message: &str) -> Value {
        json!({ "error": code, "error_message": message, "status": "error" })
    }

    #[tokio::test]
    async fn test_forbidden_seed_lookup_is_rpc_error() {
        let client = client_for(error_reply("forbidden", "Bad credentials.")).await;

        match client.wallet_from_seed("sEdValidLookingSeed").await.unwrap_err() {
            Error::Rpc(msg) => {
                assert!(msg.contains("forbidden"));
                assert!(msg.contains("admin access required"));
            }
            other => panic!("expected Rpc, got {:?}", other),
        }
        assert!(matches!(
            client.generate_wallet().await.unwrap_err(),
            Error::Rpc(_)
        ));
    }

    #[tokio::test]
    async fn test_bad_seed_is_invalid_seed() {
        let client = client_for(error_reply("badSeed", "Disallowed seed.")).await;

        match client.wallet_from_seed("sBogus").await.unwrap_err() {
            Error::InvalidSeed(msg) => assert!(msg.contains("badSeed")),
            other => panic!("expected InvalidSeed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_seed_lookup_resolves_keys() {
        let client = client_for(json!({
            "account_id": "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh",
            "master_seed": "snoPBrXtMeMyMHUVTgbuqAfg1SUTb",
            "status": "success"
        }))
        .await;

        let keys = client
            .wallet_from_seed("snoPBrXtMeMyMHUVTgbuqAfg1SUTb")
            .await
            .unwrap();
        assert_eq!(keys.address, "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh");
    }

    #[test]
    fn test_node_error_seed_mapping() {
        for (code, seed_error) in [
            ("badSeed", true),
            ("invalidParams", true),
            ("forbidden", false),
            ("slowDown", false),
            ("noNetwork", false),
        ] {
            let err = NodeError::from_result(&error_reply(code, "x"))
                .unwrap()
                .into_seed_error();
            assert_eq!(matches!(err, Error::InvalidSeed(_)), seed_error, "{}", code);
        }
        assert!(NodeError::from_result(&json!({ "status": "success" })).is_none());
    }

    #[test]
    fn test_keys_from_proposal() {
        let result = json!({
            "account_id": "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh",
            "master_seed": "snoPBrXtMeMyMHUVTgbuqAfg1SUTb",
            "status": "success"
        });
        let keys = JsonRpcLedgerClient::keys_from_proposal(&result).unwrap();
        assert_eq!(keys.address, "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh");
        assert!(JsonRpcLedgerClient::keys_from_proposal(&json!({})).is_none());
    }

    #[test]
    fn test_raw_trust_line_parse() {
        let raw: RawTrustLine = serde_json::from_value(json!({
            "account": "rIssuer",
            "balance": "42.5",
            "currency": "USD",
            "limit": "1000",
            "quality_in": 0
        }))
        .unwrap();
        assert_eq!(raw.account, "rIssuer");
        assert_eq!(raw.balance, "42.5");
    }

    #[test]
    fn test_book_offer_parse() {
        let offer: BookOffer = serde_json::from_value(json!({
            "Account": "rMaker",
            "TakerGets": { "currency": "USD", "issuer": "rIssuer", "value": "950" },
            "TakerPays": "1000000",
            "quality": "1052.63"
        }))
        .unwrap();
        assert_eq!(offer.taker_pays.as_xrp(), Some(1.0));
        assert_eq!(offer.taker_gets.as_issued().unwrap().value, "950");
    }
}
