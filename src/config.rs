//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub bot: BotConfig,
}

/// Ledger network endpoints.
///
/// Transactions are signed by the node (`submit` with a secret) and wallets
/// come from `wallet_propose`; both need an admin connection, which rippled
/// only grants to local clients by default. Point `rpc_url` at your own node.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Testnet faucet used by wallet generation (unset on mainnet)
    #[serde(default)]
    pub faucet_url: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries for read-only RPC calls. Submissions are never retried.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_finality_timeout_secs")]
    pub finality_timeout_secs: u64,
    #[serde(default = "default_finality_poll_ms")]
    pub finality_poll_ms: u64,
}

/// Live transaction feed settings
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// Receive timeout; silence longer than this is treated as a dead connection
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_subscribe_timeout_secs")]
    pub subscribe_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Spend in base units when neither the call nor the owner's defaults give one
    #[serde(default = "default_buy_amount")]
    pub default_buy_amount: f64,
    /// Fraction in [0, 1)
    #[serde(default = "default_slippage")]
    pub default_slippage: f64,
    /// Submission delay applied when MEV protection is on
    #[serde(default = "default_mev_delay_ms")]
    pub mev_delay_ms: u64,
    #[serde(default = "default_trust_line_limit")]
    pub trust_line_limit: String,
    #[serde(default = "default_book_depth")]
    pub book_depth: u32,
    /// Asset units per base unit assumed when the book is empty. Rough placeholder.
    #[serde(default = "default_fallback_rate")]
    pub fallback_rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_file")]
    pub data_file: String,
}

/// Chat transport settings. Only the token lives here; the bot itself is external.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub token: Option<String>,
}

impl LedgerConfig {
    /// Whether `rpc_url` points at this machine, where rippled allows admin methods
    pub fn is_local_node(&self) -> bool {
        match url::Url::parse(&self.rpc_url) {
            Ok(url) => match url.host() {
                Some(url::Host::Domain(domain)) => domain == "localhost",
                Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
                Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
                None => false,
            },
            Err(_) => false,
        }
    }
}

impl StreamConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_secs(self.initial_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            ws_url: default_ws_url(),
            faucet_url: None,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            finality_timeout_secs: default_finality_timeout_secs(),
            finality_poll_ms: default_finality_poll_ms(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            subscribe_timeout_secs: default_subscribe_timeout_secs(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            default_buy_amount: default_buy_amount(),
            default_slippage: default_slippage(),
            mev_delay_ms: default_mev_delay_ms(),
            trust_line_limit: default_trust_line_limit(),
            book_depth: default_book_depth(),
            fallback_rate: default_fallback_rate(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
        }
    }
}

// Default value functions
// rippled's default admin ports
fn default_rpc_url() -> String {
    "http://127.0.0.1:5005/".to_string()
}

fn default_ws_url() -> String {
    "ws://127.0.0.1:6006/".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_finality_timeout_secs() -> u64 {
    30
}

fn default_finality_poll_ms() -> u64 {
    1_000
}

fn default_initial_backoff_secs() -> u64 {
    5
}

fn default_max_backoff_secs() -> u64 {
    60
}

fn default_ping_interval_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    90
}

fn default_subscribe_timeout_secs() -> u64 {
    10
}

fn default_buy_amount() -> f64 {
    10.0
}

fn default_slippage() -> f64 {
    0.01
}

fn default_mev_delay_ms() -> u64 {
    500
}

fn default_trust_line_limit() -> String {
    "10000000000000000".to_string()
}

fn default_book_depth() -> u32 {
    10
}

fn default_fallback_rate() -> f64 {
    1000.0
}

fn default_data_file() -> String {
    "sniper_data.json".to_string()
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (SNIPER__TRADING__MEV_DELAY_MS etc.)
            .add_source(
                config::Environment::with_prefix("SNIPER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // The chat transport's conventional variable name
        if config.bot.token.is_none() {
            config.bot.token = std::env::var("BOT_TOKEN").ok();
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("ledger.rpc_url", &self.ledger.rpc_url),
            ("ledger.ws_url", &self.ledger.ws_url),
        ] {
            url::Url::parse(value).with_context(|| format!("Invalid {}: {}", name, value))?;
        }

        if let Some(faucet) = &self.ledger.faucet_url {
            url::Url::parse(faucet)
                .with_context(|| format!("Invalid ledger.faucet_url: {}", faucet))?;
        }

        if self.stream.initial_backoff_secs == 0 {
            anyhow::bail!("stream.initial_backoff_secs must be positive");
        }

        if self.stream.initial_backoff_secs > self.stream.max_backoff_secs {
            anyhow::bail!(
                "stream.initial_backoff_secs ({}) exceeds stream.max_backoff_secs ({})",
                self.stream.initial_backoff_secs,
                self.stream.max_backoff_secs
            );
        }

        if self.trading.default_buy_amount <= 0.0 {
            anyhow::bail!("trading.default_buy_amount must be positive");
        }

        if !(0.0..1.0).contains(&self.trading.default_slippage) {
            anyhow::bail!("trading.default_slippage must be in [0, 1)");
        }

        if self.trading.fallback_rate <= 0.0 {
            anyhow::bail!("trading.fallback_rate must be positive");
        }

        if self.trading.book_depth == 0 {
            anyhow::bail!("trading.book_depth must be at least 1");
        }

        if !self.ledger.is_local_node() {
            tracing::warn!(
                "ledger.rpc_url {} is not a local node - signing and wallet_propose need \
                 admin access and public servers will answer `forbidden`",
                mask_url(&self.ledger.rpc_url)
            );
        }

        if self.bot.token.is_none() {
            tracing::warn!("No bot token configured - the chat front-end will not start");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Ledger:
    rpc_url: {}
    ws_url: {}
    signing: node-side (needs admin access: {})
    faucet_url: {}
    timeout: {}ms
    finality_timeout: {}s
  Stream:
    backoff: {}s .. {}s
    ping_interval: {}s
    idle_timeout: {}s
  Trading:
    default_buy_amount: {} XRP
    default_slippage: {}
    mev_delay: {}ms
    book_depth: {}
  Storage:
    data_file: {}
  Bot:
    token: {}
"#,
            mask_url(&self.ledger.rpc_url),
            mask_url(&self.ledger.ws_url),
            if self.ledger.is_local_node() {
                "local node"
            } else {
                "remote node, likely refused"
            },
            self.ledger
                .faucet_url
                .as_deref()
                .map(mask_url)
                .unwrap_or_else(|| "(not set)".to_string()),
            self.ledger.timeout_ms,
            self.ledger.finality_timeout_secs,
            self.stream.initial_backoff_secs,
            self.stream.max_backoff_secs,
            self.stream.ping_interval_secs,
            self.stream.idle_timeout_secs,
            self.trading.default_buy_amount,
            self.trading.default_slippage,
            self.trading.mev_delay_ms,
            self.trading.book_depth,
            self.storage.data_file,
            if self.bot.token.is_some() {
                "***"
            } else {
                "(not set)"
            },
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            stream: StreamConfig::default(),
            trading: TradingConfig::default(),
            storage: StorageConfig::default(),
            bot: BotConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.stream.initial_backoff_secs, 5);
        assert_eq!(config.stream.max_backoff_secs, 60);
        assert_eq!(config.trading.mev_delay_ms, 500);
        assert!(config.ledger.is_local_node());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_local_node_detection() {
        let mut ledger = LedgerConfig::default();
        for (url, local) in [
            ("http://localhost:5005/", true),
            ("http://[::1]:5005/", true),
            ("https://s.altnet.rippletest.net:51234/", false),
            ("http://10.0.0.5:5005/", false),
            ("not a url", false),
        ] {
            ledger.rpc_url = url.to_string();
            assert_eq!(ledger.is_local_node(), local, "{}", url);
        }
    }

    #[test]
    fn test_masked_display_flags_remote_signing() {
        let mut config = Config::default();
        assert!(config.masked_display().contains("local node"));
        config.ledger.rpc_url = "https://s1.ripple.com:51234/".to_string();
        assert!(config.masked_display().contains("likely refused"));
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[stream]
initial_backoff_secs = 2
max_backoff_secs = 30

[trading]
default_slippage = 0.05
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.stream.initial_backoff_secs, 2);
        assert_eq!(config.stream.max_backoff_secs, 30);
        assert_eq!(config.stream.initial_backoff(), Duration::from_secs(2));
        assert_eq!(config.stream.max_backoff(), Duration::from_secs(30));
        assert_eq!(config.trading.default_slippage, 0.05);
        // Untouched sections keep their defaults
        assert_eq!(config.storage.data_file, "sniper_data.json");
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let mut config = Config::default();
        config.stream.initial_backoff_secs = 120;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_full_slippage() {
        let mut config = Config::default();
        config.trading.default_slippage = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_masked_display_hides_token() {
        let mut config = Config::default();
        config.bot.token = Some("123:secret".to_string());
        let shown = config.masked_display();
        assert!(!shown.contains("secret"));
        assert!(shown.contains("***"));
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://api.example.com?key=secret"),
            "https://api.example.com?***"
        );
        assert_eq!(
            mask_url("https://api.example.com"),
            "https://api.example.com"
        );
    }
}
