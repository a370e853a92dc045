//! Error types for the sniper engine

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sniper engine
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Ledger RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    // Stream transport errors
    #[error("Stream connection failed: {0}")]
    StreamConnection(String),

    #[error("Stream disconnected")]
    StreamDisconnected,

    #[error("Stream idle for more than {0}s")]
    StreamTimeout(u64),

    #[error("Subscription rejected: {0}")]
    Subscription(String),

    #[error("Stream decode error: {0}")]
    StreamDecode(String),

    // Validation errors
    #[error("No wallet configured for owner {0}")]
    WalletNotFound(i64),

    #[error("Sniper config not found: {0}")]
    ConfigNotFound(String),

    #[error("A sniper config named '{0}' already exists")]
    DuplicateConfigName(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    #[error("No {currency}.{issuer} balance to sell")]
    NoBalance { currency: String, issuer: String },

    #[error("Sell amount must be positive, got {0}")]
    InvalidSellAmount(f64),

    #[error("Exchange rate undefined: {0}")]
    UndefinedRate(String),

    // Ledger rejection
    #[error("Order rejected by ledger with {code}")]
    OrderRejected { code: String, raw: String },

    #[error("Transaction {0} not validated before timeout")]
    FinalityTimeout(String),

    // Persistence errors
    #[error("Persistence failed: {0}")]
    Persistence(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RpcTimeout(_)
                | Error::RpcConnection(_)
                | Error::StreamConnection(_)
                | Error::StreamDisconnected
                | Error::StreamTimeout(_)
        )
    }

    /// Check if this error is a caller input/state problem that retrying won't fix
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::WalletNotFound(_)
                | Error::ConfigNotFound(_)
                | Error::DuplicateConfigName(_)
                | Error::InvalidInput(_)
                | Error::InvalidSeed(_)
                | Error::NoBalance { .. }
                | Error::InvalidSellAmount(_)
                | Error::UndefinedRate(_)
        )
    }

    /// Message for display to an end user: a generic explanation followed by
    /// the upstream error text verbatim.
    pub fn user_message(&self) -> String {
        let summary = match self {
            Error::Config(_) => "The bot is misconfigured.",
            Error::Rpc(_) | Error::RpcTimeout(_) | Error::RpcConnection(_) => {
                "Could not reach the ledger."
            }
            Error::StreamConnection(_)
            | Error::StreamDisconnected
            | Error::StreamTimeout(_)
            | Error::Subscription(_)
            | Error::StreamDecode(_) => "The live ledger feed is unavailable.",
            Error::OrderRejected { .. } | Error::FinalityTimeout(_) => {
                "The order was not executed."
            }
            Error::Persistence(_) => {
                "The change is active but could not be saved to disk; it may be lost on restart."
            }
            e if e.is_validation() => "The request could not be completed.",
            _ => "Something went wrong.",
        };
        format!("{} ({})", summary, self)
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            Error::RpcConnection(e.to_string())
        } else {
            Error::Rpc(e.to_string())
        }
    }
}
