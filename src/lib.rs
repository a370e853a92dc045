//! XRPL Sniper Library
//!
//! Watches the ledger's live transaction feed for new liquidity, matches it
//! against per-owner sniper configs, and places buy offers on a match.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod ledger;
pub mod store;
pub mod stream;
pub mod trading;

// Re-export commonly used types
pub use config::Config;
pub use engine::{RunningState, SniperEngine};
pub use error::{Error, Result};
