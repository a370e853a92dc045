//! Trading module - pricing and order execution
//!
//! - `pricing`: top-of-book estimates for buys and sells
//! - `executor`: trust line, offer submission, transfers

pub mod executor;
pub mod pricing;

pub use executor::{BuyOrder, OrderExecutor, OrderReceipt};
pub use pricing::{estimate_buy, estimate_sell, Confidence, PriceEstimate};
