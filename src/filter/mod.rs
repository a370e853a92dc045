//! Matching observed liquidity against sniper configs

pub mod criteria;

pub use criteria::{evaluate, matches, MatchReason, MatchResult};
