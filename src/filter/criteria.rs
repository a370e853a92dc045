//! Sniper criteria matching
//!
//! Criteria fields are OR-ed. The dev wallet is checked first, then the
//! currency code (case-insensitive), then the issuer.

use tracing::debug;

use crate::store::SniperConfig;

/// Which criterion produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchReason {
    DevWallet,
    Currency,
    Issuer,
}

impl std::fmt::Display for MatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchReason::DevWallet => write!(f, "dev wallet"),
            MatchReason::Currency => write!(f, "currency"),
            MatchReason::Issuer => write!(f, "issuer"),
        }
    }
}

/// Match result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    Matched(MatchReason),
    NoMatch,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched(_))
    }
}

/// Evaluate `config` against an observed liquidity event
pub fn evaluate(
    config: &SniperConfig,
    currency: &str,
    issuer: &str,
    source_account: &str,
) -> MatchResult {
    if config.dev_wallet_address.as_deref() == Some(source_account) {
        return MatchResult::Matched(MatchReason::DevWallet);
    }

    if config
        .target_currency
        .as_deref()
        .is_some_and(|code| code.eq_ignore_ascii_case(currency))
    {
        return MatchResult::Matched(MatchReason::Currency);
    }

    if config.target_issuer.as_deref() == Some(issuer) {
        return MatchResult::Matched(MatchReason::Issuer);
    }

    MatchResult::NoMatch
}

/// True if any present criterion of `config` matches
pub fn matches(config: &SniperConfig, currency: &str, issuer: &str, source_account: &str) -> bool {
    match evaluate(config, currency, issuer, source_account) {
        MatchResult::Matched(reason) => {
            debug!(
                "Config {} matched {}.{} from {} on {}",
                config.name, currency, issuer, source_account, reason
            );
            true
        }
        MatchResult::NoMatch => false,
    }
}
