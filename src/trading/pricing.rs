//! Order-book price estimation
//!
//! Only the top offer of the book is used. The buy path falls back to a
//! fixed nominal rate when the book is empty; that estimate is a rough
//! placeholder and is marked [`Confidence::Fallback`].

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::ledger::{Amount, BookOffer};

/// How an estimate was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// Derived from a live offer
    OrderBook,
    /// Nominal fallback rate; not a price guarantee
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceEstimate {
    /// Expected amount received (asset units for buys, base units for sells)
    pub amount_out: f64,
    /// Units received per unit given
    pub rate: f64,
    pub confidence: Confidence,
}

impl PriceEstimate {
    pub fn is_fallback(&self) -> bool {
        self.confidence == Confidence::Fallback
    }
}

/// Amounts of an offer as (issued value, base units), whichever side each is on
fn offer_legs(gets: &Amount, pays: &Amount) -> Option<(f64, f64)> {
    match (gets, pays) {
        (Amount::Issued(issued), base @ Amount::Drops(_))
        | (base @ Amount::Drops(_), Amount::Issued(issued)) => {
            Some((issued.value_f64()?, base.as_xrp()?))
        }
        _ => None,
    }
}

/// Estimate the asset received for `spend` base units.
///
/// `offer` is the top of the asset-for-base book: it gives the issued asset
/// and wants the base asset.
pub fn estimate_buy(
    offer: Option<&BookOffer>,
    spend: f64,
    slippage: f64,
    fallback_rate: f64,
) -> PriceEstimate {
    let rate = offer.and_then(|offer| match (&offer.taker_gets, &offer.taker_pays) {
        (Amount::Issued(_), Amount::Drops(_)) => {
            let (asset, base) = offer_legs(&offer.taker_gets, &offer.taker_pays)?;
            (base > 0.0 && asset > 0.0).then(|| asset / base)
        }
        _ => None,
    });

    match rate {
        Some(rate) => {
            let amount_out = spend * rate * (1.0 - slippage);
            debug!("Buy rate {} per base unit, expecting {}", rate, amount_out);
            PriceEstimate {
                amount_out,
                rate,
                confidence: Confidence::OrderBook,
            }
        }
        None => {
            warn!(
                "No usable offer, using nominal rate {} per base unit (low confidence)",
                fallback_rate
            );
            PriceEstimate {
                amount_out: spend * fallback_rate,
                rate: fallback_rate,
                confidence: Confidence::Fallback,
            }
        }
    }
}

/// Estimate the base units received for `amount` of the asset.
///
/// `offer` is the top of the base-for-asset book: it gives the base asset
/// and wants the issued asset.
pub fn estimate_sell(offer: Option<&BookOffer>, amount: f64) -> Result<PriceEstimate> {
    let offer = offer.ok_or_else(|| Error::UndefinedRate("order book is empty".to_string()))?;

    let (Amount::Drops(_), Amount::Issued(_)) = (&offer.taker_gets, &offer.taker_pays) else {
        return Err(Error::UndefinedRate("unexpected offer format".to_string()));
    };
    let (asset, base) = offer_legs(&offer.taker_gets, &offer.taker_pays)
        .ok_or_else(|| Error::UndefinedRate("unparseable offer amounts".to_string()))?;

    if asset <= 0.0 {
        return Err(Error::UndefinedRate("offer asset amount is zero".to_string()));
    }

    let rate = base / asset;
    debug!("Sell rate {} base per unit, expecting {}", rate, amount * rate);
    Ok(PriceEstimate {
        amount_out: amount * rate,
        rate,
        confidence: Confidence::OrderBook,
    })
}
