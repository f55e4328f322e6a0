//! Directional consistency checks and risk/reward derivation
//!
//! A Buy needs its stop strictly below every quoted entry level and every
//! take-profit strictly above them; Sell is the mirror image. With an entry
//! range, the far bound in each direction is checked, so no TP or SL may
//! fall inside the quoted band — that ambiguity is rejected outright.

use crate::types::{Side, Signal};
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{side} signal: stop-loss {stop} must sit strictly {expected} entry {bound}")]
    StopLoss {
        side: Side,
        stop: Decimal,
        bound: Decimal,
        expected: &'static str,
    },
    #[error("{side} signal: take-profit {tp} must sit strictly {expected} entry {bound}")]
    TakeProfit {
        side: Side,
        tp: Decimal,
        bound: Decimal,
        expected: &'static str,
    },
}

/// Validate the entry/stop/take-profit geometry. Equality is invalid: a
/// stop or target exactly at entry carries no information.
pub fn validate(signal: &Signal) -> Result<(), ValidationError> {
    let low = signal.entry.low();
    let high = signal.entry.high();
    match signal.side {
        Side::Buy => {
            if signal.stop_loss >= low {
                return Err(ValidationError::StopLoss {
                    side: signal.side,
                    stop: signal.stop_loss,
                    bound: low,
                    expected: "below",
                });
            }
            for &tp in &signal.take_profits {
                if tp <= high {
                    return Err(ValidationError::TakeProfit {
                        side: signal.side,
                        tp,
                        bound: high,
                        expected: "above",
                    });
                }
            }
        }
        Side::Sell => {
            if signal.stop_loss <= high {
                return Err(ValidationError::StopLoss {
                    side: signal.side,
                    stop: signal.stop_loss,
                    bound: high,
                    expected: "above",
                });
            }
            for &tp in &signal.take_profits {
                if tp >= low {
                    return Err(ValidationError::TakeProfit {
                        side: signal.side,
                        tp,
                        bound: low,
                        expected: "below",
                    });
                }
            }
        }
    }
    Ok(())
}

fn format_ratio(r: Decimal) -> String {
    if r >= Decimal::from(3) {
        r.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .normalize()
            .to_string()
    } else {
        r.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
            .normalize()
            .to_string()
    }
}

/// Derive the ratio from the representative entry, the stop and the first
/// take-profit: `1/N` when the trade rewards more than it risks, `N/1`
/// otherwise. N is an integer once the ratio reaches 3, one decimal below.
pub fn derive_risk_reward(signal: &Signal) -> Option<String> {
    let entry = signal.entry.reference();
    let first_tp = *signal.take_profits.first()?;
    let risk = (entry - signal.stop_loss).abs();
    let reward = (first_tp - entry).abs();
    if risk.is_zero() || reward.is_zero() {
        return None;
    }
    if reward >= risk {
        Some(format!("1/{}", format_ratio(reward / risk)))
    } else {
        Some(format!("{}/1", format_ratio(risk / reward)))
    }
}

/// Fill in the risk/reward when the text carried none.
pub fn ensure_risk_reward(signal: &mut Signal) {
    if signal.risk_reward.is_none() {
        signal.risk_reward = derive_risk_reward(signal);
    }
}
