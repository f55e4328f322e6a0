//! Entry-range extractors
//!
//! Two conventions produce a banded entry instead of a single price:
//! the labeled form (`Entry Range: 1930 - 1935`) and the shorthand form —
//! a bare `@1900-1910` / `1900-1910` line next to an action verb. The
//! labeled form anchors on the first quoted bound and is gated per profile;
//! the shorthand anchors on the midpoint and always parses, since the
//! channels that use it never declare a profile.

use super::{classic, detect_side, detect_symbol, extract_explicit_rr, Dialect, ParseReason};
use crate::types::{Entry, RangeAnchor, Signal};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

static LABELED_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bentry\s*(?:range|zone)?\s*[:=]?\s*(\d+(?:\.\d+)?)\s*[-\u{2010}-\u{2015}]\s*(\d+(?:\.\d+)?)",
    )
    .expect("valid regex")
});
static SHORTHAND_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@?\s*(\d+(?:\.\d+)?)\s*[-\u{2010}-\u{2015}]\s*(\d+(?:\.\d+)?)$")
        .expect("valid regex")
});

pub fn has_labeled_range(text: &str) -> bool {
    LABELED_RANGE_RE.is_match(text)
}

/// Shorthand dialect sniffing: a bare range line plus a direction verb,
/// so unseen channels of the same family still parse.
pub fn sniff_shorthand(text: &str) -> bool {
    shorthand_bounds(text).is_some() && detect_side(text).is_some()
}

fn shorthand_bounds(text: &str) -> Option<(Decimal, Decimal)> {
    for line in text.lines() {
        if let Some(caps) = SHORTHAND_RANGE_RE.captures(line.trim()) {
            let a = caps[1].parse().ok()?;
            let b = caps[2].parse().ok()?;
            return Some((a, b));
        }
    }
    None
}

fn labeled_bounds(text: &str) -> Option<(Decimal, Decimal)> {
    let caps = LABELED_RANGE_RE.captures(text)?;
    let a = caps[1].parse().ok()?;
    let b = caps[2].parse().ok()?;
    Some((a, b))
}

pub fn extract(text: &str, chat_id: i64, dialect: Dialect) -> Result<Signal, ParseReason> {
    let (bounds, anchor) = match dialect {
        Dialect::EntryRange => (labeled_bounds(text), RangeAnchor::Low),
        _ => (shorthand_bounds(text), RangeAnchor::Midpoint),
    };
    let (a, b) = bounds.ok_or(ParseReason::NoEntry)?;

    // The shorthand family are gold channels; an unmarked message there
    // still means XAUUSD.
    let symbol = match detect_symbol(text) {
        Some(s) => s,
        None if dialect == Dialect::RangeShorthand => "XAUUSD".to_string(),
        None => return Err(ParseReason::NoSymbol),
    };
    let side = detect_side(text).ok_or(ParseReason::NoSide)?;

    let (tps, stop_loss) = classic::extract_levels(text);
    let stop_loss = stop_loss.ok_or(ParseReason::NoStopLoss)?;
    if tps.is_empty() {
        return Err(ParseReason::NoTakeProfit);
    }

    Ok(Signal {
        symbol,
        side,
        entry: Entry::range(a, b, anchor),
        stop_loss,
        take_profits: tps,
        risk_reward: extract_explicit_rr(text),
        source_chat_id: chat_id,
        raw_text: text.to_string(),
    })
}
