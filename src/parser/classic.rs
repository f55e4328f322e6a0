//! Generic classic extractor: hashtag/alias symbol, Buy/Sell lines, keyed
//! entry/SL/TP numbers. The last resort of the strategy chain.

use super::{
    dedup_take_profits, detect_side, detect_symbol, extract_explicit_rr, ParseReason,
};
use crate::text::extract_numbers;
use crate::types::{Entry, Side, Signal};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

static ENTRY_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bentry\s*(?:price|zone)?\s*[:=\-]*\s*(.+)").expect("valid regex")
});
static ENTRY_SHORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^e\s*[:=]\s*(.+)").expect("valid regex"));
static ENTRY_AT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@\s*([0-9][0-9.,\s]*)").expect("valid regex"));
static SL_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:stop\s*loss|sl|stop)\b\s*[:=\-]*\s*(.+)").expect("valid regex")
});
static TP_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:tp\s*\d*|take\s*profit\s*\d*|targets?)\b\s*[:=\-]*\s*(.+)")
        .expect("valid regex")
});
static PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").expect("valid regex"));

fn first_number(chunk: &str) -> Option<Decimal> {
    extract_numbers(chunk).into_iter().next()
}

/// Collect take-profit levels and the stop-loss from keyed lines. Shared
/// with the range extractors, which differ only in how they read the entry.
pub(super) fn extract_levels(text: &str) -> (Vec<Decimal>, Option<Decimal>) {
    let mut stop_loss: Option<Decimal> = None;
    let mut tps: Vec<Decimal> = Vec::new();
    for line in text.lines() {
        // TP first: "Stop" inside a TP comment must not steal the line.
        if let Some(caps) = TP_LINE_RE.captures(line) {
            let chunk = PAREN_RE.replace_all(&caps[1], " ");
            tps.extend(extract_numbers(&chunk));
            continue;
        }
        if stop_loss.is_none() {
            if let Some(caps) = SL_LINE_RE.captures(line) {
                stop_loss = first_number(&caps[1]);
            }
        }
    }
    (dedup_take_profits(tps), stop_loss)
}

/// One-line header form used by some feeds: `EURUSD BUY 1.1581`.
fn parse_header_line(text: &str) -> Option<(String, Side, Decimal)> {
    let first = text.lines().next()?;
    let tokens: Vec<&str> = first.split_whitespace().collect();
    if tokens.len() < 3 {
        return None;
    }
    let side = match tokens[1].to_uppercase().as_str() {
        "BUY" | "LONG" => Side::Buy,
        "SELL" | "SHORT" => Side::Sell,
        _ => return None,
    };
    let entry = first_number(tokens[2])?;
    let symbol = super::canonicalize_symbol(tokens[0]);
    if !super::looks_like_symbol(&symbol) {
        return None;
    }
    Some((symbol, side, entry))
}

pub fn extract(text: &str, chat_id: i64) -> Result<Signal, ParseReason> {
    let header = parse_header_line(text);

    let symbol = detect_symbol(text).or_else(|| header.as_ref().map(|(s, _, _)| s.clone()));
    let mut side = detect_side(text).or_else(|| header.as_ref().map(|(_, s, _)| *s));

    let mut entry: Option<Decimal> = None;
    for line in text.lines() {
        if let Some(caps) = ENTRY_LINE_RE.captures(line) {
            entry = first_number(&caps[1]);
            if entry.is_some() {
                break;
            }
        }
        if let Some(caps) = ENTRY_SHORT_RE.captures(line.trim()) {
            entry = first_number(&caps[1]);
            if entry.is_some() {
                break;
            }
        }
    }
    if entry.is_none() {
        if let Some(caps) = ENTRY_AT_RE.captures(text) {
            entry = first_number(&caps[1]);
        }
    }
    if entry.is_none() {
        entry = header.as_ref().map(|(_, _, e)| *e);
    }

    let (tps, stop_loss) = extract_levels(text);

    // Direction can be inferred from geometry when the text never names it.
    if side.is_none() {
        if let (Some(e), Some(first_tp)) = (entry, tps.first()) {
            side = Some(if *first_tp > e { Side::Buy } else { Side::Sell });
        }
    }

    let symbol = symbol.ok_or(ParseReason::NoSymbol)?;
    let side = side.ok_or(ParseReason::NoSide)?;
    let entry = entry.ok_or(ParseReason::NoEntry)?;
    let stop_loss = stop_loss.ok_or(ParseReason::NoStopLoss)?;
    if tps.is_empty() {
        return Err(ParseReason::NoTakeProfit);
    }

    Ok(Signal {
        symbol,
        side,
        entry: Entry::Point(entry),
        stop_loss,
        take_profits: tps,
        risk_reward: extract_explicit_rr(text),
        source_chat_id: chat_id,
        raw_text: text.to_string(),
    })
}
