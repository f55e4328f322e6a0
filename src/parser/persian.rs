//! Persian-language crypto channel dialect
//!
//! Signals name the coin with «رمزارز X» or a hashtag, direction with
//! «لانگ/شورت» (or «اسپات خرید»), entries with «در نقطه/نقاط …», targets
//! with «تارگت: …» and the stop with «استاپ: …». A quoted leverage
//! («لوریج N») is tolerated and ignored. Symbols are forced to the
//! `…USDT` quote form.

use super::{dedup_take_profits, ensure_usdt, ParseReason};
use crate::text::extract_numbers;
use crate::types::{Entry, RangeAnchor, Side, Signal};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

static SYMBOL_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"رمزارز\s+([A-Za-z\u{0600}-\u{06FF}]+)").expect("valid regex"));
static SYMBOL_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([A-Za-z0-9]+)(?:/USDT)?").expect("valid regex"));
static ENTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:در\s+نقطه(?:\s+میانگین)?|در\s+نقاط)\s+([^\n]+)").expect("valid regex")
});
static TARGETS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"تارگت[:\s]+([^\n]+)").expect("valid regex"));
static STOP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"استاپ[:\s]+([^\n]+)").expect("valid regex"));

/// Content sniffing: Persian crypto marker words.
pub fn sniff(text: &str) -> bool {
    text.contains("رمزارز")
        || ((text.contains("لانگ") || text.contains("شورت")) && text.contains("تارگت"))
}

fn detect_symbol(text: &str) -> Option<String> {
    if let Some(caps) = SYMBOL_WORD_RE.captures(text) {
        return Some(ensure_usdt(&caps[1].to_uppercase()));
    }
    SYMBOL_TAG_RE
        .captures(text)
        .map(|caps| ensure_usdt(&caps[1].to_uppercase()))
}

fn detect_side(text: &str) -> Option<Side> {
    if text.contains("لانگ") || text.contains("اسپات خرید") {
        return Some(Side::Buy);
    }
    if text.contains("شورت") {
        return Some(Side::Sell);
    }
    None
}

fn entry_from(levels: Vec<Decimal>, side: Side) -> Option<Entry> {
    match levels.len() {
        0 => None,
        1 => Some(Entry::Point(levels[0])),
        // Several quoted fills form a band; the favorable bound anchors it.
        _ => {
            let anchor = match side {
                Side::Buy => RangeAnchor::Low,
                Side::Sell => RangeAnchor::High,
            };
            let min = levels.iter().copied().min()?;
            let max = levels.iter().copied().max()?;
            Some(Entry::range(min, max, anchor))
        }
    }
}

pub fn extract(text: &str, chat_id: i64) -> Result<Signal, ParseReason> {
    let symbol = detect_symbol(text).ok_or(ParseReason::NoSymbol)?;
    let side = detect_side(text).ok_or(ParseReason::NoSide)?;

    let entry_levels = ENTRY_RE
        .captures(text)
        .map(|caps| extract_numbers(&caps[1]))
        .unwrap_or_default();
    let entry = entry_from(entry_levels, side).ok_or(ParseReason::NoEntry)?;

    let tps = TARGETS_RE
        .captures(text)
        .map(|caps| dedup_take_profits(extract_numbers(&caps[1])))
        .unwrap_or_default();
    if tps.is_empty() {
        return Err(ParseReason::NoTakeProfit);
    }

    let stop_loss = STOP_RE
        .captures(text)
        .and_then(|caps| extract_numbers(&caps[1]).into_iter().next())
        .ok_or(ParseReason::NoStopLoss)?;

    Ok(Signal {
        symbol,
        side,
        entry,
        stop_loss,
        take_profits: tps,
        risk_reward: None,
        source_chat_id: chat_id,
        raw_text: text.to_string(),
    })
}
