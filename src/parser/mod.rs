//! Signal extraction: a strategy chain over source-specific dialects
//!
//! Selection order per message:
//! 1. the dialect the source profile declares, if any;
//! 2. content sniffing (entry-range shorthand, Persian crypto markers), so
//!    unseen variants of a known dialect still parse;
//! 3. the generic classic extractor.
//!
//! Every extractor fails with a typed [`ParseReason`], never a bare `None`,
//! so the chain can fall through (and log) precisely.

pub mod classic;
pub mod persian;
pub mod range;


use crate::classifier::is_noise;
use crate::config::ParseOptions;
use crate::text::normalize_text;
use crate::types::{Side, Signal};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cap on take-profit list size; longer lists are almost always a parse
/// artifact rather than a real ladder.
pub const MAX_TAKE_PROFITS: usize = 5;

/// Typed extraction failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseReason {
    #[error("empty message")]
    Empty,
    #[error("noise/update message")]
    Noise,
    #[error("no symbol")]
    NoSymbol,
    #[error("no position")]
    NoSide,
    #[error("no entry")]
    NoEntry,
    #[error("no stop-loss")]
    NoStopLoss,
    #[error("no take-profit")]
    NoTakeProfit,
    #[error("entry range not allowed for this source")]
    EntryRangeForbidden,
}

/// Named parsing dialects a profile can pin a source to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    Classic,
    /// Labeled `Entry Range: a - b` convention.
    EntryRange,
    /// Bare `a-b` / `@a-b` range line plus an action verb.
    RangeShorthand,
    /// Persian-language crypto channels.
    PersianCrypto,
}

/// Parse a message into a [`Signal`] through the strategy chain.
///
/// The input is normalized exactly once here; extractors receive the
/// normalized text.
pub fn parse_signal(raw: &str, chat_id: i64, opts: &ParseOptions) -> Result<Signal, ParseReason> {
    let text = normalize_text(raw);
    if text.trim().is_empty() {
        return Err(ParseReason::Empty);
    }
    if is_noise(&text) {
        return Err(ParseReason::Noise);
    }

    // A labeled entry range under a profile that forbids ranges rejects the
    // message outright rather than truncating it to one price. The bare
    // shorthand family is not gated: those channels never declare a profile.
    if !opts.allow_entry_range && range::has_labeled_range(&text) {
        return Err(ParseReason::EntryRangeForbidden);
    }

    let mut last_err = ParseReason::NoSymbol;
    for dialect in candidate_dialects(&text, opts) {
        let result = match dialect {
            Dialect::Classic => classic::extract(&text, chat_id),
            Dialect::EntryRange | Dialect::RangeShorthand => {
                range::extract(&text, chat_id, dialect)
            }
            Dialect::PersianCrypto => persian::extract(&text, chat_id),
        };
        match result {
            Ok(signal) => return Ok(signal),
            Err(reason) => last_err = reason,
        }
    }
    Err(last_err)
}

/// Build the chain for one message: declared dialect, sniffed dialects,
/// classic fallback. Duplicates removed, order preserved.
fn candidate_dialects(text: &str, opts: &ParseOptions) -> Vec<Dialect> {
    let mut chain = Vec::with_capacity(3);
    if let Some(declared) = opts.dialect {
        chain.push(declared);
    }
    if range::has_labeled_range(text) {
        chain.push(Dialect::EntryRange);
    } else if range::sniff_shorthand(text) {
        chain.push(Dialect::RangeShorthand);
    }
    if persian::sniff(text) {
        chain.push(Dialect::PersianCrypto);
    }
    chain.push(Dialect::Classic);
    let mut seen = Vec::new();
    chain.retain(|d| {
        if seen.contains(d) {
            false
        } else {
            seen.push(*d);
            true
        }
    });
    chain
}

// --- symbol handling ------------------------------------------------------

/// Aliases reconciled into one canonical instrument name.
const SYMBOL_ALIASES: &[(&str, &str)] = &[
    ("GOLD", "XAUUSD"),
    ("XAU", "XAUUSD"),
    ("SILVER", "XAGUSD"),
    ("XAG", "XAGUSD"),
    ("BTC", "BTCUSDT"),
    ("BITCOIN", "BTCUSDT"),
    ("ETH", "ETHUSDT"),
    ("OIL", "USOIL"),
    ("WTI", "USOIL"),
    ("USOIL", "USOIL"),
    ("NASDAQ", "NAS100"),
    ("NAS100", "NAS100"),
    ("DAX", "GER40"),
    ("GER40", "GER40"),
    ("SPX", "SPX500"),
    ("SPX500", "SPX500"),
    ("DOW", "US30"),
    ("US30", "US30"),
];

/// Words that look like symbols in uppercase scans but never are.
const NON_SYMBOL_TOKENS: &[&str] = &[
    "BUY", "SELL", "LONG", "SHORT", "MARKET", "LIMIT", "STOP", "ENTRY", "PRICE", "TP", "SL",
    "R", "RR", "VIP", "SIGNAL", "POSITION", "PIPS", "TARGET", "TARGETS", "RISK", "REWARD",
    "TAKE", "PROFIT", "ZONE", "NOW", "RANGE",
];

const CURRENCY_CODES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CHF", "CAD", "AUD", "NZD", "XAU", "XAG", "SGD", "CNH",
];

/// Uppercase, strip spaces and hash marks.
pub fn normalize_symbol(sym: &str) -> String {
    sym.trim()
        .to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '#')
        .collect()
}

/// Resolve aliases into the canonical instrument name.
pub fn canonicalize_symbol(sym: &str) -> String {
    let s = normalize_symbol(sym);
    for (alias, canon) in SYMBOL_ALIASES {
        if s == *alias {
            return (*canon).to_string();
        }
    }
    s
}

/// Whether an uppercase token plausibly names an instrument. Keeps generic
/// words like "UNITED" from being taken for symbols.
pub fn looks_like_symbol(token: &str) -> bool {
    let s = canonicalize_symbol(token);
    if s.len() < 3 || NON_SYMBOL_TOKENS.contains(&s.as_str()) {
        return false;
    }
    if SYMBOL_ALIASES.iter().any(|(_, canon)| s == *canon) {
        return true;
    }
    if s.len() == 6 && s.chars().all(|c| c.is_ascii_alphabetic()) {
        let (base, quote) = s.split_at(3);
        if CURRENCY_CODES.contains(&base) && CURRENCY_CODES.contains(&quote) {
            return true;
        }
    }
    if s.ends_with("USDT") && s.len() >= 6 {
        return true;
    }
    if s.ends_with("USD") && (6..=7).contains(&s.len()) {
        return true;
    }
    false
}

/// Force crypto symbols into the `…USDT` quote form.
pub fn ensure_usdt(sym: &str) -> String {
    let s = normalize_symbol(sym).replace("/USDT", "USDT");
    if s.ends_with("USDT") {
        return s;
    }
    static PLAIN_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^[A-Z0-9]{2,15}$").expect("valid regex"));
    if PLAIN_RE.is_match(&s) && !s.contains("USD") {
        return format!("{s}USDT");
    }
    s
}

static HASHTAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#\s*([A-Za-z0-9]{2,}(?:/[A-Za-z0-9]{2,})?)").expect("valid regex"));
static UPPER_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]{3,10}(?:/[A-Z0-9]{2,10})?\b").expect("valid regex"));

/// Detect the instrument: hashtags first, then alias words, then plausible
/// uppercase tokens.
pub fn detect_symbol(text: &str) -> Option<String> {
    if let Some(caps) = HASHTAG_RE.captures(text) {
        let raw = caps[1].replace('/', "");
        let sym = canonicalize_symbol(&raw);
        return Some(if sym.contains("USDT") { ensure_usdt(&sym) } else { sym });
    }
    static ALIAS_RE: Lazy<Regex> = Lazy::new(|| {
        let alts: Vec<&str> = SYMBOL_ALIASES.iter().map(|(alias, _)| *alias).collect();
        Regex::new(&format!(r"\b({})\b", alts.join("|"))).expect("valid regex")
    });
    let upper = text.to_uppercase();
    if let Some(caps) = ALIAS_RE.captures(&upper) {
        return Some(canonicalize_symbol(&caps[1]));
    }
    for m in UPPER_TOKEN_RE.find_iter(text) {
        let token = m.as_str().replace('/', "");
        if looks_like_symbol(&token) {
            return Some(canonicalize_symbol(&token));
        }
    }
    None
}

static BUY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(buy|long|grab|purchase|load|jump\s+in)\b").expect("valid regex")
});
static SELL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(sell|short|offload|unload|dump|ditch)\b").expect("valid regex")
});

static EXPLICIT_BUY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bbuy\b").expect("valid regex"));
static EXPLICIT_SELL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bsell\b").expect("valid regex"));

/// Detect direction including the informal synonyms the channels use.
/// Explicit buy/sell words win over slang, so "sell the long squeeze"
/// resolves to Sell.
pub fn detect_side(text: &str) -> Option<Side> {
    if EXPLICIT_BUY_RE.is_match(text) {
        return Some(Side::Buy);
    }
    if EXPLICIT_SELL_RE.is_match(text) {
        return Some(Side::Sell);
    }
    if SELL_RE.is_match(text) {
        return Some(Side::Sell);
    }
    if BUY_RE.is_match(text) {
        return Some(Side::Buy);
    }
    None
}

/// Deduplicate take-profits preserving quote order, capped defensively.
pub fn dedup_take_profits(tps: Vec<rust_decimal::Decimal>) -> Vec<rust_decimal::Decimal> {
    let mut seen = Vec::new();
    for tp in tps {
        if !seen.contains(&tp) {
            seen.push(tp);
        }
        if seen.len() == MAX_TAKE_PROFITS {
            break;
        }
    }
    seen
}

static EXPLICIT_RR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*[:/]\s*(\d+(?:\.\d+)?)").expect("valid regex"));

/// Extract an explicit risk/reward ratio from a line mentioning it.
pub fn extract_explicit_rr(text: &str) -> Option<String> {
    for line in text.lines() {
        let lower = line.to_lowercase();
        let mentions_rr = (lower.contains("risk") && lower.contains("reward"))
            || lower.contains("r/r")
            || lower.contains("rr ")
            || lower.starts_with("rr");
        if !mentions_rr {
            continue;
        }
        if let Some(caps) = EXPLICIT_RR_RE.captures(line) {
            return Some(format!("{}/{}", &caps[1], &caps[2]));
        }
    }
    None
}
