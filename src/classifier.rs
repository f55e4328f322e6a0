//! Noise / update classifier
//!
//! Rejects trade updates ("TP hit", "move SL to entry") and promotional or
//! administrative chatter before any extraction runs. Matching is
//! phrase-based with word boundaries: "High-Risk" alone must never trip the
//! gate just because a noise phrase contains "risk".

use crate::text::{normalize_text, strip_emoji};
use once_cell::sync::Lazy;
use regex::Regex;

/// English phrases, matched case-insensitively as whole words.
const NOISE_PHRASES: &[&str] = &[
    "update",
    "closed",
    "close",
    "running",
    "result",
    "poll",
    "vote",
    "risk management",
    "risk free",
    "sale",
    "promo",
    "subscription",
    "move sl",
    "change tp",
    "break even",
    "breakeven",
    "new week",
    "contact",
    "upgrade",
    "open trades",
    "lot size",
    "analysis",
    "setup",
    "partial close",
    "hit tp",
    "sl reached",
    "set sl to entry",
    "activated",
    "cancel the order",
    "remove the order",
];

/// Patterns that need more structure than a fixed phrase: TP-progress
/// reports and the Persian update vocabulary of the crypto channels.
const NOISE_PATTERNS: &[&str] = &[
    r"tp\s*\d*\s*(hit|reached|touched?|done)",
    r"close\s+(half|all|manually)",
    r"تارگت\s+(اول|دوم|سوم|چهارم|پنجم)",
    r"فول\s*تارگت",
    r"استاپ\s+بیاد\s+نقطه\s+ورود",
    r"کلوز\s*کنید",
    r"در\s+نقطه\s+ورود\s+.*کلوز",
    r"این\s+معامله\s+اردر\s+پر\s+نکرده",
];

static NOISE_RE: Lazy<Regex> = Lazy::new(|| {
    let mut alts: Vec<String> = NOISE_PHRASES
        .iter()
        .map(|p| regex::escape(p).replace(' ', r"\s+"))
        .collect();
    alts.extend(NOISE_PATTERNS.iter().map(|p| (*p).to_string()));
    let pattern = format!(r"(?i)\b(?:{})\b", alts.join("|"));
    Regex::new(&pattern).expect("valid noise pattern")
});

/// Result markers like `✅+2.5%` / `❌-1.8%` are matched before emoji are
/// stripped, since the emoji carries the meaning.
static RESULT_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[✅❌][+\-]\d+(?:\.\d+)?\s*%").expect("valid marker pattern"));

/// Pure predicate: true when the message is an update or chatter rather
/// than a new signal.
pub fn is_noise(text: &str) -> bool {
    let normalized = normalize_text(text);
    if RESULT_MARKER_RE.is_match(&normalized) {
        return true;
    }
    NOISE_RE.is_match(&strip_emoji(&normalized))
}
