//! Text normalization for noisy, multi-language feed messages
//!
//! Source channels mix Persian/Arabic digits, RTL control marks, emoji and
//! inconsistent separators. Everything downstream (classifier, parsers)
//! operates on the normalized form produced here.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

const PERSIAN_DIGITS: [char; 10] = ['۰', '۱', '۲', '۳', '۴', '۵', '۶', '۷', '۸', '۹'];
const ARABIC_DIGITS: [char; 10] = ['٠', '١', '٢', '٣', '٤', '٥', '٦', '٧', '٨', '٩'];

/// Arabic decimal separator, mapped to `.`.
const ARABIC_DECIMAL_SEP: char = '٫';
/// Arabic thousands separator, stripped outright.
const ARABIC_THOUSANDS_SEP: char = '٬';

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}'..='\u{200F}'       // zero-width + LRM/RLM
        | '\u{202A}'..='\u{202E}'     // bidi embedding controls
        | '\u{2060}'..='\u{2064}'
        | '\u{061C}'                  // arabic letter mark
        | '\u{FEFF}'
    )
}

fn is_emoji(c: char) -> bool {
    matches!(
        c,
        '\u{1F000}'..='\u{1FAFF}'     // pictographs, symbols, flags
        | '\u{2600}'..='\u{27BF}'     // misc symbols + dingbats
        | '\u{2B00}'..='\u{2BFF}'
        | '\u{FE0E}' | '\u{FE0F}'     // variation selectors
        | '\u{203C}' | '\u{2049}'
    )
}

/// Normalize a raw feed message: ASCII digits, `.` decimal separator, no
/// invisible/bidi characters, collapsed horizontal whitespace. Idempotent.
pub fn normalize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c == '\r' || is_invisible(c) || c == ARABIC_THOUSANDS_SEP {
            continue;
        }
        if let Some(i) = PERSIAN_DIGITS.iter().position(|&d| d == c) {
            out.push(char::from(b'0' + i as u8));
        } else if let Some(i) = ARABIC_DIGITS.iter().position(|&d| d == c) {
            out.push(char::from(b'0' + i as u8));
        } else if c == ARABIC_DECIMAL_SEP {
            out.push('.');
        } else if c == '\u{00A0}' || c == '\t' {
            out.push(' ');
        } else {
            out.push(c);
        }
    }

    // Collapse runs of spaces per line, keep line structure intact.
    let mut collapsed = String::with_capacity(out.len());
    for (i, line) in out.split('\n').enumerate() {
        if i > 0 {
            collapsed.push('\n');
        }
        let mut last_space = false;
        for c in line.trim().chars() {
            if c == ' ' {
                if !last_space {
                    collapsed.push(' ');
                }
                last_space = true;
            } else {
                collapsed.push(c);
                last_space = false;
            }
        }
    }
    collapsed
}

/// Remove emoji so keyword/phrase matching sees plain words.
pub fn strip_emoji(input: &str) -> String {
    input.chars().filter(|&c| !is_emoji(c)).collect()
}

static THOUSANDS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d),(\d{3})(\D|$)").expect("valid regex"));
static RANGE_DASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d)\s*-\s*(\d)").expect("valid regex"));
static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid regex"));
static UNIT_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(pips?|pts?|points?|%)").expect("valid regex"));

/// Prepare a text chunk for numeric extraction: unify unicode dashes, drop
/// thousands separators, turn decimal commas into dots and split `a-b`
/// ranges into two numbers.
pub fn normalize_numeric_text(input: &str) -> String {
    let mut t: String = normalize_text(input)
        .chars()
        .map(|c| match c {
            '\u{2010}'..='\u{2015}' | '\u{2212}' => '-',
            '،' => ',',
            _ => c,
        })
        .collect();
    // Strip "1,200"-style separators; repeat for "1,234,567".
    loop {
        let replaced = THOUSANDS_RE.replace_all(&t, "$1$2$3").into_owned();
        if replaced == t {
            break;
        }
        t = replaced;
    }
    let t = t.replace(',', ".");
    // A dash between digits is a range, not a negative number.
    RANGE_DASH_RE.replace_all(&t, "$1 $2").into_owned()
}

/// Extract decimal values from a chunk, skipping numbers that are governed
/// by a unit word (`30 pips`, `50%`) rather than quoting a price.
pub fn extract_numbers(input: &str) -> Vec<Decimal> {
    let t = normalize_numeric_text(input);
    let mut out = Vec::new();
    for m in NUMBER_RE.find_iter(&t) {
        let tail = &t[m.end()..];
        if UNIT_SUFFIX_RE.is_match(tail) {
            continue;
        }
        if let Ok(v) = Decimal::from_str(m.as_str()) {
            out.push(v);
        }
    }
    out
}
