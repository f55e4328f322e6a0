//! Core types shared across the pipeline

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "Buy"),
            Side::Sell => write!(f, "Sell"),
        }
    }
}

/// Which point of a quoted entry range stands in for "the" entry price
/// when validating and deriving risk/reward. Labeled ranges keep the
/// first quoted (low) bound, shorthand ranges use the midpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeAnchor {
    Low,
    High,
    Midpoint,
}

/// Entry price: a single quote or an acceptable band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Entry {
    Point(Decimal),
    Range {
        low: Decimal,
        high: Decimal,
        anchor: RangeAnchor,
    },
}

impl Entry {
    pub fn range(a: Decimal, b: Decimal, anchor: RangeAnchor) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Entry::Range { low, high, anchor }
    }

    /// Representative price used for display and risk/reward derivation.
    pub fn reference(&self) -> Decimal {
        match self {
            Entry::Point(v) => *v,
            Entry::Range { low, high, anchor } => match anchor {
                RangeAnchor::Low => *low,
                RangeAnchor::High => *high,
                RangeAnchor::Midpoint => (*low + *high) / Decimal::TWO,
            },
        }
    }

    /// Lowest quoted entry level.
    pub fn low(&self) -> Decimal {
        match self {
            Entry::Point(v) => *v,
            Entry::Range { low, .. } => *low,
        }
    }

    /// Highest quoted entry level.
    pub fn high(&self) -> Decimal {
        match self {
            Entry::Point(v) => *v,
            Entry::Range { high, .. } => *high,
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, Entry::Range { .. })
    }
}

/// A parsed trading instruction, created per incoming message and consumed
/// immediately by the validator and router. Never persisted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Canonical instrument, e.g. `XAUUSD`.
    pub symbol: String,
    pub side: Side,
    pub entry: Entry,
    pub stop_loss: Decimal,
    /// At least one, deduplicated, quote order preserved.
    pub take_profits: Vec<Decimal>,
    /// Formatted ratio like `1/3`, explicit or derived.
    pub risk_reward: Option<String>,
    pub source_chat_id: i64,
    pub raw_text: String,
}

/// Normalized channel identity: a broadcast-channel numeric id or a bare
/// username handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelId {
    Id(i64),
    Handle(String),
}

const BROADCAST_PREFIX: &str = "-100";

impl ChannelId {
    /// Parse a raw identifier: strips `@` and t.me URL prefixes, coerces
    /// digit strings into the canonical `-100…` broadcast form.
    pub fn parse(raw: &str) -> Self {
        let mut s = raw.trim();
        for prefix in ["https://t.me/", "http://t.me/", "t.me/"] {
            if let Some(rest) = s.strip_prefix(prefix) {
                s = rest;
                break;
            }
        }
        s = s.trim_start_matches('@').trim();

        if s.starts_with('-') && s[1..].chars().all(|c| c.is_ascii_digit()) {
            if let Ok(id) = s.parse::<i64>() {
                return ChannelId::Id(id);
            }
        }
        if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(id) = format!("{BROADCAST_PREFIX}{s}").parse::<i64>() {
                return ChannelId::Id(id);
            }
        }
        ChannelId::Handle(s.to_string())
    }

    /// Coerce positive numeric ids into the broadcast form. Idempotent:
    /// an already-normalized id is returned unchanged.
    pub fn normalize(&self) -> Self {
        match self {
            ChannelId::Id(id) if *id > 0 => ChannelId::parse(&id.to_string()),
            ChannelId::Id(id) => ChannelId::Id(*id),
            ChannelId::Handle(h) => ChannelId::parse(h),
        }
    }

}

impl From<i64> for ChannelId {
    fn from(id: i64) -> Self {
        ChannelId::Id(id).normalize()
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelId::Id(id) => write!(f, "{id}"),
            ChannelId::Handle(h) => write!(f, "@{h}"),
        }
    }
}

/// Attached media, referenced by the transport's file handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub file_id: String,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Document,
}

/// An incoming feed message as handed over by the transport.
#[derive(Debug, Clone)]
pub struct FeedMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub date: DateTime<Utc>,
    pub text: String,
    pub media: Option<MediaRef>,
}

/// Resolved channel identity, used for startup diagnostics only.
#[derive(Debug, Clone)]
pub struct EntityInfo {
    pub id: i64,
    pub title: String,
}

/// Supervisor connection state. In-memory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Listening,
    Reconnecting,
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_channel_id_numeric_string() {
        assert_eq!(ChannelId::parse("12345"), ChannelId::Id(-10012345));
    }

    #[test]
    fn test_channel_id_already_broadcast() {
        assert_eq!(ChannelId::parse("-10012345"), ChannelId::Id(-10012345));
    }

    #[test]
    fn test_channel_id_username() {
        assert_eq!(
            ChannelId::parse("@mychannel"),
            ChannelId::Handle("mychannel".to_string())
        );
    }

    #[test]
    fn test_channel_id_url_numeric() {
        assert_eq!(
            ChannelId::parse("https://t.me/12345"),
            ChannelId::Id(-10012345)
        );
    }

    #[test]
    fn test_channel_id_url_handle() {
        assert_eq!(
            ChannelId::parse("t.me/somechannel"),
            ChannelId::Handle("somechannel".to_string())
        );
    }

    #[test]
    fn test_normalize_idempotent() {
        let once = ChannelId::Id(12345).normalize();
        assert_eq!(once, ChannelId::Id(-10012345));
        assert_eq!(once.normalize(), once);

        let handle = ChannelId::Handle("mychannel".to_string()).normalize();
        assert_eq!(handle.normalize(), handle);
    }

    #[test]
    fn test_from_positive_i64_coerces() {
        assert_eq!(ChannelId::from(67890), ChannelId::Id(-10067890));
        assert_eq!(ChannelId::from(-10067890), ChannelId::Id(-10067890));
    }

    #[test]
    fn test_entry_reference_low_anchor() {
        let e = Entry::range(dec!(1935), dec!(1930), RangeAnchor::Low);
        assert_eq!(e.reference(), dec!(1930));
        assert_eq!(e.low(), dec!(1930));
        assert_eq!(e.high(), dec!(1935));
    }

    #[test]
    fn test_entry_reference_midpoint_anchor() {
        let e = Entry::range(dec!(1900), dec!(1910), RangeAnchor::Midpoint);
        assert_eq!(e.reference(), dec!(1905));
    }

    #[test]
    fn test_entry_point_reference() {
        let e = Entry::Point(dec!(1.0800));
        assert_eq!(e.reference(), dec!(1.0800));
        assert!(!e.is_range());
    }
}
