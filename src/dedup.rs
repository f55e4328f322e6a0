//! Freshness gate and duplicate suppression
//!
//! Two independent TTL-bounded sliding windows: one keyed by message
//! identity `(chat_id, message_id)`, one by a content fingerprint that
//! catches re-sends under a new id. A startup grace window additionally
//! drops backlog replayed by the transport after reconnects. Nothing here
//! survives a process restart.

use crate::text::normalize_text;
use crate::types::FeedMessage;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    /// Messages older than `process_start - grace_secs` are backlog.
    pub grace_secs: i64,
    pub identity_ttl_secs: i64,
    pub fingerprint_ttl_secs: i64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            grace_secs: 120,
            identity_ttl_secs: 3600,
            fingerprint_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Fresh,
    /// Predates the startup grace window; dropped silently.
    Stale,
    /// Seen in either sliding window.
    Duplicate,
}

/// FIFO queue + membership set: amortised O(1) eviction on every check.
#[derive(Debug)]
struct Window<K: Eq + Hash + Clone> {
    ttl: Duration,
    queue: VecDeque<(DateTime<Utc>, K)>,
    members: HashSet<K>,
}

impl<K: Eq + Hash + Clone> Window<K> {
    fn new(ttl_secs: i64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs),
            queue: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        while let Some((inserted, _)) = self.queue.front() {
            if now - *inserted <= self.ttl {
                break;
            }
            if let Some((_, key)) = self.queue.pop_front() {
                self.members.remove(&key);
            }
        }
    }

    fn contains(&mut self, key: &K, now: DateTime<Utc>) -> bool {
        self.evict(now);
        self.members.contains(key)
    }

    fn insert(&mut self, key: K, now: DateTime<Utc>) {
        if self.members.insert(key.clone()) {
            self.queue.push_back((now, key));
        }
    }
}

/// The filter is not internally synchronized; the bot serializes access
/// behind one mutex so concurrent duplicates cannot both pass.
#[derive(Debug)]
pub struct DedupFilter {
    process_start: DateTime<Utc>,
    grace: Duration,
    identity: Window<(i64, i64)>,
    fingerprint: Window<String>,
}

impl DedupFilter {
    pub fn new(config: &DedupConfig) -> Self {
        Self::with_start(config, Utc::now())
    }

    pub fn with_start(config: &DedupConfig, process_start: DateTime<Utc>) -> Self {
        Self {
            process_start,
            grace: Duration::seconds(config.grace_secs),
            identity: Window::new(config.identity_ttl_secs),
            fingerprint: Window::new(config.fingerprint_ttl_secs),
        }
    }

    pub fn check(&mut self, msg: &FeedMessage) -> Verdict {
        self.check_at(msg, Utc::now())
    }

    /// Freshness runs before dedup so stale backlog never pollutes the
    /// windows. A hit in either window is a duplicate and inserts nothing
    /// further; first sight registers in both.
    pub fn check_at(&mut self, msg: &FeedMessage, now: DateTime<Utc>) -> Verdict {
        if msg.date < self.process_start - self.grace {
            return Verdict::Stale;
        }

        let identity = (msg.chat_id, msg.message_id);
        let print = fingerprint(msg);
        if self.identity.contains(&identity, now) || self.fingerprint.contains(&print, now) {
            return Verdict::Duplicate;
        }
        self.identity.insert(identity, now);
        self.fingerprint.insert(print, now);
        Verdict::Fresh
    }
}

/// Content identity: normalized text, media handle and source chat.
pub fn fingerprint(msg: &FeedMessage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(&msg.text).as_bytes());
    if let Some(media) = &msg.media {
        hasher.update(media.file_id.as_bytes());
    }
    hasher.update(msg.chat_id.to_le_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(chat_id: i64, message_id: i64, text: &str, date: DateTime<Utc>) -> FeedMessage {
        FeedMessage {
            chat_id,
            message_id,
            date,
            text: text.to_string(),
            media: None,
        }
    }

    fn filter_started_at(start: DateTime<Utc>) -> DedupFilter {
        DedupFilter::with_start(&DedupConfig::default(), start)
    }

    #[test]
    fn test_duplicate_message_id() {
        let start = Utc::now();
        let mut f = filter_started_at(start);
        assert_eq!(f.check_at(&msg(123, 1, "hello", start), start), Verdict::Fresh);
        assert_eq!(f.check_at(&msg(123, 1, "hello", start), start), Verdict::Duplicate);
        assert_eq!(f.check_at(&msg(123, 2, "world", start), start), Verdict::Fresh);
    }

    #[test]
    fn test_duplicate_content_different_id() {
        let start = Utc::now();
        let mut f = filter_started_at(start);
        assert_eq!(f.check_at(&msg(456, 10, "same content", start), start), Verdict::Fresh);
        assert_eq!(
            f.check_at(&msg(456, 11, "same content", start), start),
            Verdict::Duplicate
        );
        assert_eq!(
            f.check_at(&msg(456, 12, "different content", start), start),
            Verdict::Fresh
        );
    }

    #[test]
    fn test_same_content_other_chat_not_duplicate() {
        let start = Utc::now();
        let mut f = filter_started_at(start);
        assert_eq!(f.check_at(&msg(1, 1, "text", start), start), Verdict::Fresh);
        assert_eq!(f.check_at(&msg(2, 1, "text", start), start), Verdict::Fresh);
    }

    #[test]
    fn test_fingerprint_uses_normalized_text() {
        let start = Utc::now();
        let mut f = filter_started_at(start);
        assert_eq!(f.check_at(&msg(1, 1, "Entry  ۱۹۰۰", start), start), Verdict::Fresh);
        // Same content after normalization, new message id.
        assert_eq!(f.check_at(&msg(1, 2, "Entry 1900", start), start), Verdict::Duplicate);
    }

    #[test]
    fn test_ttl_eviction_allows_reprocessing() {
        let start = Utc::now();
        let mut f = filter_started_at(start);
        assert_eq!(f.check_at(&msg(1, 1, "sig", start), start), Verdict::Fresh);

        let later = start + Duration::seconds(3601);
        // Identity and fingerprint both expired; same message passes again.
        assert_eq!(f.check_at(&msg(1, 1, "sig", later), later), Verdict::Fresh);
    }

    #[test]
    fn test_within_ttl_still_duplicate() {
        let start = Utc::now();
        let mut f = filter_started_at(start);
        f.check_at(&msg(1, 1, "sig", start), start);
        let later = start + Duration::seconds(3599);
        assert_eq!(f.check_at(&msg(1, 1, "sig", later), later), Verdict::Duplicate);
    }

    #[test]
    fn test_freshness_boundary() {
        let start = Utc::now();
        let mut f = filter_started_at(start);
        let boundary = start - Duration::seconds(120);
        assert_eq!(f.check_at(&msg(1, 1, "on time", boundary), start), Verdict::Fresh);

        let too_old = boundary - Duration::milliseconds(1);
        assert_eq!(f.check_at(&msg(1, 2, "late", too_old), start), Verdict::Stale);
    }

    #[test]
    fn test_stale_does_not_pollute_windows() {
        let start = Utc::now();
        let mut f = filter_started_at(start);
        let old = start - Duration::seconds(999);
        assert_eq!(f.check_at(&msg(1, 1, "backlog", old), start), Verdict::Stale);
        // The same identity arriving fresh is not a duplicate.
        assert_eq!(f.check_at(&msg(1, 1, "backlog", start), start), Verdict::Fresh);
    }

    #[test]
    fn test_media_identity_changes_fingerprint() {
        use crate::types::{MediaKind, MediaRef};
        let start = Utc::now();
        let mut f = filter_started_at(start);
        let mut a = msg(1, 1, "chart", start);
        a.media = Some(MediaRef {
            file_id: "file-aaa".to_string(),
            kind: MediaKind::Photo,
        });
        let mut b = msg(1, 2, "chart", start);
        b.media = Some(MediaRef {
            file_id: "file-bbb".to_string(),
            kind: MediaKind::Photo,
        });
        assert_eq!(f.check_at(&a, start), Verdict::Fresh);
        assert_eq!(f.check_at(&b, start), Verdict::Fresh);
    }
}
