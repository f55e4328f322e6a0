//! Runtime counters and a bounded recent-message log
//!
//! Read-only diagnostic view for an external dashboard; nothing here is
//! persisted. Counters survive reconnects but not process restarts.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;

const MAX_RECENT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Sent,
    Filtered,
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentEntry {
    pub ts: DateTime<Utc>,
    pub chat_id: i64,
    pub symbol: Option<String>,
    pub side: Option<String>,
    pub outcome: Outcome,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub filtered: u64,
    pub parsed: u64,
    pub sent: u64,
    pub rejected: u64,
    pub recent_messages: Vec<RecentEntry>,
}

#[derive(Debug, Default)]
struct Inner {
    received: u64,
    filtered: u64,
    parsed: u64,
    sent: u64,
    rejected: u64,
    recent: VecDeque<RecentEntry>,
}

/// Per-bot counters; cheap to share behind the bot handle.
#[derive(Debug, Default)]
pub struct Stats {
    inner: RwLock<Inner>,
}

impl Stats {
    pub fn record_received(&self) {
        self.inner.write().received += 1;
    }

    pub fn record_filtered(&self, chat_id: i64, detail: &str) {
        let mut inner = self.inner.write();
        inner.filtered += 1;
        Self::push_recent(&mut inner, chat_id, None, None, Outcome::Filtered, detail);
    }

    pub fn record_parsed(&self) {
        self.inner.write().parsed += 1;
    }

    pub fn record_sent(&self, chat_id: i64, symbol: &str, side: &str) {
        let mut inner = self.inner.write();
        inner.sent += 1;
        Self::push_recent(
            &mut inner,
            chat_id,
            Some(symbol.to_string()),
            Some(side.to_string()),
            Outcome::Sent,
            "delivered",
        );
    }

    pub fn record_rejected(&self, chat_id: i64, detail: &str) {
        let mut inner = self.inner.write();
        inner.rejected += 1;
        Self::push_recent(&mut inner, chat_id, None, None, Outcome::Rejected, detail);
    }

    fn push_recent(
        inner: &mut Inner,
        chat_id: i64,
        symbol: Option<String>,
        side: Option<String>,
        outcome: Outcome,
        detail: &str,
    ) {
        inner.recent.push_back(RecentEntry {
            ts: Utc::now(),
            chat_id,
            symbol,
            side,
            outcome,
            detail: detail.to_string(),
        });
        while inner.recent.len() > MAX_RECENT {
            inner.recent.pop_front();
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.read();
        StatsSnapshot {
            received: inner.received,
            filtered: inner.filtered,
            parsed: inner.parsed,
            sent: inner.sent,
            rejected: inner.rejected,
            recent_messages: inner.recent.iter().cloned().collect(),
        }
    }
}
