//! Bot core: message pipeline and connection supervisor
//!
//! One [`SignalBot`] owns the whole pipeline. Incoming feed messages pass
//! the freshness/duplicate gate, the noise classifier, the parser chain and
//! the directional validator before routing and delivery. The supervisor
//! keeps the transport connected: a dropped connection is retried in a
//! short inner loop first, then in bounded outer rounds with jittered
//! delays between them.

use crate::config::Config;
use crate::dedup::{DedupFilter, Verdict};
use crate::delivery::DeliveryEngine;
use crate::error::{BotError, Result};
use crate::parser::{self, ParseReason};
use crate::router::{self, RoutingContext};
use crate::stats::{Stats, StatsSnapshot};
use crate::transport::FeedTransport;
use crate::types::{ChannelId, ConnectionState, FeedMessage, Signal};
use crate::validator;
use parking_lot::{Mutex, RwLock};
use rand::Rng as _;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const FEED_CHANNEL_CAPACITY: usize = 128;

type SignalCallback = Box<dyn Fn(&Signal) + Send + Sync>;

enum ListenEnd {
    Stopped,
    Dropped,
}

pub struct SignalBot {
    config: Config,
    transport: Arc<dyn FeedTransport>,
    /// Re-keyed after connect once handle-form ids are resolved.
    routing: RwLock<RoutingContext>,
    delivery: DeliveryEngine,
    dedup: Mutex<DedupFilter>,
    stats: Stats,
    state: Mutex<ConnectionState>,
    stop_tx: watch::Sender<bool>,
    sources: RwLock<HashSet<ChannelId>>,
    on_signal: Mutex<Option<SignalCallback>>,
}

impl SignalBot {
    pub fn new(config: Config, transport: Arc<dyn FeedTransport>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            routing: RwLock::new(RoutingContext::new(&config)),
            delivery: DeliveryEngine::new(Arc::clone(&transport), &config.delivery),
            dedup: Mutex::new(DedupFilter::new(&config.dedup)),
            stats: Stats::default(),
            state: Mutex::new(ConnectionState::Disconnected),
            stop_tx,
            sources: RwLock::new(config.source_channels().into_iter().collect()),
            on_signal: Mutex::new(None),
            transport,
            config,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connecting
                | ConnectionState::Listening
                | ConnectionState::Reconnecting
        )
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Hook invoked after a signal is delivered to at least one destination.
    pub fn set_on_signal(&self, callback: SignalCallback) {
        *self.on_signal.lock() = Some(callback);
    }

    /// Request shutdown. Idempotent and callable from any task; the
    /// supervisor notices at its next select point.
    pub fn stop(&self) {
        // send_replace latches the value even when no receiver is
        // subscribed yet, so a stop before run() still takes effect.
        self.stop_tx.send_replace(true);
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state != next {
            tracing::info!(from = ?*state, to = ?next, "connection state");
            *state = next;
        }
    }

    /// Run until stopped or retries are exhausted. Configuration problems
    /// are fatal before any connection attempt.
    pub async fn run(&self) -> Result<()> {
        self.config.validate()?;
        let mut stop_rx = self.stop_tx.subscribe();
        let supervisor = self.config.supervisor.clone();
        let mut rounds: u32 = 0;

        loop {
            if *stop_rx.borrow() {
                self.set_state(ConnectionState::Stopped);
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);
            match self.transport.connect().await {
                Ok(()) => {
                    rounds = 0;
                    self.resolve_handles().await;
                    self.report_entities().await;
                    loop {
                        match self.listen(&mut stop_rx).await {
                            ListenEnd::Stopped => {
                                let _ = self.transport.disconnect().await;
                                self.set_state(ConnectionState::Stopped);
                                return Ok(());
                            }
                            ListenEnd::Dropped => {
                                self.set_state(ConnectionState::Reconnecting);
                                if self.reconnect_inner(&mut stop_rx).await {
                                    continue;
                                }
                                break;
                            }
                        }
                    }
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(error = %e, "connect failed");
                }
                Err(e) => {
                    // Bad credentials or a revoked bot will not heal with
                    // retries; surface the error instead of looping on it.
                    tracing::error!(error = %e, "connect failed, not retryable");
                    self.set_state(ConnectionState::Stopped);
                    return Err(e);
                }
            }

            if *stop_rx.borrow() {
                self.set_state(ConnectionState::Stopped);
                return Ok(());
            }

            rounds += 1;
            if let Some(max) = supervisor.max_retries {
                if rounds > max {
                    self.set_state(ConnectionState::Stopped);
                    return Err(BotError::RetriesExhausted { attempts: rounds });
                }
            }
            let delay = Duration::from_secs(supervisor.retry_delay_secs)
                + Duration::from_millis(rand::rng().random_range(0..1000));
            tracing::info!(round = rounds, delay_ms = delay.as_millis() as u64, "retrying");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop_rx.changed() => {}
            }
        }
    }

    /// Pump messages until the transport drops or a stop is requested.
    async fn listen(&self, stop_rx: &mut watch::Receiver<bool>) -> ListenEnd {
        self.set_state(ConnectionState::Listening);
        let (tx, mut rx) = mpsc::channel::<FeedMessage>(FEED_CHANNEL_CAPACITY);
        let transport = Arc::clone(&self.transport);
        let pump =
            tokio::spawn(async move { transport.run_until_disconnected(tx).await });

        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(msg) => self.handle_message(&msg).await,
                    None => {
                        // Pump finished and dropped its sender.
                        match pump.await {
                            Ok(Ok(())) => tracing::info!("feed pump ended"),
                            Ok(Err(e)) => tracing::warn!(error = %e, "connection dropped"),
                            Err(e) => tracing::error!(error = %e, "feed pump panicked"),
                        }
                        return ListenEnd::Dropped;
                    }
                },
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        pump.abort();
                        return ListenEnd::Stopped;
                    }
                }
            }
        }
    }

    /// Short fixed-delay reconnect attempts before handing the failure to
    /// the outer round loop. Returns whether the transport is back up.
    async fn reconnect_inner(&self, stop_rx: &mut watch::Receiver<bool>) -> bool {
        let supervisor = &self.config.supervisor;
        for attempt in 1..=supervisor.inner_retries {
            if *stop_rx.borrow() {
                return false;
            }
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(supervisor.inner_delay_secs)) => {}
                _ = stop_rx.changed() => { return false; }
            }
            match self.transport.connect().await {
                Ok(()) => {
                    tracing::info!(attempt, "reconnected");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "reconnect attempt failed");
                    if !e.is_transient() {
                        return false;
                    }
                }
            }
        }
        false
    }

    /// Sources and profile members may be configured as `@handles`, but
    /// incoming messages only carry numeric chat ids. Resolve every handle
    /// once per connect and match on the resolved ids from then on.
    async fn resolve_handles(&self) {
        let members = self
            .config
            .profiles
            .values()
            .flat_map(|p| p.member_channels.iter());
        let mut handles: Vec<String> = Vec::new();
        for raw in self.config.sources.iter().chain(members) {
            if let ChannelId::Handle(h) = ChannelId::parse(raw) {
                if !handles.contains(&h) {
                    handles.push(h);
                }
            }
        }
        if handles.is_empty() {
            return;
        }

        let mut resolved: HashMap<String, i64> = HashMap::new();
        for handle in handles {
            let id = ChannelId::Handle(handle.clone());
            match self.transport.resolve_entity(&id).await {
                Ok(info) => {
                    tracing::info!(handle = %handle, id = info.id, "handle resolved");
                    resolved.insert(handle, info.id);
                }
                Err(e) => {
                    tracing::warn!(
                        handle = %handle,
                        error = %e,
                        "handle not resolved, its messages cannot match"
                    );
                }
            }
        }
        if resolved.is_empty() {
            return;
        }

        *self.sources.write() = self
            .config
            .source_channels()
            .into_iter()
            .map(|c| router::resolve_channel(c, &resolved))
            .collect();
        self.routing.write().apply_resolved(&resolved);
    }

    /// Resolve configured channels for the startup log. Failures here are
    /// diagnostics, never fatal: an unreachable destination is skipped at
    /// delivery time instead.
    async fn report_entities(&self) {
        let mut channels = self.config.source_channels();
        channels.extend(self.config.destination_channels());
        for id in channels {
            match self.transport.resolve_entity(&id).await {
                Ok(info) => tracing::info!(channel = %id, title = %info.title, "resolved"),
                Err(e) => tracing::warn!(channel = %id, error = %e, "could not resolve"),
            }
        }
    }

    /// The full per-message pipeline. Runs on the supervisor task so the
    /// dedup check is naturally serialized.
    pub async fn handle_message(&self, msg: &FeedMessage) {
        {
            let sources = self.sources.read();
            if !sources.is_empty() && !sources.contains(&ChannelId::from(msg.chat_id)) {
                return;
            }
        }
        self.stats.record_received();

        match self.dedup.lock().check(msg) {
            Verdict::Stale => {
                tracing::debug!(chat = msg.chat_id, id = msg.message_id, "stale backlog");
                return;
            }
            Verdict::Duplicate => {
                self.stats.record_filtered(msg.chat_id, "duplicate");
                return;
            }
            Verdict::Fresh => {}
        }

        let options = self.routing.read().options_for(msg.chat_id);
        let mut signal = match parser::parse_signal(&msg.text, msg.chat_id, &options) {
            Ok(signal) => signal,
            Err(reason @ (ParseReason::Noise | ParseReason::Empty)) => {
                self.stats.record_filtered(msg.chat_id, &reason.to_string());
                return;
            }
            Err(reason) => {
                tracing::debug!(chat = msg.chat_id, %reason, "not a signal");
                self.stats.record_rejected(msg.chat_id, &reason.to_string());
                return;
            }
        };
        self.stats.record_parsed();

        if let Err(e) = validator::validate(&signal) {
            tracing::warn!(chat = msg.chat_id, symbol = %signal.symbol, error = %e, "rejected");
            self.stats.record_rejected(msg.chat_id, &e.to_string());
            return;
        }
        validator::ensure_risk_reward(&mut signal);

        let destinations = self.routing.read().resolve(&signal);
        let report = self
            .delivery
            .deliver(&signal, msg, &destinations, &options)
            .await;
        if report.is_sent() {
            self.stats
                .record_sent(msg.chat_id, &signal.symbol, &signal.side.to_string());
            if let Some(callback) = self.on_signal.lock().as_ref() {
                callback(&signal);
            }
        } else {
            self.stats
                .record_rejected(msg.chat_id, "no destination accepted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Credentials, DeliveryConfig, SupervisorConfig};
    use crate::transport::MockFeedTransport;
    use chrono::Utc;
    use std::collections::HashMap;

    fn config() -> Config {
        Config {
            telegram: Credentials {
                api_id: 1,
                api_hash: "h".to_string(),
                session_token: Some("t".to_string()),
            },
            sources: vec![],
            destinations: vec!["555".to_string()],
            profiles: HashMap::new(),
            active_profile: None,
            dedup: Default::default(),
            supervisor: SupervisorConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }

    fn message(message_id: i64, text: &str) -> FeedMessage {
        FeedMessage {
            chat_id: -1001,
            message_id,
            date: Utc::now(),
            text: text.to_string(),
            media: None,
        }
    }

    const VALID: &str = "GOLD BUY\nEntry: 1900\nTP1: 1910\nSL: 1895";

    #[tokio::test]
    async fn test_pipeline_delivers_valid_signal() {
        let mut mock = MockFeedTransport::new();
        mock.expect_send_text()
            .withf(|d, t| *d == ChannelId::Id(-100555) && t.contains("#XAUUSD"))
            .times(1)
            .returning(|_, _| Ok(()));
        let bot = SignalBot::new(config(), Arc::new(mock));

        bot.handle_message(&message(1, VALID)).await;

        let snap = bot.stats_snapshot();
        assert_eq!(snap.received, 1);
        assert_eq!(snap.parsed, 1);
        assert_eq!(snap.sent, 1);
    }

    #[tokio::test]
    async fn test_pipeline_filters_duplicate() {
        let mut mock = MockFeedTransport::new();
        mock.expect_send_text().times(1).returning(|_, _| Ok(()));
        let bot = SignalBot::new(config(), Arc::new(mock));

        bot.handle_message(&message(1, VALID)).await;
        bot.handle_message(&message(1, VALID)).await;

        let snap = bot.stats_snapshot();
        assert_eq!(snap.sent, 1);
        assert_eq!(snap.filtered, 1);
    }

    #[tokio::test]
    async fn test_pipeline_filters_noise() {
        let mock = MockFeedTransport::new();
        let bot = SignalBot::new(config(), Arc::new(mock));

        bot.handle_message(&message(1, "TP1 hit! Move SL to entry ✅+40%"))
            .await;

        let snap = bot.stats_snapshot();
        assert_eq!(snap.filtered, 1);
        assert_eq!(snap.parsed, 0);
    }

    #[tokio::test]
    async fn test_pipeline_rejects_inverted_stop() {
        let mock = MockFeedTransport::new();
        let bot = SignalBot::new(config(), Arc::new(mock));

        // Stop above entry on a buy.
        bot.handle_message(&message(1, "GOLD BUY\nEntry: 1900\nTP1: 1910\nSL: 1950"))
            .await;

        let snap = bot.stats_snapshot();
        assert_eq!(snap.parsed, 1);
        assert_eq!(snap.rejected, 1);
        assert_eq!(snap.sent, 0);
    }

    #[tokio::test]
    async fn test_source_filter_ignores_unlisted_chat() {
        let mock = MockFeedTransport::new();
        let mut cfg = config();
        cfg.sources = vec!["-1009999".to_string()];
        let bot = SignalBot::new(cfg, Arc::new(mock));

        bot.handle_message(&message(1, VALID)).await;

        assert_eq!(bot.stats_snapshot().received, 0);
    }

    #[tokio::test]
    async fn test_handle_source_matches_after_resolution() {
        let mut mock = MockFeedTransport::new();
        mock.expect_resolve_entity()
            .withf(|id| *id == ChannelId::Handle("goldvip".to_string()))
            .times(1)
            .returning(|_| {
                Ok(crate::types::EntityInfo {
                    id: -100123,
                    title: "Gold VIP".to_string(),
                })
            });
        mock.expect_send_text().times(1).returning(|_, _| Ok(()));

        let mut cfg = config();
        cfg.sources = vec!["@goldvip".to_string()];
        let bot = SignalBot::new(cfg, Arc::new(mock));

        let mut msg = message(1, VALID);
        msg.chat_id = -100123;

        // Unresolved handle: the numeric chat id cannot match yet.
        bot.handle_message(&msg).await;
        assert_eq!(bot.stats_snapshot().received, 0);

        bot.resolve_handles().await;

        bot.handle_message(&msg).await;
        let snap = bot.stats_snapshot();
        assert_eq!(snap.received, 1);
        assert_eq!(snap.sent, 1);
    }

    #[tokio::test]
    async fn test_unrelated_handle_source_still_filters() {
        let mut mock = MockFeedTransport::new();
        mock.expect_resolve_entity().times(1).returning(|_| {
            Ok(crate::types::EntityInfo {
                id: -100123,
                title: "Gold VIP".to_string(),
            })
        });

        let mut cfg = config();
        cfg.sources = vec!["@goldvip".to_string()];
        let bot = SignalBot::new(cfg, Arc::new(mock));
        bot.resolve_handles().await;

        let mut msg = message(1, VALID);
        msg.chat_id = -100999;
        bot.handle_message(&msg).await;
        assert_eq!(bot.stats_snapshot().received, 0);
    }

    #[tokio::test]
    async fn test_non_transient_connect_error_is_fatal() {
        let mut mock = MockFeedTransport::new();
        // Exactly one attempt: a credential failure must not be retried.
        mock.expect_connect().times(1).returning(|| {
            Err(BotError::Permission {
                dest: "-".to_string(),
                reason: "unauthorized".to_string(),
            })
        });
        let bot = SignalBot::new(config(), Arc::new(mock));

        assert!(matches!(bot.run().await, Err(BotError::Permission { .. })));
        assert_eq!(bot.state(), ConnectionState::Stopped);
    }

    #[tokio::test]
    async fn test_callback_fires_after_delivery() {
        let mut mock = MockFeedTransport::new();
        mock.expect_send_text().times(1).returning(|_, _| Ok(()));
        let bot = SignalBot::new(config(), Arc::new(mock));

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bot.set_on_signal(Box::new(move |s| sink.lock().push(s.symbol.clone())));

        bot.handle_message(&message(1, VALID)).await;
        assert_eq!(*seen.lock(), vec!["XAUUSD".to_string()]);
    }

    #[tokio::test]
    async fn test_run_honors_pre_stop() {
        let mock = MockFeedTransport::new();
        let bot = SignalBot::new(config(), Arc::new(mock));
        bot.stop();

        assert!(bot.run().await.is_ok());
        assert_eq!(bot.state(), ConnectionState::Stopped);
        assert!(!bot.is_running());
    }

    #[tokio::test]
    async fn test_run_fails_fast_on_bad_config() {
        let mock = MockFeedTransport::new();
        let mut cfg = config();
        cfg.telegram.session_token = None;
        let bot = SignalBot::new(cfg, Arc::new(mock));

        assert!(matches!(bot.run().await, Err(BotError::Config(_))));
    }

    #[tokio::test]
    async fn test_retries_exhausted_stops_with_error() {
        let mut mock = MockFeedTransport::new();
        mock.expect_connect()
            .returning(|| Err(BotError::Transport("refused".to_string())));
        let mut cfg = config();
        cfg.supervisor.max_retries = Some(1);
        cfg.supervisor.retry_delay_secs = 0;
        let bot = SignalBot::new(cfg, Arc::new(mock));

        let result = bot.run().await;
        assert!(matches!(result, Err(BotError::RetriesExhausted { attempts: 2 })));
        assert_eq!(bot.state(), ConnectionState::Stopped);
    }
}
