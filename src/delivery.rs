//! Signal delivery
//!
//! Fans a rendered signal out to its resolved destinations. Destinations
//! are independent: a permission failure on one never blocks the others.
//! Flood waits are honored up to a configured cap and the send retried
//! once; protected-content failures on media forwards fall back to a
//! re-upload copy.

use crate::config::{DeliveryConfig, ParseOptions};
use crate::error::{BotError, Result};
use crate::router::{self, Destination};
use crate::transport::FeedTransport;
use crate::types::{FeedMessage, Signal};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub delivered: usize,
}

impl DeliveryReport {
    /// A signal counts as relayed once any destination accepted it.
    pub fn is_sent(&self) -> bool {
        self.delivered > 0
    }
}

pub struct DeliveryEngine {
    transport: Arc<dyn FeedTransport>,
    flood_wait_cap: Duration,
}

impl DeliveryEngine {
    pub fn new(transport: Arc<dyn FeedTransport>, config: &DeliveryConfig) -> Self {
        Self {
            transport,
            flood_wait_cap: Duration::from_secs(config.flood_wait_cap_secs),
        }
    }

    /// Deliver `signal` to every destination, rendering per-destination
    /// templates. Returns how many destinations accepted it.
    pub async fn deliver(
        &self,
        signal: &Signal,
        source: &FeedMessage,
        destinations: &[Destination],
        options: &ParseOptions,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for dest in destinations {
            report.attempted += 1;
            let text = router::render_for(dest, signal, options);
            match self.deliver_one(dest, &text, source).await {
                Ok(()) => {
                    report.delivered += 1;
                    tracing::info!(
                        dest = %dest.channel,
                        symbol = %signal.symbol,
                        "signal delivered"
                    );
                }
                Err(BotError::Permission { dest, reason }) => {
                    tracing::warn!(%dest, %reason, "destination refused, skipping");
                }
                Err(e) => {
                    tracing::error!(dest = %dest.channel, error = %e, "delivery failed");
                }
            }
        }
        report
    }

    async fn deliver_one(
        &self,
        dest: &Destination,
        text: &str,
        source: &FeedMessage,
    ) -> Result<()> {
        self.with_flood_retry(|| self.transport.send_text(&dest.channel, text))
            .await?;

        // Charts travel as a native forward of the original message; if the
        // source protects its content, fall back to a re-upload copy.
        if let Some(media) = &source.media {
            let forwarded = self
                .with_flood_retry(|| {
                    self.transport
                        .forward(&dest.channel, source.chat_id, source.message_id)
                })
                .await;
            match forwarded {
                Ok(()) => {}
                Err(BotError::ContentProtected { dest: d, .. }) => {
                    tracing::debug!(dest = %d, "source protects content, copying media");
                    self.with_flood_retry(|| {
                        self.transport.send_media(&dest.channel, media, "")
                    })
                    .await?;
                }
                Err(e) => {
                    // The formatted text already landed; losing the chart is
                    // not worth failing the destination over.
                    tracing::warn!(dest = %dest.channel, error = %e, "media not relayed");
                }
            }
        }
        Ok(())
    }

    /// Run `op`; on a flood wait, sleep the mandated duration (capped) and
    /// retry exactly once.
    async fn with_flood_retry<F, Fut>(&self, op: F) -> Result<()>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        match op().await {
            Err(BotError::RateLimited { retry_after_secs }) => {
                let wait = Duration::from_secs(retry_after_secs).min(self.flood_wait_cap);
                tracing::warn!(wait_secs = wait.as_secs(), "flood wait, retrying once");
                tokio::time::sleep(wait).await;
                op().await
            }
            other => other,
        }
    }
}
