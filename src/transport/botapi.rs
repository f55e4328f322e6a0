//! Telegram Bot API transport
//!
//! Long-polls `getUpdates` for incoming channel posts and maps the send
//! primitives onto `sendMessage`/`sendPhoto`/`forwardMessage`. Flood waits
//! surface as [`BotError::RateLimited`] with the API-mandated duration;
//! permission and protected-content failures map to their own variants so
//! the delivery engine can pick the right fallback.

use super::FeedTransport;
use crate::error::{BotError, Result};
use crate::types::{ChannelId, EntityInfo, FeedMessage, MediaKind, MediaRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tokio::sync::mpsc;

const POLL_TIMEOUT_SECS: u64 = 30;

pub struct BotApiTransport {
    http: Client,
    base_url: String,
    connected: AtomicBool,
    update_offset: AtomicI64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
    parameters: Option<ApiParameters>,
}

#[derive(Debug, Deserialize)]
struct ApiParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<ApiMessage>,
    channel_post: Option<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message_id: i64,
    date: i64,
    chat: ApiChat,
    text: Option<String>,
    caption: Option<String>,
    photo: Option<Vec<ApiPhotoSize>>,
    document: Option<ApiDocument>,
}

#[derive(Debug, Deserialize)]
struct ApiChat {
    id: i64,
    title: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiPhotoSize {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiDocument {
    file_id: String,
}

impl BotApiTransport {
    pub fn new(token: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: format!("https://api.telegram.org/bot{token}"),
            connected: AtomicBool::new(false),
            update_offset: AtomicI64::new(0),
        }
    }

    fn dest_value(dest: &ChannelId) -> serde_json::Value {
        match dest {
            ChannelId::Id(id) => json!(id),
            ChannelId::Handle(h) => json!(format!("@{h}")),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        dest: Option<&ChannelId>,
    ) -> Result<T> {
        let url = format!("{}/{method}", self.base_url);
        let response = self.http.post(&url).json(&body).send().await?;
        let parsed: ApiResponse<T> = response.json().await?;
        if parsed.ok {
            return parsed
                .result
                .ok_or_else(|| BotError::Transport(format!("{method}: empty result")));
        }
        Err(Self::map_api_error(
            method,
            parsed.error_code,
            parsed.description.unwrap_or_default(),
            parsed.parameters,
            dest,
        ))
    }

    fn map_api_error(
        method: &str,
        code: Option<i64>,
        description: String,
        parameters: Option<ApiParameters>,
        dest: Option<&ChannelId>,
    ) -> BotError {
        let dest_str = dest.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string());
        match code {
            Some(429) => BotError::RateLimited {
                retry_after_secs: parameters.and_then(|p| p.retry_after).unwrap_or(1),
            },
            Some(403) => BotError::Permission {
                dest: dest_str,
                reason: description,
            },
            Some(400) if description.to_lowercase().contains("protect")
                || description.to_lowercase().contains("forward") =>
            {
                BotError::ContentProtected {
                    dest: dest_str,
                    reason: description,
                }
            }
            Some(400) if description.to_lowercase().contains("not found") => {
                BotError::EntityNotFound(dest_str)
            }
            _ => BotError::Transport(format!("{method} failed: {description}")),
        }
    }

    fn to_feed_message(msg: ApiMessage) -> Option<FeedMessage> {
        let media = if let Some(photos) = &msg.photo {
            photos.last().map(|p| MediaRef {
                file_id: p.file_id.clone(),
                kind: MediaKind::Photo,
            })
        } else {
            msg.document.as_ref().map(|d| MediaRef {
                file_id: d.file_id.clone(),
                kind: MediaKind::Document,
            })
        };
        let text = msg.text.or(msg.caption).unwrap_or_default();
        if text.is_empty() && media.is_none() {
            return None;
        }
        let date: DateTime<Utc> = DateTime::from_timestamp(msg.date, 0)?;
        Some(FeedMessage {
            chat_id: msg.chat.id,
            message_id: msg.message_id,
            date,
            text,
            media,
        })
    }
}

#[async_trait]
impl FeedTransport for BotApiTransport {
    async fn connect(&self) -> Result<()> {
        // getMe doubles as a credential check.
        let me: serde_json::Value = self.call("getMe", json!({}), None).await?;
        tracing::info!(
            username = me.get("username").and_then(|v| v.as_str()).unwrap_or("?"),
            "transport connected"
        );
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn resolve_entity(&self, id: &ChannelId) -> Result<EntityInfo> {
        let chat: ApiChat = self
            .call("getChat", json!({ "chat_id": Self::dest_value(id) }), Some(id))
            .await?;
        let title = chat
            .title
            .or(chat.username)
            .unwrap_or_else(|| chat.id.to_string());
        Ok(EntityInfo { id: chat.id, title })
    }

    async fn send_text(&self, dest: &ChannelId, text: &str) -> Result<()> {
        let _: ApiMessage = self
            .call(
                "sendMessage",
                json!({ "chat_id": Self::dest_value(dest), "text": text }),
                Some(dest),
            )
            .await?;
        Ok(())
    }

    async fn send_media(&self, dest: &ChannelId, media: &MediaRef, caption: &str) -> Result<()> {
        let (method, field) = match media.kind {
            MediaKind::Photo => ("sendPhoto", "photo"),
            MediaKind::Document => ("sendDocument", "document"),
        };
        let _: ApiMessage = self
            .call(
                method,
                json!({
                    "chat_id": Self::dest_value(dest),
                    field: media.file_id,
                    "caption": caption,
                }),
                Some(dest),
            )
            .await?;
        Ok(())
    }

    async fn forward(&self, dest: &ChannelId, source_chat: i64, message_id: i64) -> Result<()> {
        let _: ApiMessage = self
            .call(
                "forwardMessage",
                json!({
                    "chat_id": Self::dest_value(dest),
                    "from_chat_id": source_chat,
                    "message_id": message_id,
                }),
                Some(dest),
            )
            .await?;
        Ok(())
    }

    async fn run_until_disconnected(&self, tx: mpsc::Sender<FeedMessage>) -> Result<()> {
        while self.is_connected() {
            let offset = self.update_offset.load(Ordering::SeqCst);
            let updates: Vec<Update> = match self
                .call(
                    "getUpdates",
                    json!({
                        "offset": offset,
                        "timeout": POLL_TIMEOUT_SECS,
                        "allowed_updates": ["message", "channel_post"],
                    }),
                    None,
                )
                .await
            {
                Ok(u) => u,
                Err(BotError::RateLimited { retry_after_secs }) => {
                    tokio::time::sleep(std::time::Duration::from_secs(retry_after_secs)).await;
                    continue;
                }
                Err(e) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(e);
                }
            };
            for update in updates {
                self.update_offset
                    .store(update.update_id + 1, Ordering::SeqCst);
                let msg = update.channel_post.or(update.message);
                if let Some(feed_msg) = msg.and_then(Self::to_feed_message) {
                    if tx.send(feed_msg).await.is_err() {
                        // Receiver gone: the supervisor is shutting down.
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}
