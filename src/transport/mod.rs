//! Feed transport abstraction
//!
//! The messaging client is an external collaborator: the core only needs
//! connect/disconnect, a new-message pump, send primitives and entity
//! resolution for diagnostics. The supervisor and delivery engine work
//! against this trait; tests mock it.

pub mod botapi;

pub use botapi::BotApiTransport;

use crate::error::Result;
use crate::types::{ChannelId, EntityInfo, FeedMessage, MediaRef};
use async_trait::async_trait;
use tokio::sync::mpsc;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn connect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    async fn disconnect(&self) -> Result<()>;

    /// Resolve a channel's identity, for startup diagnostics.
    async fn resolve_entity(&self, id: &ChannelId) -> Result<EntityInfo>;

    async fn send_text(&self, dest: &ChannelId, text: &str) -> Result<()>;

    /// Re-upload media by transport file handle, with a caption.
    async fn send_media(&self, dest: &ChannelId, media: &MediaRef, caption: &str) -> Result<()>;

    /// Native forward of an existing message.
    async fn forward(&self, dest: &ChannelId, source_chat: i64, message_id: i64) -> Result<()>;

    /// Pump incoming messages into `tx` until the connection drops.
    /// Returns `Ok` on orderly shutdown, `Err` on a transport failure.
    async fn run_until_disconnected(&self, tx: mpsc::Sender<FeedMessage>) -> Result<()>;
}
