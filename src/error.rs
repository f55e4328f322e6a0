//! Error types for the signal relay bot

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("permission denied for {dest}: {reason}")]
    Permission { dest: String, reason: String },

    #[error("content protected in {dest}: {reason}")]
    ContentProtected { dest: String, reason: String },

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("reconnect attempts exhausted after {attempts} tries")]
    RetriesExhausted { attempts: u32 },
}

impl BotError {
    /// Transient errors are worth a reconnect; the rest terminate or skip.
    pub fn is_transient(&self) -> bool {
        matches!(self, BotError::Network(_) | BotError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BotError::Transport("reset by peer".to_string()).is_transient());
        assert!(!BotError::Config("missing token".to_string()).is_transient());
        assert!(!BotError::Permission {
            dest: "-100555".to_string(),
            reason: "kicked".to_string(),
        }
        .is_transient());
    }
}
