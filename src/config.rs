//! Configuration management
//!
//! The bot only ever reads configuration: credentials, source/destination
//! lists and per-source profiles come from a layered file + environment
//! load and are handed to the core as plain structs.

use crate::dedup::DedupConfig;
use crate::error::{BotError, Result};
use crate::parser::Dialect;
use crate::types::ChannelId;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub telegram: Credentials,
    /// Channels to listen on; empty means all chats the account sees.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Default destinations when no profile route applies.
    #[serde(default)]
    pub destinations: Vec<String>,
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub api_id: i64,
    pub api_hash: String,
    /// Session/bot token for the transport; absence is a fatal start error.
    pub session_token: Option<String>,
}

/// Per-source parsing and routing configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub member_channels: Vec<String>,
    #[serde(default)]
    pub destinations: Vec<String>,
    #[serde(default)]
    pub options: ParseOptions,
    /// Destination id/handle -> template body.
    #[serde(default)]
    pub templates: HashMap<String, String>,
    /// `"SYMBOL:SIDE"` -> destinations replacing the default set.
    #[serde(default)]
    pub routes: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ParseOptions {
    #[serde(default)]
    pub allow_entry_range: bool,
    /// Hide the representative entry price when a range is quoted.
    #[serde(default)]
    pub show_entry_range_only: bool,
    #[serde(default)]
    pub skip_risk_reward: bool,
    /// Pin the source to a named dialect; sniffing still applies after it.
    #[serde(default)]
    pub dialect: Option<Dialect>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    /// Delay between outer reconnect rounds.
    pub retry_delay_secs: u64,
    /// Outer round ceiling; `None` retries forever.
    pub max_retries: Option<u32>,
    /// Inner reconnect attempts before falling back to the outer loop.
    pub inner_retries: u32,
    pub inner_delay_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: 5,
            max_retries: None,
            inner_retries: 3,
            inner_delay_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Upper bound on honoring a flood-wait, seconds.
    pub flood_wait_cap_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            flood_wait_cap_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from a file plus `SIGNAL_RELAY_*` env overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path
            .as_ref()
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("non-utf8 config path"))?;
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("SIGNAL_RELAY").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Load from default locations.
    pub fn load_default() -> anyhow::Result<Self> {
        let paths = ["config.toml", "~/.config/signal-relay/config.toml"];
        for path in paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::load(expanded.as_ref());
            }
        }
        anyhow::bail!("no configuration file found")
    }

    /// Fatal-at-start checks: missing credentials or an empty destination
    /// list must be reported synchronously, before listening begins.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.api_id == 0 || self.telegram.api_hash.is_empty() {
            return Err(BotError::Config("missing api credentials".to_string()));
        }
        if self
            .telegram
            .session_token
            .as_deref()
            .unwrap_or_default()
            .is_empty()
        {
            return Err(BotError::Config("missing session token".to_string()));
        }
        let any_profile_dest = self.profiles.values().any(|p| !p.destinations.is_empty());
        if self.destinations.is_empty() && !any_profile_dest {
            return Err(BotError::Config("no destinations configured".to_string()));
        }
        Ok(())
    }

    pub fn source_channels(&self) -> Vec<ChannelId> {
        self.sources.iter().map(|s| ChannelId::parse(s)).collect()
    }

    pub fn destination_channels(&self) -> Vec<ChannelId> {
        self.destinations.iter().map(|s| ChannelId::parse(s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Config {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml_str, config::FileFormat::Toml))
            .build()
            .expect("valid config");
        settings.try_deserialize().expect("deserializes")
    }

    const MINIMAL: &str = r#"
        sources = ["-1001111", "@goldvip"]
        destinations = ["555"]

        [telegram]
        api_id = 12345
        api_hash = "hash"
        session_token = "token"
    "#;

    #[test]
    fn test_minimal_config_parses_and_validates() {
        let cfg = parse(MINIMAL);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.source_channels()[0], ChannelId::Id(-1001111));
        assert_eq!(
            cfg.source_channels()[1],
            ChannelId::Handle("goldvip".to_string())
        );
        assert_eq!(cfg.destination_channels(), vec![ChannelId::Id(-100555)]);
        assert_eq!(cfg.dedup.grace_secs, 120);
        assert_eq!(cfg.supervisor.inner_retries, 3);
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let cfg = parse(
            r#"
            [telegram]
            api_id = 12345
            api_hash = "hash"
            destinations = ["555"]
        "#,
        );
        assert!(matches!(cfg.validate(), Err(BotError::Config(_))));
    }

    #[test]
    fn test_empty_destinations_fatal() {
        let cfg = parse(
            r#"
            [telegram]
            api_id = 12345
            api_hash = "hash"
            session_token = "token"
        "#,
        );
        assert!(matches!(cfg.validate(), Err(BotError::Config(_))));
    }

    #[test]
    fn test_profile_with_routes_and_options() {
        let cfg = parse(
            r#"
            [telegram]
            api_id = 1
            api_hash = "h"
            session_token = "t"
            destinations = ["555"]
            active_profile = "gold"

            [profiles.gold]
            member_channels = ["-1002222"]
            destinations = ["666"]

            [profiles.gold.options]
            allow_entry_range = true
            show_entry_range_only = true
            dialect = "entry_range"

            [profiles.gold.routes]
            "XAUUSD:BUY" = ["777"]

            [profiles.gold.templates]
            "666" = "{symbol} {side} {entry}"
        "#,
        );
        let profile = &cfg.profiles["gold"];
        assert!(profile.options.allow_entry_range);
        assert_eq!(profile.options.dialect, Some(Dialect::EntryRange));
        assert_eq!(profile.routes["XAUUSD:BUY"], vec!["777".to_string()]);
        assert!(profile.templates.contains_key("666"));
    }

    #[test]
    fn test_parse_options_default_forbids_ranges() {
        let opts = ParseOptions::default();
        assert!(!opts.allow_entry_range);
        assert!(!opts.skip_risk_reward);
    }
}
