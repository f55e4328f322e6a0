//! Telegram Trading-Signal Relay Bot
//!
//! Listens to trading-signal channels, parses free-form signal messages
//! into a structured form and relays them, reformatted, to destination
//! channels.

pub mod bot;
pub mod classifier;
pub mod config;
pub mod dedup;
pub mod delivery;
pub mod error;
pub mod parser;
pub mod router;
pub mod stats;
pub mod text;
pub mod transport;
pub mod types;
pub mod validator;
