//! Telegram Trading-Signal Relay Bot
//!
//! Relays trading signals from source channels to destination channels.

use clap::{Parser, Subcommand};
use signal_relay::{
    bot::SignalBot,
    config::{Config, ParseOptions},
    parser,
    router,
    transport::BotApiTransport,
    validator,
};
use std::io::Read;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "signal-relay")]
#[command(about = "Relay trading signals between Telegram channels")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay bot
    Run,
    /// Validate the configuration and exit
    Check,
    /// Parse a signal message and print the rendered output
    Parse {
        /// Message text; reads stdin when omitted
        message: Option<String>,
        /// Accept entry ranges
        #[arg(long)]
        allow_entry_range: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => run_bot(load_config(cli.config.as_deref())?).await,
        Commands::Check => check_config(load_config(cli.config.as_deref())?),
        Commands::Parse {
            message,
            allow_entry_range,
        } => parse_message(message, allow_entry_range),
    }
}

fn load_config(path: Option<&str>) -> anyhow::Result<Config> {
    match path {
        Some(p) => Config::load(p),
        None => Config::load_default(),
    }
}

async fn run_bot(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting signal relay bot");

    let token = config
        .telegram
        .session_token
        .clone()
        .unwrap_or_default();
    let transport = Arc::new(BotApiTransport::new(&token));
    let bot = Arc::new(SignalBot::new(config, transport));

    let handle = Arc::clone(&bot);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            handle.stop();
        }
    });

    bot.run().await?;

    let stats = bot.stats_snapshot();
    tracing::info!(
        received = stats.received,
        sent = stats.sent,
        filtered = stats.filtered,
        rejected = stats.rejected,
        "Bot stopped"
    );
    Ok(())
}

fn check_config(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    println!("Configuration OK");
    println!("  sources: {}", config.source_channels().len());
    println!("  destinations: {}", config.destination_channels().len());
    println!("  profiles: {}", config.profiles.len());
    Ok(())
}

fn parse_message(message: Option<String>, allow_entry_range: bool) -> anyhow::Result<()> {
    let text = match message {
        Some(m) => m,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let options = ParseOptions {
        allow_entry_range,
        ..Default::default()
    };
    match parser::parse_signal(&text, 0, &options) {
        Ok(mut signal) => {
            validator::validate(&signal)?;
            validator::ensure_risk_reward(&mut signal);
            println!("{}", router::format_signal(&signal, &options));
            Ok(())
        }
        Err(reason) => anyhow::bail!("not a signal: {reason}"),
    }
}
