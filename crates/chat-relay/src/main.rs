//! chat-relay - HTTP relay streaming chat completions from an upstream LLM API

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use chat_relay::config::Config;
use chat_relay::error::Result;
use chat_relay::relay::RelayServer;

/// chat-relay - Stream chat completions from an OpenAI-compatible API
#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(about = "A single-endpoint HTTP relay for streaming chat completions")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on (overrides config and PORT)
    #[arg(long, short = 'p', global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the relay server (default command)
    #[command(name = "serve")]
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config, cli.port).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chat_relay=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    if let Some(path) = config_path {
        tracing::info!("Loading config from: {}", path.display());
        return Config::from_file(&path);
    }

    let default_paths = [
        dirs::home_dir().map(|h| h.join(".chat-relay").join("config.toml")),
        dirs::config_dir().map(|c| c.join("chat-relay").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ];

    for path in default_paths.iter().flatten() {
        if path.exists() {
            tracing::info!("Loading config from: {}", path.display());
            return Config::from_file(path);
        }
    }

    tracing::info!("No config file found, using defaults");
    Ok(Config::default())
}

async fn serve(config_path: Option<PathBuf>, port: Option<u16>) -> Result<()> {
    tracing::info!("Starting chat-relay");

    let mut config = load_config(config_path)?;
    config.apply_env()?;
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;
    tracing::debug!("Config loaded: {:?}", config);

    RelayServer::new(config).serve().await?;

    tracing::info!("chat-relay stopped");
    Ok(())
}
