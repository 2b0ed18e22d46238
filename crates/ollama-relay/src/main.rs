//! Ollama Relay daemon - streams Ollama generations to HTTP clients as plain text

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ollama_relay::config::Config;
use ollama_relay::error::Result;
use ollama_relay::server::RelayServer;

/// Ollama Relay - reframes Ollama's JSON output into a plain text stream
#[derive(Parser)]
#[command(name = "ollama-relay")]
#[command(about = "Relay Ollama generations to HTTP clients as a plain text stream")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

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
        None | Some(Command::Serve) => serve(cli.config).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ollama_relay=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting Ollama Relay");

    let mut config = Config::load(config_path.as_deref())?;
    config.apply_env_overrides()?;
    config.validate()?;
    tracing::debug!("Config loaded: {:?}", config);

    RelayServer::new(config).serve().await?;

    tracing::info!("Ollama Relay stopped");
    Ok(())
}
