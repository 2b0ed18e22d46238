use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ollama_relay::config::Config;
use relay_cli::commands::{ConfigCommand, GenerateCommand};
use relay_cli::error::CliResult;
use relay_cli::output::OutputFormat;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Relay CLI - stream Ollama generations to the terminal")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Generate a completion and stream it to stdout")]
    Generate(GenerateCommand),

    #[clap(about = "Configuration commands")]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    init_logging();

    let cli = Cli::parse();
    let format = OutputFormat::from_json_flag(cli.json);

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env_overrides()?;

    match &cli.command {
        Command::Generate(cmd) => {
            config.validate()?;
            cmd.execute(&config, format).await
        }
        Command::Config(cmd) => cmd.execute(&config, cli.config.as_deref(), format).await,
    }
}

/// Logs go to stderr so generated text on stdout stays clean
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
