//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use triage_core::config;

mod commands;

#[derive(Parser)]
#[command(name = "triage")]
#[command(version = "0.1")]
#[command(about = "Streaming chat client for the triage consult graph")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Backend base origin (overrides TRIAGE_BASE_URL and config)
    #[arg(long, value_name = "URL", global = true)]
    base_url: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Start an interactive consult session (default)
    Chat {
        /// Opening message; when omitted, the composer prompts for one
        #[arg(value_name = "MESSAGE")]
        message: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Show the resolved configuration
    Show,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

/// Log filter comes from TRIAGE_LOG (tracing env-filter syntax). Logs go to
/// stderr so they never interleave with transcript output on stdout.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("TRIAGE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = config::Config::load().context("load config")?;

    match cli.command {
        None => commands::chat::run(&config, cli.base_url.as_deref(), None).await,
        Some(Commands::Chat { message }) => {
            commands::chat::run(&config, cli.base_url.as_deref(), message.as_deref()).await
        }
        Some(Commands::Config { command }) => match command {
            ConfigCommands::Path => commands::config::path(),
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::Show => commands::config::show(&config, cli.base_url.as_deref()),
        },
    }
}
