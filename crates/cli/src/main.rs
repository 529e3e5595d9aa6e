//! Podwatch CLI
//!
//! A command-line tool for triggering collection on the podwatch agent and
//! checking its health.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{collect, status};

/// Podwatch CLI
#[derive(Parser)]
#[command(name = "podwatch")]
#[command(author, version, about = "CLI for the Podwatch pod metrics collector", long_about = None)]
pub struct Cli {
    /// Agent API URL (can also be set via PODWATCH_API_URL env var)
    #[arg(long, env = "PODWATCH_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one collection cycle now and show its report
    Collect,

    /// Start periodic collection on the agent
    Start {
        /// Seconds between cycle starts
        #[arg(long, default_value_t = 60)]
        period: u64,
    },

    /// Show agent component health
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    let api_url = config.resolve_api_url(cli.api_url);

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    let result = match cli.command {
        Commands::Collect => collect::collect(&client, cli.format).await,
        Commands::Start { period } => collect::start(&client, period, cli.format).await,
        Commands::Status => status::show_status(&client, cli.format).await,
    };

    if let Err(e) = &result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
