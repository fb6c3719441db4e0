//! CGM Result Generation CLI
//!
//! Runs the analysis flows for scans stored in the scan API, and inspects
//! depth artifacts locally.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;

use commands::inspect::InspectDepthCommand;
use commands::run::RunCommand;

#[derive(Parser)]
#[command(
    name = "cgm-rg",
    version,
    about = "Result generation for child growth scans",
    after_help = "EXAMPLES:\n  \
                  # Process two scans with the configuration in config.yaml\n  \
                  cgm-rg run --config config.yaml 2f1c... 9ab0...\n\n  \
                  # Print header, missing-reading share and floor angle of a depth artifact\n  \
                  cgm-rg inspect-depth frame.depth"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate results for the given scans
    Run(RunCommand),

    /// Decode a depth artifact and print its quality features as JSON
    InspectDepth(InspectDepthCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Run(cmd) => cmd.execute().await,
        Commands::InspectDepth(cmd) => cmd.execute(),
    }
}
