//! drctl - disaster recovery control
//!
//! Drives the failover/failback engine from the terminal.

use anyhow::Result;
use clap::Parser;
use dr_shared::DrConfig;
use drctl::cli::{Cli, Commands};
use drctl::commands::{self, RecoverOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => DrConfig::load_from_path(path)?,
        None => DrConfig::load(),
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Check { scenario, mode } => commands::check(&scenario, mode, config).await,
        Commands::Recover {
            scenario,
            mode,
            resolve_all,
            start,
            paused,
            ledger,
        } => {
            let options = RecoverOptions {
                mode,
                resolve_all,
                start: start || paused,
                paused,
                ledger,
            };
            commands::recover(&scenario, options, config).await
        }
        Commands::Unwind { scenario, ledger } => commands::unwind(&scenario, &ledger, config).await,
        Commands::Config => commands::config(&config),
    }
}
