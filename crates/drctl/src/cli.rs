//! Command-line argument parsing.
//!
//! Kept apart from execution so tests can parse without running anything.

use clap::{Parser, Subcommand};
use dr_shared::RecoveryMode;
use std::path::PathBuf;

/// Disaster-recovery failover/failback control
#[derive(Parser, Debug)]
#[command(name = "drctl")]
#[command(about = "Disaster recovery - fail over, fail back and rehearse recovery", long_about = None)]
#[command(version)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Config file (defaults to /etc/drctl/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the prechecks and list problems
    Check {
        /// Scenario file with metadata units and target pool state
        #[arg(long)]
        scenario: PathBuf,

        /// failover, failback or dry-run
        #[arg(long, default_value = "failover", value_parser = parse_mode)]
        mode: RecoveryMode,
    },

    /// Run checks, optionally fix problems, then recover
    Recover {
        #[arg(long)]
        scenario: PathBuf,

        #[arg(long, default_value = "failover", value_parser = parse_mode)]
        mode: RecoveryMode,

        /// Apply every available fix for blocking problems first
        #[arg(long)]
        resolve_all: bool,

        /// Start the recovered objects afterwards
        #[arg(long)]
        start: bool,

        /// Start them paused (implies --start)
        #[arg(long)]
        paused: bool,

        /// Where to keep the rollback ledger (overrides config)
        #[arg(long)]
        ledger: Option<PathBuf>,
    },

    /// Undo the fixes recorded in a rollback ledger
    Unwind {
        #[arg(long)]
        scenario: PathBuf,

        #[arg(long)]
        ledger: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

pub fn parse_mode(s: &str) -> Result<RecoveryMode, String> {
    RecoveryMode::parse(s).ok_or_else(|| format!("unknown mode '{}': use failover, failback or dry-run", s))
}
