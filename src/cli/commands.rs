//! CLI command definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(name = "ledgersync")]
#[command(about = "Keeps a local mirror of ledger network channels synchronized")]
#[command(version)]
pub struct Cli {
    /// Enable verbose debug logging (default: info level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the TOML configuration (default: config.toml, then config.example.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start supervising the selected network until Ctrl-C
    Start {
        /// Network name (default: first network in the network config)
        network: Option<String>,
        /// Client name (default: the network's first client, or its default with no network)
        client: Option<String>,
    },
    /// Show the running supervisor and persisted channel heights
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the effective configuration and the resolved network selection
    Config {
        network: Option<String>,
        client: Option<String>,
    },
}

/// Positional selection arguments in the order the selection rules expect
#[must_use]
pub fn selection_args(network: Option<String>, client: Option<String>) -> Vec<String> {
    network.into_iter().chain(client).collect()
}
