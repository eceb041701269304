use clap::Parser;
use ledgersync::cli::selection_args;
use ledgersync::cli::Cli;
use ledgersync::cli::Commands;
use ledgersync::AppConfig;
use ledgersync::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load()?,
    };

    // Initialize logging
    if cli.verbose {
        ledgersync::logging::init_logging_with_level("debug")?;
    } else {
        ledgersync::logging::init_logging_with_config(&config)?;
    }
    tracing::debug!("Configuration loaded successfully");

    // Execute the requested command
    let result = match cli.command {
        Commands::Start { network, client } => {
            ledgersync::cli::handle_start_command(&config, &selection_args(network, client)).await
        }
        Commands::Status { json } => ledgersync::cli::handle_status_command(&config, json).await,
        Commands::Config { network, client } => {
            ledgersync::cli::handle_config_command(&config, &selection_args(network, client))
        }
    };

    if let Err(e) = &result {
        tracing::error!("❌ {}", e);
    }
    result
}
