//! Supervisor start command handler

use std::sync::Arc;

use tracing::error;
use tracing::info;

use crate::config::AppConfig;
use crate::network::HttpClientFactory;
use crate::storage::FileSyncStore;
use crate::sync::notifier_from_config;
use crate::sync::LifecycleManager;
use crate::LedgerSyncError;
use crate::Result;

/// Run the supervisor for the selected network until Ctrl-C.
///
/// # Errors
/// Returns fatal startup errors (configuration, client construction, a
/// supervisor already holding the lock). A refused registration is not an
/// error here: the process stays up without syncing until interrupted.
pub async fn handle_start_command(config: &AppConfig, args: &[String]) -> Result<()> {
    let store = Arc::new(FileSyncStore::open(&config.sync.state_file)?);
    let manager = LifecycleManager::new(
        config.clone(),
        Arc::new(HttpClientFactory),
        store,
        notifier_from_config(config),
    );

    match manager.initialize(args).await {
        Ok(report) => {
            println!(
                "✅ Supervising {} ({} channels, {} streams, syncing every {} ms)",
                report.selection, report.channels, report.active_streams, report.interval_ms
            );
        }
        Err(e @ LedgerSyncError::Registration { .. }) => {
            error!("{}", e);
            println!("⚠️  {e}. Sync is not running; press Ctrl-C to exit.");
        }
        Err(e) => {
            error!("Startup failed: {}", e);
            manager.destroy().await;
            return Err(e);
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    manager.destroy().await;
    println!("👋 Supervisor stopped");
    Ok(())
}
