//! Status command handler

use serde_json::json;

use crate::config::AppConfig;
use crate::storage::FileSyncStore;
use crate::sync::SyncLockManager;
use crate::Result;

/// Print the lock file of a running supervisor and the persisted progress
pub async fn handle_status_command(config: &AppConfig, as_json: bool) -> Result<()> {
    let lock_manager = SyncLockManager::new(&config.sync.lock_file);
    let lock = if lock_manager.lock_exists() {
        match lock_manager.read_lock() {
            Ok(lock) => Some(lock),
            Err(e) => {
                tracing::warn!("Ignoring unreadable lock file: {}", e);
                None
            }
        }
    } else {
        None
    };

    let store = FileSyncStore::open(&config.sync.state_file)?;
    let state = store.snapshot().await;
    let stats = store.stats().await;

    if as_json {
        let output = json!({
            "supervisor": lock,
            "state": state,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match &lock {
        Some(lock) => {
            println!(
                "🔒 Supervisor PID {} for {}/{}: {}",
                lock.pid, lock.network, lock.client, lock.status
            );
            if let Some(error) = &lock.error_message {
                println!("   Last error: {error}");
            }
        }
        None => println!("💤 No supervisor running"),
    }

    println!("📊 {}", stats.format());
    for (network, network_state) in &state.networks {
        for (channel, record) in &network_state.channels {
            let height = record
                .last_block
                .map_or_else(|| "-".to_string(), |block| block.to_string());
            println!(
                "   {network}/{channel}: last block {height}, {} blocks, {} transactions",
                record.blocks_applied, record.transactions
            );
        }
    }
    if let Some(error) = state.errors.last() {
        println!("   Most recent error: {error}");
    }
    Ok(())
}
