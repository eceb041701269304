//! Sync state persisted to a JSON file

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex;

use super::ChannelRecord;
use super::NetworkRegistration;
use super::SyncStore;
use super::MAX_STORED_ERRORS;
use crate::network::Block;
use crate::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkState {
    pub registration: Option<NetworkRegistration>,
    pub channels: BTreeMap<String, ChannelRecord>,
}

/// Persistent sync state stored in the state file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentSyncState {
    /// Last update timestamp
    pub last_updated: i64,
    pub networks: BTreeMap<String, NetworkState>,
    /// Error messages, newest last
    pub errors: Vec<String>,
}

impl Default for PersistentSyncState {
    fn default() -> Self {
        Self {
            last_updated: Utc::now().timestamp(),
            networks: BTreeMap::new(),
            errors: Vec::new(),
        }
    }
}

/// File-backed [`SyncStore`]
pub struct FileSyncStore {
    path: PathBuf,
    state: Mutex<PersistentSyncState>,
}

impl FileSyncStore {
    /// Load state from file, or create default if file doesn't exist
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str(&content) {
                Ok(state) => {
                    tracing::info!("Loaded sync state from {}", path.display());
                    state
                }
                Err(e) => {
                    tracing::warn!(
                        "Sync state {} is unreadable ({}), starting fresh",
                        path.display(),
                        e
                    );
                    PersistentSyncState::default()
                }
            }
        } else {
            tracing::info!("No existing sync state found, starting fresh");
            PersistentSyncState::default()
        };

        let store = Self {
            path,
            state: Mutex::new(state),
        };
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> PersistentSyncState {
        self.state.lock().await.clone()
    }

    /// Aggregate statistics across channels
    pub async fn stats(&self) -> SyncStats {
        let state = self.state.lock().await;
        let mut stats = SyncStats {
            last_updated: state.last_updated,
            error_count: state.errors.len(),
            ..SyncStats::default()
        };
        for network in state.networks.values() {
            for record in network.channels.values() {
                stats.channels += 1;
                stats.total_blocks += record.blocks_applied;
                stats.total_transactions += record.transactions;
            }
        }
        stats
    }

    /// Save state to file. Writes a temporary file and renames it so a crash
    /// never leaves a half-written state behind.
    fn save(&self, state: &mut PersistentSyncState) -> Result<()> {
        state.last_updated = Utc::now().timestamp();

        let content = serde_json::to_string_pretty(state)?;
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;
        tracing::debug!("Saved sync state to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl SyncStore for FileSyncStore {
    async fn register_network(&self, registration: &NetworkRegistration) -> Result<bool> {
        let mut state = self.state.lock().await;
        let network = state
            .networks
            .entry(registration.network_name.clone())
            .or_default();

        if let Some(existing) = &network.registration {
            if existing.client_name != registration.client_name {
                tracing::info!(
                    "Network {} re-registered with client {} (was {})",
                    registration.network_name,
                    registration.client_name,
                    existing.client_name
                );
            }
        }
        network.registration = Some(registration.clone());
        self.save(&mut state)?;
        Ok(true)
    }

    async fn last_height(&self, network: &str, channel: &str) -> Result<Option<u64>> {
        let state = self.state.lock().await;
        Ok(state
            .networks
            .get(network)
            .and_then(|n| n.channels.get(channel))
            .and_then(|record| record.last_block))
    }

    async fn apply_block(&self, network: &str, channel: &str, block: &Block) -> Result<bool> {
        let mut state = self.state.lock().await;
        let record = channel_record(&mut state, network, channel);
        let mut updated = record.clone();
        if !updated.apply(channel, block)? {
            return Ok(false);
        }

        // Memory only moves ahead once the block is on disk
        let previous = std::mem::replace(record, updated);
        if let Err(e) = self.save(&mut state) {
            *channel_record(&mut state, network, channel) = previous;
            return Err(e);
        }
        Ok(true)
    }

    async fn record_error(&self, network: &str, channel: &str, message: String) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .errors
            .push(format!("{} {network}/{channel}: {message}", Utc::now().to_rfc3339()));
        // Keep only the newest errors to bound the file size
        if state.errors.len() > MAX_STORED_ERRORS {
            let excess = state.errors.len() - MAX_STORED_ERRORS;
            state.errors.drain(0..excess);
        }
        self.save(&mut state)
    }
}

fn channel_record<'a>(
    state: &'a mut PersistentSyncState,
    network: &str,
    channel: &str,
) -> &'a mut ChannelRecord {
    state
        .networks
        .entry(network.to_string())
        .or_default()
        .channels
        .entry(channel.to_string())
        .or_default()
}

/// Sync statistics
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    pub channels: usize,
    pub total_blocks: u64,
    pub total_transactions: u64,
    pub last_updated: i64,
    pub error_count: usize,
}

impl SyncStats {
    /// Format stats for display
    #[must_use]
    pub fn format(&self) -> String {
        format!(
            "Channels: {}, Blocks: {}, Transactions: {}, Errors: {}, Last Update: {}",
            self.channels,
            self.total_blocks,
            self.total_transactions,
            self.error_count,
            chrono::DateTime::from_timestamp(self.last_updated, 0).map_or_else(
                || "Unknown".to_string(),
                |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()
            )
        )
    }
}
