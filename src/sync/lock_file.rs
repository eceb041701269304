use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::Mutex;

use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::network::NetworkSelection;
use crate::Result;

/// Lock file structure for tracking the supervisor process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLockFile {
    /// Process ID of the supervisor
    pub pid: u32,
    /// starting, running, registration_failed, stopping, stopped
    pub status: String,
    pub network: String,
    pub client: String,
    pub start_time: i64,
    pub last_update: i64,
    /// Per-channel progress
    pub channels: BTreeMap<String, ChannelProgress>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelProgress {
    /// Ledger height reached by the last synchronization
    pub height: u64,
    /// Blocks applied by this process
    pub blocks_applied: u64,
    pub last_update: i64,
}

impl SyncLockFile {
    #[must_use]
    pub fn new(status: &str, selection: &NetworkSelection) -> Self {
        let now = Utc::now().timestamp();
        Self {
            pid: process::id(),
            status: status.to_string(),
            network: selection.network_name.clone(),
            client: selection.client_name.clone(),
            start_time: now,
            last_update: now,
            channels: BTreeMap::new(),
            error_message: None,
        }
    }

    pub fn update_status(&mut self, status: &str) {
        self.status = status.to_string();
        self.last_update = Utc::now().timestamp();
    }

    pub fn set_error(&mut self, error: &str) {
        self.error_message = Some(error.to_string());
        self.last_update = Utc::now().timestamp();
    }

    pub fn update_channel(&mut self, channel: &str, height: u64, blocks_applied: u64) {
        let now = Utc::now().timestamp();
        self.last_update = now;
        self.channels
            .entry(channel.to_string())
            .and_modify(|progress| {
                progress.height = height;
                progress.blocks_applied += blocks_applied;
                progress.last_update = now;
            })
            .or_insert(ChannelProgress {
                height,
                blocks_applied,
                last_update: now,
            });
    }
}

/// Lock file manager; one supervisor per lock file
#[derive(Clone)]
pub struct SyncLockManager {
    lock_file_path: PathBuf,
    // Serialises writes from concurrent channel synchronizations
    current: Arc<Mutex<Option<SyncLockFile>>>,
}

impl SyncLockManager {
    #[must_use]
    pub fn new<P: AsRef<Path>>(lock_file_path: P) -> Self {
        Self {
            lock_file_path: lock_file_path.as_ref().to_path_buf(),
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Create the lock file, refusing when another live supervisor holds it
    pub fn create_lock(&self, status: &str, selection: &NetworkSelection) -> Result<SyncLockFile> {
        if self.lock_exists() {
            match self.read_lock() {
                Ok(existing) if existing.pid != process::id() && is_process_running(existing.pid) => {
                    return Err(crate::LedgerSyncError::Custom(format!(
                        "Supervisor already running for {}/{} (PID: {})",
                        existing.network, existing.client, existing.pid
                    )));
                }
                Ok(existing) => {
                    warn!("Found stale lock file from PID {}, replacing it", existing.pid);
                }
                Err(e) => {
                    warn!("Found corrupted lock file, replacing it: {}", e);
                }
            }
        }

        let lock = SyncLockFile::new(status, selection);
        self.store(lock.clone())?;
        info!("Created sync lock file (PID: {})", lock.pid);
        Ok(lock)
    }

    /// Read lock file
    pub fn read_lock(&self) -> Result<SyncLockFile> {
        let content = fs::read_to_string(&self.lock_file_path).map_err(|e| {
            crate::LedgerSyncError::Custom(format!("Failed to read lock file: {e}"))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            crate::LedgerSyncError::Custom(format!("Failed to parse lock file: {e}"))
        })
    }

    /// Update the held lock's status; no-op when no lock is held
    pub fn update_status(&self, status: &str) -> Result<()> {
        self.modify(|lock| lock.update_status(status))
    }

    pub fn set_error(&self, error: &str) -> Result<()> {
        self.modify(|lock| lock.set_error(error))
    }

    pub fn update_channel(&self, channel: &str, height: u64, blocks_applied: u64) -> Result<()> {
        self.modify(|lock| lock.update_channel(channel, height, blocks_applied))
    }

    /// Remove the lock file if this process holds it
    pub fn release(&self) -> Result<()> {
        let held = self
            .current
            .lock()
            .map_err(|e| crate::LedgerSyncError::Custom(format!("Lock state poisoned: {e}")))?
            .take();
        if held.is_some() {
            self.remove_lock()?;
        }
        Ok(())
    }

    /// Remove lock file
    pub fn remove_lock(&self) -> Result<()> {
        if self.lock_exists() {
            fs::remove_file(&self.lock_file_path).map_err(|e| {
                crate::LedgerSyncError::Custom(format!("Failed to remove lock file: {e}"))
            })?;
            info!("Removed sync lock file");
        }
        Ok(())
    }

    #[must_use]
    pub fn lock_exists(&self) -> bool {
        self.lock_file_path.exists()
    }

    #[must_use]
    pub fn lock_file_path(&self) -> &Path {
        &self.lock_file_path
    }

    fn modify(&self, update: impl FnOnce(&mut SyncLockFile)) -> Result<()> {
        let mut current = self
            .current
            .lock()
            .map_err(|e| crate::LedgerSyncError::Custom(format!("Lock state poisoned: {e}")))?;
        let Some(lock) = current.as_mut() else {
            return Ok(());
        };
        update(lock);
        write_lock(&self.lock_file_path, lock)
    }

    fn store(&self, lock: SyncLockFile) -> Result<()> {
        let mut current = self
            .current
            .lock()
            .map_err(|e| crate::LedgerSyncError::Custom(format!("Lock state poisoned: {e}")))?;
        write_lock(&self.lock_file_path, &lock)?;
        *current = Some(lock);
        Ok(())
    }
}

fn write_lock(path: &Path, lock: &SyncLockFile) -> Result<()> {
    let content = serde_json::to_string_pretty(lock).map_err(|e| {
        crate::LedgerSyncError::Custom(format!("Failed to serialize lock file: {e}"))
    })?;
    fs::write(path, content)
        .map_err(|e| crate::LedgerSyncError::Custom(format!("Failed to write lock file: {e}")))
}

/// Check if a process is running
fn is_process_running(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 only checks that the process exists
    unsafe { libc::kill(pid, 0) == 0 }
}
