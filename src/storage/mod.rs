//! Persistence for the ledger mirror
//!
//! The supervisor persists two things: the registration of the active
//! network/client, and per-channel progress (the last applied block). Block
//! application is idempotent by block number so a run interrupted mid-way
//! can be resumed safely.
//!
//! - [`FileSyncStore`]: JSON state file, flushed after every applied block
//! - [`MemorySyncStore`]: in-process store for tests and dry runs

mod file_store;
mod memory;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

pub use file_store::FileSyncStore;
pub use file_store::SyncStats;
pub use memory::MemorySyncStore;

use crate::network::Block;
use crate::LedgerSyncError;
use crate::Result;

/// Maximum number of error messages kept per store
pub const MAX_STORED_ERRORS: usize = 100;

/// Metadata recorded for the active network/client before syncing starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRegistration {
    pub network_name: String,
    pub client_name: String,
    pub gateway: Option<String>,
    pub msp_ids: Vec<String>,
}

/// Per-channel mirror progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Number of the last applied block
    pub last_block: Option<u64>,
    pub last_block_hash: Option<String>,
    pub blocks_applied: u64,
    pub transactions: u64,
}

impl ChannelRecord {
    /// Block number the next application must carry
    #[must_use]
    pub fn next_block(&self) -> u64 {
        self.last_block.map_or(0, |last| last.saturating_add(1))
    }

    /// Apply a block; `Ok(false)` when it is already part of the mirror
    pub fn apply(&mut self, channel: &str, block: &Block) -> Result<bool> {
        let expected = self.next_block();
        if block.number < expected {
            return Ok(false);
        }
        if block.number > expected {
            return Err(LedgerSyncError::sync(
                channel,
                format!("block {} applied out of order, expected {}", block.number, expected),
            ));
        }

        self.last_block = Some(block.number);
        self.last_block_hash = Some(block.data_hash.clone());
        self.blocks_applied += 1;
        self.transactions += block.tx_count;
        Ok(true)
    }
}

#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Record network/client metadata; `Ok(false)` means the store refused it
    async fn register_network(&self, registration: &NetworkRegistration) -> Result<bool>;

    /// Number of the last block applied for the channel
    async fn last_height(&self, network: &str, channel: &str) -> Result<Option<u64>>;

    /// Persist one block; already-applied blocks are a no-op returning `Ok(false)`
    async fn apply_block(&self, network: &str, channel: &str, block: &Block) -> Result<bool>;

    async fn record_error(&self, network: &str, channel: &str, message: String) -> Result<()>;
}
