//! One synchronization pass per channel: fetch and apply every block between
//! the stored height and the ledger head.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::network::ConnectionProfile;
use crate::network::LedgerClient;
use crate::network::NetworkSelection;
use crate::storage::NetworkRegistration;
use crate::storage::SyncStore;
use crate::LedgerSyncError;
use crate::Result;

/// Result of one completed synchronization pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub channel: String,
    /// Ledger height (block count) the pass caught up to
    pub height: u64,
    /// First block number the pass looked at
    pub from_block: u64,
    pub blocks_applied: u64,
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_up_to_date(&self) -> bool {
        self.blocks_applied == 0
    }
}

/// Anything able to run a synchronization pass for a channel
#[async_trait]
pub trait ChannelSynchronizer: Send + Sync {
    async fn synchronize(&self, channel: &str) -> Result<SyncOutcome>;
}

pub struct SyncDriver {
    client: Arc<dyn LedgerClient>,
    store: Arc<dyn SyncStore>,
    network: String,
}

impl SyncDriver {
    #[must_use]
    pub fn new(client: Arc<dyn LedgerClient>, store: Arc<dyn SyncStore>, network: &str) -> Self {
        Self {
            client,
            store,
            network: network.to_string(),
        }
    }

    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Record the active network/client in the store.
    ///
    /// `Ok(false)` means the store explicitly refused the registration.
    pub async fn register_network(
        &self,
        selection: &NetworkSelection,
        profile: &ConnectionProfile,
    ) -> Result<bool> {
        let registration = NetworkRegistration {
            network_name: selection.network_name.clone(),
            client_name: selection.client_name.clone(),
            gateway: profile.gateway_url().map(ToString::to_string),
            msp_ids: profile
                .organizations
                .values()
                .map(|org| org.mspid.clone())
                .collect(),
        };

        let registered = self.store.register_network(&registration).await?;
        if registered {
            info!("Registered network {} in sync store", selection);
        } else {
            warn!("Sync store refused registration of {}", selection);
        }
        Ok(registered)
    }

    /// Synchronize every channel the client currently lists, one after the other.
    ///
    /// A failing channel does not stop the others; its error is logged and
    /// returned alongside the successful outcomes.
    pub async fn synchronize_all(&self) -> Result<Vec<Result<SyncOutcome>>> {
        let channels = self.client.channels().await?;
        let mut results = Vec::with_capacity(channels.len());
        for channel in channels {
            let result = self.synchronize(&channel).await;
            if let Err(e) = &result {
                warn!("Synchronization of channel {} failed: {}", channel, e);
            }
            results.push(result);
        }
        Ok(results)
    }

    async fn run_pass(&self, channel: &str) -> Result<SyncOutcome> {
        let last = self.store.last_height(&self.network, channel).await?;
        let from_block = last.map_or(0, |last| last.saturating_add(1));
        let height = self.client.ledger_height(channel).await?;

        let mut outcome = SyncOutcome {
            channel: channel.to_string(),
            height,
            from_block,
            blocks_applied: 0,
        };

        if from_block >= height {
            debug!("Channel {} up to date at height {}", channel, height);
            return Ok(outcome);
        }

        debug!(
            "Channel {}: applying blocks {}..{}",
            channel,
            from_block,
            height - 1
        );
        for number in from_block..height {
            let block = self.client.fetch_block(channel, number).await?;
            if block.number != number {
                return Err(LedgerSyncError::sync(
                    channel,
                    format!("requested block {number}, ledger returned {}", block.number),
                ));
            }
            // Progress is persisted per block, a failure below keeps what was applied
            if self.store.apply_block(&self.network, channel, &block).await? {
                outcome.blocks_applied += 1;
            }
        }

        info!(
            "Channel {} synchronized to height {} ({} blocks applied)",
            channel, height, outcome.blocks_applied
        );
        Ok(outcome)
    }
}

#[async_trait]
impl ChannelSynchronizer for SyncDriver {
    async fn synchronize(&self, channel: &str) -> Result<SyncOutcome> {
        self.run_pass(channel).await.map_err(|e| match e {
            LedgerSyncError::Sync { .. } => e,
            other => LedgerSyncError::sync(channel, other),
        })
    }
}
