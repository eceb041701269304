//! Ledger network client interface
//!
//! The supervisor only needs a narrow view of the ledger SDK: the channel
//! list, the ledger head, individual blocks, and a per-channel event
//! subscription whose liveness can be queried.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use super::credentials::OrganizationCredentials;
use super::profile::ConnectionProfile;
use super::profile::NetworkSelection;
use super::settings::SdkSettings;
use crate::Result;

/// A ledger block as seen by the mirror
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Block {
    pub number: u64,
    pub data_hash: String,
    #[serde(default)]
    pub previous_hash: String,
    #[serde(default)]
    pub tx_count: u64,
    #[serde(default)]
    pub payload: Value,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Channels the client identity has joined
    async fn channels(&self) -> Result<Vec<String>>;

    /// Number of blocks on the channel (head block number + 1)
    async fn ledger_height(&self, channel: &str) -> Result<u64>;

    async fn fetch_block(&self, channel: &str, number: u64) -> Result<Block>;

    /// Open a new-block event subscription for the channel
    async fn subscribe(&self, channel: &str) -> Result<EventSubscription>;
}

/// Consumer side of a channel event subscription.
///
/// Dropping the subscription closes it.
#[derive(Debug)]
pub struct EventSubscription {
    status: watch::Receiver<bool>,
    shutdown: watch::Sender<bool>,
}

/// Producer side, held by whatever drives the underlying stream
#[derive(Debug)]
pub struct SubscriptionFeed {
    status: watch::Sender<bool>,
    shutdown: watch::Receiver<bool>,
}

/// Create a connected subscription/feed pair
#[must_use]
pub fn subscription_channel(initially_active: bool) -> (EventSubscription, SubscriptionFeed) {
    let (status_tx, status_rx) = watch::channel(initially_active);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    (
        EventSubscription {
            status: status_rx,
            shutdown: shutdown_tx,
        },
        SubscriptionFeed {
            status: status_tx,
            shutdown: shutdown_rx,
        },
    )
}

impl EventSubscription {
    /// True while the producer reports a live stream and nobody closed it.
    ///
    /// A dropped feed counts as a dead stream.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !*self.shutdown.borrow() && *self.status.borrow() && self.status.has_changed().is_ok()
    }

    /// Idempotent
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl SubscriptionFeed {
    pub fn set_active(&self, active: bool) {
        self.status.send_replace(active);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once the consumer closed or dropped the subscription
    pub async fn closed(&mut self) {
        while !*self.shutdown.borrow() {
            if self.shutdown.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Everything a factory needs to build the client for the active selection.
///
/// Settings are passed explicitly rather than read from process globals.
#[derive(Debug, Clone)]
pub struct ClientBuildContext {
    pub selection: NetworkSelection,
    pub profile: ConnectionProfile,
    pub credentials: Vec<OrganizationCredentials>,
    pub settings: SdkSettings,
}

#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// `Ok(None)` means the SDK produced no usable client
    async fn build(&self, context: &ClientBuildContext) -> Result<Option<Arc<dyn LedgerClient>>>;
}
