//! Shared fakes for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use ledgersync::network::client::subscription_channel;
use ledgersync::network::client::SubscriptionFeed;
use ledgersync::network::Block;
use ledgersync::network::ClientBuildContext;
use ledgersync::network::ClientFactory;
use ledgersync::network::EventSubscription;
use ledgersync::network::LedgerClient;
use ledgersync::LedgerSyncError;
use ledgersync::Result;
use tokio::sync::Notify;

/// In-process ledger with per-channel heights and fault injection
#[derive(Default)]
pub struct FakeLedger {
    heights: Mutex<HashMap<String, u64>>,
    failing: Mutex<HashSet<String>>,
    refused: Mutex<HashSet<String>>,
    held: Mutex<HashSet<String>>,
    release: Notify,
    feeds: Mutex<HashMap<String, Vec<SubscriptionFeed>>>,
    subscribe_calls: Mutex<HashMap<String, usize>>,
    height_calls: Mutex<HashMap<String, usize>>,
}

impl FakeLedger {
    pub fn with_channels(channels: &[(&str, u64)]) -> Arc<Self> {
        let ledger = Self::default();
        for (name, height) in channels {
            ledger.set_height(name, *height);
        }
        Arc::new(ledger)
    }

    pub fn set_height(&self, channel: &str, height: u64) {
        self.heights
            .lock()
            .unwrap()
            .insert(channel.to_string(), height);
    }

    /// Make synchronization of `channel` fail
    pub fn fail(&self, channel: &str) {
        self.failing.lock().unwrap().insert(channel.to_string());
    }

    /// Make new subscriptions to `channel` fail
    pub fn refuse(&self, channel: &str) {
        self.refused.lock().unwrap().insert(channel.to_string());
    }

    pub fn accept(&self, channel: &str) {
        self.refused.lock().unwrap().remove(channel);
    }

    /// Block synchronization of `channel` until [`Self::release_all`]
    pub fn hold(&self, channel: &str) {
        self.held.lock().unwrap().insert(channel.to_string());
    }

    pub fn release_all(&self) {
        self.held.lock().unwrap().clear();
        self.release.notify_waiters();
    }

    /// Report every open stream of `channel` as dead
    pub fn drop_stream(&self, channel: &str) {
        if let Some(feeds) = self.feeds.lock().unwrap().get(channel) {
            for feed in feeds {
                feed.set_active(false);
            }
        }
    }

    /// Number of streams of any channel not yet closed by the consumer
    pub fn open_streams(&self) -> usize {
        self.feeds
            .lock()
            .unwrap()
            .values()
            .flatten()
            .filter(|feed| !feed.is_closed())
            .count()
    }

    pub fn subscribe_calls(&self, channel: &str) -> usize {
        self.subscribe_calls
            .lock()
            .unwrap()
            .get(channel)
            .copied()
            .unwrap_or(0)
    }

    /// Number of synchronization passes that reached the ledger for `channel`
    pub fn sync_calls(&self, channel: &str) -> usize {
        self.height_calls
            .lock()
            .unwrap()
            .get(channel)
            .copied()
            .unwrap_or(0)
    }

    fn is_held(&self, channel: &str) -> bool {
        self.held.lock().unwrap().contains(channel)
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn channels(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.heights.lock().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn ledger_height(&self, channel: &str) -> Result<u64> {
        *self
            .height_calls
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default() += 1;

        loop {
            let released = self.release.notified();
            if !self.is_held(channel) {
                break;
            }
            released.await;
        }

        if self.failing.lock().unwrap().contains(channel) {
            return Err(LedgerSyncError::Custom("peer unavailable".to_string()));
        }
        self.heights
            .lock()
            .unwrap()
            .get(channel)
            .copied()
            .ok_or_else(|| LedgerSyncError::Custom(format!("unknown channel {channel}")))
    }

    async fn fetch_block(&self, channel: &str, number: u64) -> Result<Block> {
        Ok(Block {
            number,
            data_hash: format!("{channel}-{number}"),
            previous_hash: String::new(),
            tx_count: 2,
            payload: serde_json::Value::Null,
        })
    }

    async fn subscribe(&self, channel: &str) -> Result<EventSubscription> {
        *self
            .subscribe_calls
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default() += 1;

        if self.refused.lock().unwrap().contains(channel) {
            return Err(LedgerSyncError::connection(channel, "refused"));
        }
        let (subscription, feed) = subscription_channel(true);
        self.feeds
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .push(feed);
        Ok(subscription)
    }
}

/// Hands out the same [`FakeLedger`], or nothing
pub struct FakeFactory {
    pub ledger: Option<Arc<FakeLedger>>,
    pub contexts: Mutex<Vec<ClientBuildContext>>,
}

impl FakeFactory {
    pub fn new(ledger: Arc<FakeLedger>) -> Arc<Self> {
        Arc::new(Self {
            ledger: Some(ledger),
            contexts: Mutex::new(Vec::new()),
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            ledger: None,
            contexts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ClientFactory for FakeFactory {
    async fn build(&self, context: &ClientBuildContext) -> Result<Option<Arc<dyn LedgerClient>>> {
        self.contexts.lock().unwrap().push(context.clone());
        Ok(self
            .ledger
            .clone()
            .map(|ledger| ledger as Arc<dyn LedgerClient>))
    }
}

/// Let spawned tasks run on the current-thread runtime
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
