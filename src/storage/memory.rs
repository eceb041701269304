use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::ChannelRecord;
use super::NetworkRegistration;
use super::SyncStore;
use super::MAX_STORED_ERRORS;
use crate::network::Block;
use crate::Result;

/// In-memory [`SyncStore`]
#[derive(Default)]
pub struct MemorySyncStore {
    registrations: Mutex<Vec<NetworkRegistration>>,
    channels: Mutex<HashMap<(String, String), ChannelRecord>>,
    errors: Mutex<Vec<String>>,
    refuse_registration: AtomicBool,
}

impl MemorySyncStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `register_network` report failure
    #[must_use]
    pub fn refusing_registration() -> Self {
        let store = Self::default();
        store.refuse_registration.store(true, Ordering::SeqCst);
        store
    }

    pub async fn registrations(&self) -> Vec<NetworkRegistration> {
        self.registrations.lock().await.clone()
    }

    pub async fn channel(&self, network: &str, channel: &str) -> Option<ChannelRecord> {
        self.channels
            .lock()
            .await
            .get(&(network.to_string(), channel.to_string()))
            .cloned()
    }

    pub async fn errors(&self) -> Vec<String> {
        self.errors.lock().await.clone()
    }
}

#[async_trait]
impl SyncStore for MemorySyncStore {
    async fn register_network(&self, registration: &NetworkRegistration) -> Result<bool> {
        if self.refuse_registration.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.registrations.lock().await.push(registration.clone());
        Ok(true)
    }

    async fn last_height(&self, network: &str, channel: &str) -> Result<Option<u64>> {
        Ok(self
            .channel(network, channel)
            .await
            .and_then(|record| record.last_block))
    }

    async fn apply_block(&self, network: &str, channel: &str, block: &Block) -> Result<bool> {
        self.channels
            .lock()
            .await
            .entry((network.to_string(), channel.to_string()))
            .or_default()
            .apply(channel, block)
    }

    async fn record_error(&self, network: &str, channel: &str, message: String) -> Result<()> {
        let mut errors = self.errors.lock().await;
        errors.push(format!("{network}/{channel}: {message}"));
        if errors.len() > MAX_STORED_ERRORS {
            let excess = errors.len() - MAX_STORED_ERRORS;
            errors.drain(0..excess);
        }
        Ok(())
    }
}
