//! Per-channel event-stream registry for the active ledger client
//!
//! Channel state is written by the controller's tick and by reconnect
//! completions. Each channel keeps its own lock; the map lock is only held to
//! look entries up or add newly discovered channels.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::RwLock;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::connection::ChannelConnection;
use crate::network::EventSubscription;
use crate::network::LedgerClient;

/// Bookkeeping for one channel known to the active client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelState {
    pub channel_name: String,
    pub connected: bool,
    pub last_sync_attempt_at: Option<DateTime<Utc>>,
    pub last_sync_ok_at: Option<DateTime<Utc>>,
    /// Ledger height observed by the last successful synchronization
    pub last_height: Option<u64>,
    pub consecutive_failures: u32,
    pub reconnect_attempts: u64,
}

impl ChannelState {
    fn new(channel_name: &str) -> Self {
        Self {
            channel_name: channel_name.to_string(),
            connected: false,
            last_sync_attempt_at: None,
            last_sync_ok_at: None,
            last_height: None,
            consecutive_failures: 0,
            reconnect_attempts: 0,
        }
    }
}

struct ChannelEntry {
    connection: ChannelConnection,
    state: Mutex<ChannelState>,
    reconnecting: AtomicBool,
}

impl ChannelEntry {
    fn new(name: &str, subscription: Option<EventSubscription>) -> Self {
        let connection = subscription.map_or_else(ChannelConnection::new, |subscription| {
            ChannelConnection::with_subscription(subscription)
        });
        Self {
            connection,
            state: Mutex::new(ChannelState::new(name)),
            reconnecting: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct EventStreamRegistry {
    client: Arc<dyn LedgerClient>,
    channels: RwLock<BTreeMap<String, Arc<ChannelEntry>>>,
    closed: Arc<AtomicBool>,
    refreshing: AtomicBool,
    reconnects_started: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EventStreamRegistry {
    #[must_use]
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self {
            client,
            channels: RwLock::new(BTreeMap::new()),
            closed: Arc::new(AtomicBool::new(false)),
            refreshing: AtomicBool::new(false),
            reconnects_started: AtomicU64::new(0),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Discover the client's channels and open an event stream for each.
    ///
    /// Discovery or subscription failures are logged; affected channels start
    /// disconnected and are reconnected by the controller. Returns the number
    /// of known channels.
    pub async fn initialize(&self) -> usize {
        let discovered = match self.client.channels().await {
            Ok(channels) => channels,
            Err(e) => {
                warn!("Channel discovery failed, starting with no channels: {}", e);
                Vec::new()
            }
        };

        for name in discovered {
            self.open_channel(&name).await;
        }

        let count = self.channel_count();
        info!(
            "Event stream registry initialized: {} channels, {} streams active",
            count,
            self.active_streams()
        );
        count
    }

    /// True iff the channel's event stream reports an active subscription
    #[must_use]
    pub fn is_connected(&self, channel: &str) -> bool {
        self.entry(channel)
            .is_some_and(|entry| entry.connection.is_connected())
    }

    /// Re-establish the channel's event stream in the background.
    ///
    /// Never blocks. Returns `false` when no attempt was started: unknown
    /// channel, registry shut down, or an attempt already in flight.
    pub fn reconnect(&self, channel: &str) -> bool {
        if self.is_closed() {
            return false;
        }
        let Some(entry) = self.entry(channel) else {
            warn!("Cannot reconnect unknown channel {}", channel);
            return false;
        };
        if entry.reconnecting.swap(true, Ordering::SeqCst) {
            debug!("Reconnect already in flight for channel {}", channel);
            return false;
        }

        entry.state().reconnect_attempts += 1;
        self.reconnects_started.fetch_add(1, Ordering::Relaxed);

        let client = Arc::clone(&self.client);
        let closed = Arc::clone(&self.closed);
        let name = channel.to_string();
        let handle = tokio::spawn(async move {
            match client.subscribe(&name).await {
                Ok(subscription) => {
                    if Self::attach_reconnected(&entry, &closed, subscription) {
                        info!("Event stream for channel {} re-established", name);
                    } else {
                        debug!("Discarded reconnected stream for channel {}", name);
                    }
                }
                Err(e) => {
                    warn!("Reconnect for channel {} failed: {}", name, e);
                }
            }
            entry.reconnecting.store(false, Ordering::SeqCst);
        });
        self.track(handle);
        true
    }

    /// Names of all known channels, in name order.
    ///
    /// A fresh snapshot each call; channels added by [`Self::refresh`] show up
    /// on the next call.
    pub fn for_each_channel(&self) -> impl Iterator<Item = String> {
        self.read_channels()
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Look for channels the client joined since discovery, in the background.
    ///
    /// At most one refresh runs at a time. Known channels are never removed.
    pub fn refresh(self: &Arc<Self>) -> bool {
        if self.is_closed() || self.refreshing.swap(true, Ordering::SeqCst) {
            return false;
        }

        let registry = Arc::clone(self);
        let handle = tokio::spawn(async move {
            match registry.client.channels().await {
                Ok(channels) => {
                    for name in channels {
                        if registry.entry(&name).is_none() {
                            info!("Discovered new channel {}", name);
                            registry.open_channel(&name).await;
                        }
                    }
                }
                Err(e) => debug!("Channel refresh failed: {}", e),
            }
            registry.refreshing.store(false, Ordering::SeqCst);
        });
        self.track(handle);
        true
    }

    /// Best-effort disconnect of every stream. Idempotent.
    pub fn disconnect_all(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Event stream registry already disconnected");
            return;
        }

        for handle in self.tasks().drain(..) {
            handle.abort();
        }

        let mut disconnected = 0usize;
        for entry in self.read_channels().values() {
            let mut state = entry.state();
            entry.reconnecting.store(false, Ordering::SeqCst);
            if entry.connection.disconnect() {
                disconnected += 1;
            }
            state.connected = false;
        }
        info!("Disconnected {} event streams", disconnected);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of channels whose event stream is currently active
    #[must_use]
    pub fn active_streams(&self) -> usize {
        self.read_channels()
            .values()
            .filter(|entry| entry.connection.is_connected())
            .count()
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.read_channels().len()
    }

    /// Total reconnect attempts started since creation
    #[must_use]
    pub fn reconnects_started(&self) -> u64 {
        self.reconnects_started.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn channel_state(&self, channel: &str) -> Option<ChannelState> {
        self.entry(channel).map(|entry| Self::current_state(&entry))
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<ChannelState> {
        self.read_channels()
            .values()
            .map(|entry| Self::current_state(entry))
            .collect()
    }

    pub fn record_sync_attempt(&self, channel: &str) {
        if let Some(entry) = self.entry(channel) {
            entry.state().last_sync_attempt_at = Some(Utc::now());
        }
    }

    pub fn record_sync_success(&self, channel: &str, height: u64) {
        if let Some(entry) = self.entry(channel) {
            let mut state = entry.state();
            state.last_sync_ok_at = Some(Utc::now());
            state.last_height = Some(height);
            state.consecutive_failures = 0;
        }
    }

    /// Returns the channel's consecutive failure count
    pub fn record_sync_failure(&self, channel: &str) -> u32 {
        self.entry(channel).map_or(0, |entry| {
            let mut state = entry.state();
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            state.consecutive_failures
        })
    }

    async fn open_channel(&self, name: &str) {
        let subscription = match self.client.subscribe(name).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                warn!("Could not open event stream for channel {}: {}", name, e);
                None
            }
        };

        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() || channels.contains_key(name) {
            // Dropping the subscription closes it
            return;
        }
        let entry = ChannelEntry::new(name, subscription);
        entry.state().connected = entry.connection.is_connected();
        channels.insert(name.to_string(), Arc::new(entry));
    }

    /// Install a reconnected stream unless the registry shut down meanwhile.
    ///
    /// Both flags are read under the channel lock, which `disconnect_all`
    /// also takes after marking the registry closed.
    fn attach_reconnected(
        entry: &ChannelEntry,
        closed: &AtomicBool,
        subscription: EventSubscription,
    ) -> bool {
        let mut state = entry.state();
        if closed.load(Ordering::SeqCst) || !entry.reconnecting.load(Ordering::SeqCst) {
            return false;
        }
        entry.connection.attach(subscription);
        state.connected = true;
        true
    }

    fn current_state(entry: &ChannelEntry) -> ChannelState {
        let mut state = entry.state().clone();
        state.connected = entry.connection.is_connected();
        state
    }

    fn entry(&self, channel: &str) -> Option<Arc<ChannelEntry>> {
        self.read_channels().get(channel).cloned()
    }

    fn read_channels(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Arc<ChannelEntry>>> {
        self.channels.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }
}

impl Drop for EventStreamRegistry {
    fn drop(&mut self) {
        for handle in self.tasks().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::network::client::subscription_channel;
    use crate::network::client::SubscriptionFeed;
    use crate::network::Block;
    use crate::LedgerSyncError;
    use crate::Result;

    #[derive(Default)]
    struct StubClient {
        channels: Mutex<Vec<String>>,
        refuse: Mutex<Vec<String>>,
        subscribes: AtomicUsize,
        feeds: Mutex<HashMap<String, Vec<SubscriptionFeed>>>,
    }

    impl StubClient {
        fn with_channels(names: &[&str]) -> Arc<Self> {
            let client = Self::default();
            *client.channels.lock().unwrap() = names.iter().map(ToString::to_string).collect();
            Arc::new(client)
        }

        fn drop_stream(&self, channel: &str) {
            for feed in self.feeds.lock().unwrap().get(channel).into_iter().flatten() {
                feed.set_active(false);
            }
        }
    }

    #[async_trait]
    impl LedgerClient for StubClient {
        async fn channels(&self) -> Result<Vec<String>> {
            Ok(self.channels.lock().unwrap().clone())
        }

        async fn ledger_height(&self, _channel: &str) -> Result<u64> {
            Ok(0)
        }

        async fn fetch_block(&self, channel: &str, number: u64) -> Result<Block> {
            Err(LedgerSyncError::sync(channel, format!("no block {number}")))
        }

        async fn subscribe(&self, channel: &str) -> Result<EventSubscription> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            if self.refuse.lock().unwrap().iter().any(|c| c == channel) {
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

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_initialize_opens_streams() {
        let client = StubClient::with_channels(&["b", "a"]);
        client.refuse.lock().unwrap().push("b".to_string());
        let registry = EventStreamRegistry::new(client.clone());

        assert_eq!(registry.initialize().await, 2);
        assert_eq!(registry.for_each_channel().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(registry.is_connected("a"));
        assert!(!registry.is_connected("b"));
        assert!(!registry.is_connected("unknown"));
        assert_eq!(registry.active_streams(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_is_deduplicated() {
        let client = StubClient::with_channels(&["a"]);
        let registry = EventStreamRegistry::new(client.clone());
        registry.initialize().await;
        client.drop_stream("a");
        assert!(!registry.is_connected("a"));

        assert!(registry.reconnect("a"));
        assert!(!registry.reconnect("a"));
        settle().await;

        assert!(registry.is_connected("a"));
        assert_eq!(client.subscribes.load(Ordering::SeqCst), 2);
        assert_eq!(registry.channel_state("a").unwrap().reconnect_attempts, 1);

        // Once finished, a new attempt may start
        client.drop_stream("a");
        assert!(registry.reconnect("a"));
        assert!(!registry.reconnect("unknown"));
    }

    #[tokio::test]
    async fn test_refresh_adds_new_channels() {
        let client = StubClient::with_channels(&["a"]);
        let registry = Arc::new(EventStreamRegistry::new(client.clone()));
        registry.initialize().await;

        client.channels.lock().unwrap().push("c".to_string());
        assert!(registry.refresh());
        settle().await;

        assert_eq!(registry.for_each_channel().collect::<Vec<_>>(), vec!["a", "c"]);
        assert!(registry.is_connected("c"));

        // Channels missing from a later listing stay known
        client.channels.lock().unwrap().clear();
        registry.refresh();
        settle().await;
        assert_eq!(registry.channel_count(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_all_is_idempotent_and_final() {
        let client = StubClient::with_channels(&["a", "b"]);
        let registry = EventStreamRegistry::new(client.clone());
        registry.initialize().await;
        client.drop_stream("b");

        registry.disconnect_all();
        registry.disconnect_all();
        assert_eq!(registry.active_streams(), 0);
        assert!(!registry.reconnect("a"));
        settle().await;
        assert_eq!(registry.active_streams(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_completing_after_shutdown_is_discarded() {
        struct SlowClient(Arc<StubClient>);

        #[async_trait]
        impl LedgerClient for SlowClient {
            async fn channels(&self) -> Result<Vec<String>> {
                self.0.channels().await
            }
            async fn ledger_height(&self, channel: &str) -> Result<u64> {
                self.0.ledger_height(channel).await
            }
            async fn fetch_block(&self, channel: &str, number: u64) -> Result<Block> {
                self.0.fetch_block(channel, number).await
            }
            async fn subscribe(&self, channel: &str) -> Result<EventSubscription> {
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.0.subscribe(channel).await
            }
        }

        let inner = StubClient::with_channels(&["a"]);
        inner.refuse.lock().unwrap().push("a".to_string());
        let registry = EventStreamRegistry::new(Arc::new(SlowClient(inner.clone())));
        registry.initialize().await;
        assert!(!registry.is_connected("a"));

        inner.refuse.lock().unwrap().clear();
        assert!(registry.reconnect("a"));
        registry.disconnect_all();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(registry.active_streams(), 0);
    }

    #[test]
    fn test_reconnected_stream_dropped_once_closed() {
        // Shutdown landed after the reconnect flag was raised
        let entry = ChannelEntry::new("a", None);
        entry.reconnecting.store(true, Ordering::SeqCst);
        let closed = AtomicBool::new(true);

        let (subscription, feed) = subscription_channel(true);
        assert!(!EventStreamRegistry::attach_reconnected(&entry, &closed, subscription));
        assert!(!entry.connection.is_connected());
        assert!(!entry.state().connected);
        assert!(feed.is_closed());

        closed.store(false, Ordering::SeqCst);
        let (subscription, _feed) = subscription_channel(true);
        assert!(EventStreamRegistry::attach_reconnected(&entry, &closed, subscription));
        assert!(entry.connection.is_connected());
    }

    #[tokio::test]
    async fn test_sync_bookkeeping() {
        let client = StubClient::with_channels(&["a"]);
        let registry = EventStreamRegistry::new(client);
        registry.initialize().await;

        registry.record_sync_attempt("a");
        assert_eq!(registry.record_sync_failure("a"), 1);
        assert_eq!(registry.record_sync_failure("a"), 2);
        registry.record_sync_success("a", 7);

        let state = registry.channel_state("a").unwrap();
        assert!(state.connected);
        assert!(state.last_sync_attempt_at.is_some());
        assert_eq!(state.last_height, Some(7));
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(registry.snapshot(), vec![state]);
    }
}
