//! Periodic supervisory loop
//!
//! Every tick walks the registry's channels. Connected channels get a
//! synchronization pass in the background, disconnected ones get a reconnect
//! request. A channel whose previous pass is still running is skipped.

use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::driver::ChannelSynchronizer;
use super::lock_file::SyncLockManager;
use super::notifier::NoopNotifier;
use super::notifier::Notifier;
use super::notifier::SyncNotice;
use super::registry::EventStreamRegistry;
use crate::config::ScheduleMode;
use crate::network::SyncInterval;
use crate::storage::SyncStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControllerState {
    Idle,
    Ticking,
    Stopped,
}

/// What one tick decided, per channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Channels a synchronization pass was started for
    pub synced: Vec<String>,
    /// Disconnected channels handed to the registry for reconnection
    pub reconnecting: Vec<String>,
    /// Channels whose previous pass had not finished
    pub skipped: Vec<String>,
}

impl TickReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.synced.is_empty() && self.reconnecting.is_empty() && self.skipped.is_empty()
    }
}

/// Channels with a synchronization pass in flight
struct BusyChannels {
    names: Mutex<HashSet<String>>,
    active: watch::Sender<usize>,
}

impl BusyChannels {
    fn new() -> Self {
        Self {
            names: Mutex::new(HashSet::new()),
            active: watch::channel(0).0,
        }
    }

    fn contains(&self, channel: &str) -> bool {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(channel)
    }
}

/// Marks a channel busy until dropped, including when the pass panics
struct BusyGuard {
    busy: Arc<BusyChannels>,
    channel: String,
}

impl BusyGuard {
    fn acquire(busy: &Arc<BusyChannels>, channel: &str) -> Option<Self> {
        let inserted = busy
            .names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel.to_string());
        if !inserted {
            return None;
        }
        busy.active.send_modify(|active| *active += 1);
        Some(Self {
            busy: Arc::clone(busy),
            channel: channel.to_string(),
        })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy
            .names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.channel);
        self.busy
            .active
            .send_modify(|active| *active = active.saturating_sub(1));
    }
}

pub struct SyncController {
    registry: Arc<EventStreamRegistry>,
    synchronizer: Arc<dyn ChannelSynchronizer>,
    interval: SyncInterval,
    schedule: ScheduleMode,
    limiter: Option<Arc<Semaphore>>,
    notifier: Arc<dyn Notifier>,
    lock_manager: Option<SyncLockManager>,
    error_store: Option<(Arc<dyn SyncStore>, String)>,
    state: Mutex<ControllerState>,
    busy: Arc<BusyChannels>,
    shutdown: watch::Sender<bool>,
    ticks: AtomicU64,
}

impl SyncController {
    #[must_use]
    pub fn new(
        registry: Arc<EventStreamRegistry>,
        synchronizer: Arc<dyn ChannelSynchronizer>,
        interval: SyncInterval,
    ) -> Self {
        Self {
            registry,
            synchronizer,
            interval,
            schedule: ScheduleMode::default(),
            limiter: None,
            notifier: Arc::new(NoopNotifier),
            lock_manager: None,
            error_store: None,
            state: Mutex::new(ControllerState::Idle),
            busy: Arc::new(BusyChannels::new()),
            shutdown: watch::channel(false).0,
            ticks: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_schedule(mut self, schedule: ScheduleMode) -> Self {
        self.schedule = schedule;
        self
    }

    /// Bound the number of passes running at the same time
    #[must_use]
    pub fn with_max_concurrent(mut self, limit: Option<usize>) -> Self {
        self.limiter = limit.map(|permits| Arc::new(Semaphore::new(permits.max(1))));
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn with_lock_manager(mut self, lock_manager: SyncLockManager) -> Self {
        self.lock_manager = Some(lock_manager);
        self
    }

    /// Record failed passes in `store` under `network`
    #[must_use]
    pub fn with_error_store(mut self, store: Arc<dyn SyncStore>, network: &str) -> Self {
        self.error_store = Some((store, network.to_string()));
        self
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub const fn interval(&self) -> SyncInterval {
        self.interval
    }

    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Number of synchronization passes currently running
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *self.busy.active.borrow()
    }

    #[must_use]
    pub fn is_busy(&self, channel: &str) -> bool {
        self.busy.contains(channel)
    }

    /// Run one tick body. Never waits on network I/O; passes run in spawned tasks.
    ///
    /// Must be called within a tokio runtime.
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == ControllerState::Stopped {
                return report;
            }
            *state = ControllerState::Ticking;
        }
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;

        self.registry.refresh();

        for channel in self.registry.for_each_channel() {
            let Some(guard) = BusyGuard::acquire(&self.busy, &channel) else {
                debug!("Channel {} still synchronizing, skipping this tick", channel);
                report.skipped.push(channel);
                continue;
            };

            if self.registry.is_connected(&channel) {
                self.registry.record_sync_attempt(&channel);
                self.spawn_pass(channel.clone(), guard);
                report.synced.push(channel);
            } else {
                drop(guard);
                if self.registry.reconnect(&channel) {
                    warn!("Event stream for channel {} is down, reconnecting", channel);
                    self.notifier.send(SyncNotice::ChannelReconnecting {
                        channel: channel.clone(),
                    });
                }
                report.reconnecting.push(channel);
            }
        }

        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == ControllerState::Ticking {
                *state = ControllerState::Idle;
            }
        }

        debug!(
            "Tick {}: {} synchronizing, {} reconnecting, {} skipped",
            tick,
            report.synced.len(),
            report.reconnecting.len(),
            report.skipped.len()
        );
        for channel in self.registry.snapshot() {
            debug!(
                "Channel {}: connected={}, height={:?}, failures={}, reconnects={}",
                channel.channel_name,
                channel.connected,
                channel.last_height,
                channel.consecutive_failures,
                channel.reconnect_attempts
            );
        }
        report
    }

    /// Drive ticks until [`Self::stop`] is called.
    ///
    /// The first tick fires one full interval after this starts.
    pub async fn run(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow_and_update() {
            return;
        }

        let period = self.interval.as_duration();
        info!(
            "Sync controller started: interval {} ms, {:?} scheduling",
            self.interval.as_millis(),
            self.schedule
        );

        match self.schedule {
            ScheduleMode::FixedRate => {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        _ = ticker.tick() => {
                            self.tick();
                        }
                    }
                }
            }
            ScheduleMode::FixedDelay => loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    () = tokio::time::sleep(period) => {}
                }
                self.tick();
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    () = self.wait_idle() => {}
                }
            },
        }

        info!("Sync controller stopped after {} ticks", self.tick_count());
    }

    /// Stop future ticks. Running passes are left to finish. Idempotent.
    pub fn stop(&self) -> bool {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, ControllerState::Stopped)
        };
        self.shutdown.send_replace(true);
        previous != ControllerState::Stopped
    }

    /// Wait for running passes to finish; `false` when `timeout` ran out first
    pub async fn drain(&self, timeout: Duration) -> bool {
        if self.in_flight() == 0 {
            return true;
        }
        info!("Waiting for {} synchronizations to finish", self.in_flight());
        if tokio::time::timeout(timeout, self.wait_idle()).await.is_ok() {
            true
        } else {
            warn!(
                "{} synchronizations still running after {:?}, leaving them detached",
                self.in_flight(),
                timeout
            );
            false
        }
    }

    async fn wait_idle(&self) {
        let mut active = self.busy.active.subscribe();
        // The sender lives as long as self
        let _ = active.wait_for(|count| *count == 0).await;
    }

    fn spawn_pass(&self, channel: String, guard: BusyGuard) {
        let synchronizer = Arc::clone(&self.synchronizer);
        let registry = Arc::clone(&self.registry);
        let notifier = Arc::clone(&self.notifier);
        let limiter = self.limiter.clone();
        let lock_manager = self.lock_manager.clone();
        let error_store = self.error_store.clone();

        tokio::spawn(async move {
            let _guard = guard;
            let _permit = match limiter {
                Some(limiter) => limiter.acquire_owned().await.ok(),
                None => None,
            };

            match synchronizer.synchronize(&channel).await {
                Ok(outcome) => {
                    registry.record_sync_success(&channel, outcome.height);
                    if let Some(lock_manager) = &lock_manager {
                        if let Err(e) = lock_manager.update_channel(
                            &channel,
                            outcome.height,
                            outcome.blocks_applied,
                        ) {
                            warn!("Failed to update lock file: {}", e);
                        }
                    }
                    if !outcome.is_up_to_date() {
                        notifier.send(SyncNotice::ChannelSynced {
                            channel: channel.clone(),
                            height: outcome.height,
                            blocks_applied: outcome.blocks_applied,
                        });
                    }
                }
                Err(e) => {
                    let failures = registry.record_sync_failure(&channel);
                    error!(
                        "Synchronization of channel {} failed ({} in a row): {}",
                        channel, failures, e
                    );
                    notifier.send(SyncNotice::ChannelError {
                        channel: channel.clone(),
                        message: e.to_string(),
                    });
                    if let Some((store, network)) = &error_store {
                        if let Err(store_err) =
                            store.record_error(network, &channel, e.to_string()).await
                        {
                            warn!("Failed to record sync error: {}", store_err);
                        }
                    }
                }
            }
        });
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
