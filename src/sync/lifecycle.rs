use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::controller::SyncController;
use super::driver::SyncDriver;
use super::lock_file::SyncLockManager;
use super::notifier::Notifier;
use super::notifier::SyncNotice;
use super::registry::EventStreamRegistry;
use crate::config::AppConfig;
use crate::network::resolve_credentials;
use crate::network::ClientBuildContext;
use crate::network::ClientFactory;
use crate::network::ConnectionProfile;
use crate::network::NetworkConfigDocument;
use crate::network::NetworkSelection;
use crate::network::SdkSettings;
use crate::network::SyncInterval;
use crate::storage::SyncStore;
use crate::LedgerSyncError;
use crate::Result;

/// What a successful [`LifecycleManager::initialize`] brought up
#[derive(Debug, Clone, Serialize)]
pub struct StartupReport {
    pub selection: NetworkSelection,
    pub interval_ms: u64,
    pub channels: usize,
    pub active_streams: usize,
}

/// Components brought up so far; filled in step by step so a shutdown during
/// initialization can tear down whatever exists.
struct Running {
    selection: NetworkSelection,
    registry: Arc<EventStreamRegistry>,
    controller: Option<Arc<SyncController>>,
    run_handle: Option<JoinHandle<()>>,
}

/// Boot sequencing and teardown of the supervisor
pub struct LifecycleManager {
    config: AppConfig,
    factory: Arc<dyn ClientFactory>,
    store: Arc<dyn SyncStore>,
    notifier: Arc<dyn Notifier>,
    lock_manager: SyncLockManager,
    running: Mutex<Option<Running>>,
    started: AtomicBool,
    destroyed: AtomicBool,
}

impl LifecycleManager {
    #[must_use]
    pub fn new(
        config: AppConfig,
        factory: Arc<dyn ClientFactory>,
        store: Arc<dyn SyncStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let lock_manager = SyncLockManager::new(&config.sync.lock_file);
        Self {
            config,
            factory,
            store,
            notifier,
            lock_manager,
            running: Mutex::new(None),
            started: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Bring the supervisor up for the network/client picked by `args`.
    ///
    /// Config and client construction errors are fatal. A refused
    /// registration returns [`LedgerSyncError::Registration`] and leaves the
    /// controller unstarted.
    pub async fn initialize(&self, args: &[String]) -> Result<StartupReport> {
        if self.is_destroyed() {
            return Err(LedgerSyncError::Custom(
                "Supervisor already shut down".to_string(),
            ));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(LedgerSyncError::Custom(
                "Supervisor already initialized".to_string(),
            ));
        }

        // 1. configuration and selection
        let document = NetworkConfigDocument::from_file(self.config.network_config_path())?;
        let selection = NetworkSelection::resolve(&document, args)?;
        let profile = selection.profile(&document)?.clone();
        info!("Selected network {}", selection);

        self.lock_manager.create_lock("starting", &selection)?;
        let result = self.bring_up(&document, selection, profile).await;
        if let Err(e) = &result {
            if let Err(lock_err) = self.lock_manager.set_error(&e.to_string()) {
                warn!("Failed to record startup error in lock file: {}", lock_err);
            }
        }
        result
    }

    async fn bring_up(
        &self,
        document: &NetworkConfigDocument,
        selection: NetworkSelection,
        profile: ConnectionProfile,
    ) -> Result<StartupReport> {
        // 2. interval; the network document wins over the TOML file
        let interval =
            SyncInterval::resolve(self.config.blocks_sync_time(), SyncInterval::default());
        let interval = SyncInterval::resolve(document.blocks_sync_time.as_deref(), interval);
        info!("Sync interval: {} ms", interval.as_millis());

        // 3. client settings, fixed from here on
        let settings = SdkSettings::from_interval(interval)
            .with_localhost_discovery(self.config.sync.discovery_as_localhost);
        debug!("Client settings: {:?}", settings);

        // 4. credentials
        let credentials = resolve_credentials(&profile, &document.base_dir);

        // 5. client
        let context = ClientBuildContext {
            selection: selection.clone(),
            profile,
            credentials,
            settings,
        };
        let client = self.factory.build(&context).await?.ok_or_else(|| {
            LedgerSyncError::ClientConstruction(format!("No usable client for {selection}"))
        })?;

        // 6. registration
        let driver = Arc::new(SyncDriver::new(
            Arc::clone(&client),
            Arc::clone(&self.store),
            &selection.network_name,
        ));
        if !driver.register_network(&selection, &context.profile).await? {
            error!(
                "Registration of {} failed, sync controller will not start",
                selection
            );
            if let Err(e) = self.lock_manager.update_status("registration_failed") {
                warn!("Failed to update lock file: {}", e);
            }
            self.notifier.send(SyncNotice::RegistrationFailed {
                network: selection.network_name.clone(),
                client: selection.client_name.clone(),
            });
            return Err(LedgerSyncError::Registration {
                network: selection.network_name,
                client: selection.client_name,
            });
        }

        // 7. event streams
        let registry = Arc::new(EventStreamRegistry::new(client));
        self.install(Running {
            selection: selection.clone(),
            registry: Arc::clone(&registry),
            controller: None,
            run_handle: None,
        })?;
        let channels = registry.initialize().await;

        // 8. controller; its first tick comes one interval from now
        let controller = Arc::new(
            SyncController::new(Arc::clone(&registry), driver, interval)
                .with_schedule(self.config.schedule_mode())
                .with_max_concurrent(self.config.max_concurrent_channels())
                .with_notifier(Arc::clone(&self.notifier))
                .with_lock_manager(self.lock_manager.clone())
                .with_error_store(Arc::clone(&self.store), &selection.network_name),
        );
        {
            let mut running = self.running_slot();
            match running.as_mut() {
                Some(running) if !self.is_destroyed() => {
                    running.run_handle = Some(tokio::spawn(Arc::clone(&controller).run()));
                    running.controller = Some(controller);
                }
                _ => {
                    return Err(LedgerSyncError::Custom(
                        "Supervisor shut down during initialization".to_string(),
                    ));
                }
            }
        }

        if let Err(e) = self.lock_manager.update_status("running") {
            warn!("Failed to update lock file: {}", e);
        }
        self.notifier.send(SyncNotice::Started {
            network: selection.network_name.clone(),
            client: selection.client_name.clone(),
            interval_ms: interval.as_millis(),
        });

        let report = StartupReport {
            selection,
            interval_ms: interval.as_millis(),
            channels,
            active_streams: registry.active_streams(),
        };
        info!(
            "Supervisor running for {}: {} channels, {} streams, first sync in {} ms",
            report.selection, report.channels, report.active_streams, report.interval_ms
        );
        Ok(report)
    }

    /// Stop the controller and disconnect every stream.
    ///
    /// Idempotent, never fails, and safe before or during [`Self::initialize`].
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            debug!("Supervisor already shut down");
            return;
        }
        info!("Shutting down supervisor");
        if let Err(e) = self.lock_manager.update_status("stopping") {
            warn!("Failed to update lock file: {}", e);
        }

        let running = self.running_slot().take();
        if let Some(running) = running {
            if let Some(controller) = &running.controller {
                controller.stop();
            }
            if let Some(handle) = running.run_handle {
                if let Err(e) = handle.await {
                    warn!("Sync controller task ended abnormally: {}", e);
                }
            }
            if let Some(controller) = &running.controller {
                controller.drain(self.config.drain_timeout()).await;
            }
            running.registry.disconnect_all();
            self.notifier.send(SyncNotice::Stopped {
                network: running.selection.network_name.clone(),
            });
        }

        if let Err(e) = self.lock_manager.update_status("stopped") {
            warn!("Failed to update lock file: {}", e);
        }
        if let Err(e) = self.lock_manager.release() {
            warn!("Failed to remove lock file: {}", e);
        }
        info!("Supervisor stopped");
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// True once the controller has been started and until shutdown
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running_slot()
            .as_ref()
            .is_some_and(|running| running.controller.is_some())
    }

    #[must_use]
    pub fn selection(&self) -> Option<NetworkSelection> {
        self.running_slot()
            .as_ref()
            .map(|running| running.selection.clone())
    }

    #[must_use]
    pub fn registry(&self) -> Option<Arc<EventStreamRegistry>> {
        self.running_slot()
            .as_ref()
            .map(|running| Arc::clone(&running.registry))
    }

    #[must_use]
    pub fn controller(&self) -> Option<Arc<SyncController>> {
        self.running_slot()
            .as_ref()
            .and_then(|running| running.controller.clone())
    }

    /// Event streams currently open; zero before initialization and after shutdown
    #[must_use]
    pub fn active_streams(&self) -> usize {
        self.registry()
            .map_or(0, |registry| registry.active_streams())
    }

    #[must_use]
    pub const fn lock_manager(&self) -> &SyncLockManager {
        &self.lock_manager
    }

    fn install(&self, running: Running) -> Result<()> {
        let mut slot = self.running_slot();
        if self.is_destroyed() {
            running.registry.disconnect_all();
            return Err(LedgerSyncError::Custom(
                "Supervisor shut down during initialization".to_string(),
            ));
        }
        *slot = Some(running);
        Ok(())
    }

    fn running_slot(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
