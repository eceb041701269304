//! Startup and shutdown sequencing tests

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::FakeFactory;
use common::FakeLedger;
use ledgersync::storage::MemorySyncStore;
use ledgersync::storage::SyncStore;
use ledgersync::sync::ChannelNotifier;
use ledgersync::sync::LifecycleManager;
use ledgersync::sync::NoopNotifier;
use ledgersync::sync::SyncNotice;
use ledgersync::AppConfig;
use ledgersync::LedgerSyncError;
use tempfile::TempDir;

const SINGLE_NETWORK: &str = r#"{
    "network-configs": {
        "net1": {
            "name": "clientA",
            "clients": {
                "clientA": {
                    "client": { "organization": "Org1" },
                    "organizations": {
                        "Org1": {
                            "mspid": "Org1MSP",
                            "adminPrivateKey": { "path": "crypto/org1/key.pem" },
                            "signedCert": { "pem": "-----BEGIN CERTIFICATE-----" },
                            "peers": ["peer0"]
                        }
                    },
                    "peers": {
                        "peer0": { "url": "http://peer0.org1:7051" }
                    }
                }
            }
        }
    }
}"#;

fn config_in(dir: &Path, network_document: &str) -> AppConfig {
    std::fs::write(dir.join("config.json"), network_document).unwrap();
    let mut config = AppConfig::default();
    config.sync.network_config = dir.join("config.json");
    config.sync.lock_file = dir.join("ledgersync.lock");
    config.sync.state_file = dir.join("state.json");
    config
}

fn manager(
    config: AppConfig,
    factory: Arc<FakeFactory>,
    store: Arc<MemorySyncStore>,
) -> LifecycleManager {
    LifecycleManager::new(config, factory, store, Arc::new(NoopNotifier))
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_default_selection_and_first_tick() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path(), SINGLE_NETWORK);
    let ledger = FakeLedger::with_channels(&[("mychannel", 4)]);
    let factory = FakeFactory::new(ledger.clone());
    let store = Arc::new(MemorySyncStore::new());
    let manager = manager(config, factory.clone(), store.clone());

    let report = manager.initialize(&[]).await.unwrap();
    assert_eq!(report.selection.network_name, "net1");
    assert_eq!(report.selection.client_name, "clientA");
    assert_eq!(report.interval_ms, 60_000);
    assert_eq!(report.channels, 1);
    assert_eq!(report.active_streams, 1);
    assert!(manager.is_running());

    // Client built with settings derived from the interval and resolved credentials
    let contexts = factory.contexts.lock().unwrap().clone();
    assert_eq!(contexts.len(), 1);
    assert_eq!(
        contexts[0].settings.discovery_cache_life,
        Duration::from_millis(60_000)
    );
    assert_eq!(contexts[0].credentials[0].msp_id, "Org1MSP");
    assert_eq!(store.registrations().await[0].msp_ids, vec!["Org1MSP"]);

    // Nothing is synchronized at startup
    tokio::time::sleep(Duration::from_millis(59_999)).await;
    assert_eq!(ledger.sync_calls("mychannel"), 0);
    assert_eq!(manager.controller().unwrap().tick_count(), 0);

    tokio::time::sleep(Duration::from_millis(2)).await;
    common::settle().await;
    assert_eq!(manager.controller().unwrap().tick_count(), 1);
    assert_eq!(ledger.sync_calls("mychannel"), 1);
    assert_eq!(store.last_height("net1", "mychannel").await.unwrap(), Some(3));

    manager.destroy().await;
    assert_eq!(manager.active_streams(), 0);
    assert_eq!(ledger.open_streams(), 0);
    assert!(!dir.path().join("ledgersync.lock").exists());
}

#[tokio::test]
async fn test_interval_from_network_document() {
    let dir = TempDir::new().unwrap();
    let document = SINGLE_NETWORK.replacen('{', r#"{ "blocksSyncTime": "5","#, 1);
    let config = config_in(dir.path(), &document);
    let ledger = FakeLedger::with_channels(&[("mychannel", 0)]);
    let manager = manager(
        config,
        FakeFactory::new(ledger),
        Arc::new(MemorySyncStore::new()),
    );

    let report = manager.initialize(&[]).await.unwrap();
    assert_eq!(report.interval_ms, 300_000);
    manager.destroy().await;
}

#[tokio::test]
async fn test_unknown_selection_is_config_error() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path(), SINGLE_NETWORK);

    for bad in [args(&["net2"]), args(&["net1", "clientB"])] {
        let ledger = FakeLedger::with_channels(&[("mychannel", 0)]);
        let manager = manager(
            config.clone(),
            FakeFactory::new(ledger.clone()),
            Arc::new(MemorySyncStore::new()),
        );
        let err = manager.initialize(&bad).await.unwrap_err();
        assert!(matches!(err, LedgerSyncError::Config(_)), "{bad:?}");
        assert!(err.is_fatal());
        assert_eq!(ledger.subscribe_calls("mychannel"), 0);
    }
}

#[tokio::test]
async fn test_malformed_network_document_is_config_error() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path(), "{ \"network-configs\": ");
    let manager = manager(
        config,
        FakeFactory::new(FakeLedger::with_channels(&[])),
        Arc::new(MemorySyncStore::new()),
    );
    let err = manager.initialize(&[]).await.unwrap_err();
    assert!(matches!(err, LedgerSyncError::Config(_)));
}

#[tokio::test]
async fn test_missing_client_is_construction_error() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path(), SINGLE_NETWORK);
    let manager = manager(config, FakeFactory::empty(), Arc::new(MemorySyncStore::new()));

    let err = manager.initialize(&args(&["net1"])).await.unwrap_err();
    assert!(matches!(err, LedgerSyncError::ClientConstruction(_)));
    assert!(err.is_fatal());
    assert!(!manager.is_running());

    // Startup error is left in the lock file until shutdown
    let lock = manager.lock_manager().read_lock().unwrap();
    assert!(lock.error_message.is_some());
    manager.destroy().await;
    assert!(!manager.lock_manager().lock_exists());
}

#[tokio::test]
async fn test_refused_registration_never_starts_controller() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path(), SINGLE_NETWORK);
    let ledger = FakeLedger::with_channels(&[("mychannel", 2)]);
    let (notifier, mut notices) = ChannelNotifier::new(8);
    let manager = LifecycleManager::new(
        config,
        FakeFactory::new(ledger.clone()),
        Arc::new(MemorySyncStore::refusing_registration()),
        Arc::new(notifier),
    );

    let err = manager.initialize(&args(&["net1", "clientA"])).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerSyncError::Registration { ref network, ref client }
            if network == "net1" && client == "clientA"
    ));
    assert!(!err.is_fatal());
    assert!(!manager.is_running());
    assert!(manager.controller().is_none());
    assert_eq!(manager.active_streams(), 0);
    assert_eq!(ledger.subscribe_calls("mychannel"), 0);
    assert_eq!(
        manager.lock_manager().read_lock().unwrap().status,
        "registration_failed"
    );
    assert_eq!(
        notices.recv().await,
        Some(SyncNotice::RegistrationFailed {
            network: "net1".to_string(),
            client: "clientA".to_string(),
        })
    );

    manager.destroy().await;
}

#[tokio::test]
async fn test_destroy_is_idempotent_and_safe_before_initialize() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path(), SINGLE_NETWORK);
    let ledger = FakeLedger::with_channels(&[("mychannel", 0)]);

    let untouched = manager(
        config.clone(),
        FakeFactory::new(ledger.clone()),
        Arc::new(MemorySyncStore::new()),
    );
    untouched.destroy().await;
    untouched.destroy().await;
    assert_eq!(untouched.active_streams(), 0);
    assert!(untouched.initialize(&[]).await.is_err());
    assert_eq!(ledger.subscribe_calls("mychannel"), 0);

    let started = manager(
        config,
        FakeFactory::new(ledger.clone()),
        Arc::new(MemorySyncStore::new()),
    );
    started.initialize(&[]).await.unwrap();
    assert_eq!(ledger.open_streams(), 1);
    started.destroy().await;
    started.destroy().await;
    assert_eq!(started.active_streams(), 0);
    assert_eq!(ledger.open_streams(), 0);
    assert!(started.is_destroyed());
}

#[tokio::test]
async fn test_lock_file_tracks_running_supervisor() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path(), SINGLE_NETWORK);
    let ledger = FakeLedger::with_channels(&[("mychannel", 0)]);

    let manager = manager(
        config,
        FakeFactory::new(ledger),
        Arc::new(MemorySyncStore::new()),
    );
    manager.initialize(&[]).await.unwrap();
    let lock = manager.lock_manager().read_lock().unwrap();
    assert_eq!(lock.status, "running");
    assert_eq!(lock.pid, std::process::id());

    // Initializing twice is rejected
    assert!(manager.initialize(&[]).await.is_err());
    manager.destroy().await;
}
