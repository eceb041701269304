//! `ledgersync` - supervisor keeping a local mirror of ledger network channels in sync
//!
//! A single process is bound to one (network, client) pair for its lifetime.
//! It opens an event stream per channel and, on a fixed interval, either runs a
//! catch-up synchronization for each connected channel or asks the registry to
//! reconnect a channel whose stream went down.
//!
//! # Features
//!
//! - **Network selection**: pick network and client from a JSON network document
//! - **Liveness monitoring**: per-channel event streams with background reconnect
//! - **Periodic resync**: fixed-rate (or fixed-delay) ticks, no overlapping passes per channel
//! - **Resumable progress**: blocks applied idempotently by number, persisted per block
//! - **Graceful shutdown**: stop ticking, let running passes finish, close every stream
#![allow(clippy::doc_markdown)]
//!
//! # Quick Start
//!
//! Create `config.toml` from `config.example.toml` and point it at the network
//! document:
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [sync]
//! network_config = "config.json"
//! ```
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ledgersync::network::HttpClientFactory;
//! use ledgersync::storage::FileSyncStore;
//! use ledgersync::sync::notifier_from_config;
//! use ledgersync::sync::LifecycleManager;
//! use ledgersync::AppConfig;
//!
//! #[tokio::main]
//! async fn main() -> ledgersync::Result<()> {
//!     let config = AppConfig::load()?;
//!     let store = Arc::new(FileSyncStore::open(&config.sync.state_file)?);
//!     let manager = LifecycleManager::new(
//!         config.clone(),
//!         Arc::new(HttpClientFactory),
//!         store,
//!         notifier_from_config(&config),
//!     );
//!
//!     // No arguments: first network, its default client
//!     manager.initialize(&[]).await?;
//!     tokio::signal::ctrl_c().await?;
//!     manager.destroy().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`cli`]: Command-line interface
//! - [`config`]: Configuration management
//! - [`network`]: Network document, selection, client interface
//! - [`storage`]: Persisted registration and per-channel progress
//! - [`sync`]: Registry, driver, controller and lifecycle
//!
//! # Error Handling
//!
//! All operations return [`Result<T>`] with [`LedgerSyncError`]. Configuration
//! and client construction errors are fatal at startup; per-channel errors are
//! contained by the controller.

pub mod cli;
pub mod config;
pub mod errors;
pub mod logging;
pub mod network;
pub mod storage;
pub mod sync;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::LedgerSyncError;
pub use errors::Result;
pub use network::NetworkSelection;
pub use network::SyncInterval;
pub use sync::LifecycleManager;
pub use sync::SyncController;
