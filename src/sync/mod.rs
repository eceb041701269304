//! Channel supervision and synchronization
//!
//! - [`registry`]: per-channel event streams and their liveness
//! - [`driver`]: catch-up synchronization pass for one channel
//! - [`controller`]: the periodic reconnect-or-sync loop
//! - [`lifecycle`]: boot sequencing and teardown
//! - [`lock_file`]: single-supervisor lock with per-channel progress
//! - [`notifier`]: best-effort notices to an upstream observer

pub mod connection;
pub mod controller;
pub mod driver;
pub mod lifecycle;
pub mod lock_file;
pub mod notifier;
pub mod registry;

pub use connection::ChannelConnection;
pub use controller::ControllerState;
pub use controller::SyncController;
pub use controller::TickReport;
pub use driver::ChannelSynchronizer;
pub use driver::SyncDriver;
pub use driver::SyncOutcome;
pub use lifecycle::LifecycleManager;
pub use lifecycle::StartupReport;
pub use lock_file::SyncLockFile;
pub use lock_file::SyncLockManager;
pub use notifier::notifier_from_config;
pub use notifier::ChannelNotifier;
pub use notifier::NoopNotifier;
pub use notifier::Notifier;
pub use notifier::SyncNotice;
pub use notifier::WebhookNotifier;
pub use registry::ChannelState;
pub use registry::EventStreamRegistry;
