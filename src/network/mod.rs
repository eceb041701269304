//! Ledger network configuration and client construction
//!
//! - [`profile`]: network configuration document, network/client selection, sync interval
//! - [`settings`]: process-wide client settings derived from the interval
//! - [`credentials`]: per-organization credential paths
//! - [`client`]: the ledger client interface the supervisor drives
//! - [`http_client`]: built-in client for a REST ledger gateway

pub mod client;
pub mod credentials;
pub mod http_client;
pub mod profile;
pub mod settings;

pub use client::Block;
pub use client::ClientBuildContext;
pub use client::ClientFactory;
pub use client::EventSubscription;
pub use client::LedgerClient;
pub use credentials::resolve_credentials;
pub use credentials::OrganizationCredentials;
pub use http_client::HttpClientFactory;
pub use http_client::HttpLedgerClient;
pub use profile::ConnectionProfile;
pub use profile::NetworkConfigDocument;
pub use profile::NetworkSelection;
pub use profile::SyncInterval;
pub use settings::SdkSettings;
