//! Process-wide client settings derived from the sync interval

use std::time::Duration;

use serde::Serialize;

use super::profile::SyncInterval;

/// Settings every ledger client is built with.
///
/// Built once during startup and handed to the client factory; nothing
/// mutates them afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SdkSettings {
    /// Lifetime of cached service-discovery results
    pub discovery_cache_life: Duration,
    /// Resolve peers through service discovery instead of the static profile
    pub discovery_enabled: bool,
    /// Rewrite discovered endpoints to localhost (local test networks)
    pub discovery_as_localhost: bool,
}

impl SdkSettings {
    #[must_use]
    pub const fn from_interval(interval: SyncInterval) -> Self {
        Self {
            discovery_cache_life: interval.as_duration(),
            discovery_enabled: true,
            discovery_as_localhost: false,
        }
    }

    #[must_use]
    pub const fn with_localhost_discovery(mut self, enabled: bool) -> Self {
        self.discovery_as_localhost = enabled;
        self
    }
}
