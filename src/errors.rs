use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerSyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Client construction error: {0}")]
    ClientConstruction(String),

    #[error("Registration failed for network {network} (client {client})")]
    Registration { network: String, client: String },

    #[error("Event stream error on channel {channel}: {reason}")]
    Connection { channel: String, reason: String },

    #[error("Sync error on channel {channel}: {reason}")]
    Sync { channel: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl LedgerSyncError {
    /// Startup errors abort the process; everything else is contained by the
    /// controller and retried on the next tick.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::ClientConstruction(_))
    }

    pub fn sync(channel: &str, reason: impl ToString) -> Self {
        Self::Sync {
            channel: channel.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn connection(channel: &str, reason: impl ToString) -> Self {
        Self::Connection {
            channel: channel.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<&str> for LedgerSyncError {
    fn from(msg: &str) -> Self {
        Self::Custom(msg.to_string())
    }
}

impl From<String> for LedgerSyncError {
    fn from(msg: String) -> Self {
        Self::Custom(msg)
    }
}

pub type Result<T> = std::result::Result<T, LedgerSyncError>;
