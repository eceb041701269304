//! Best-effort notices to an upstream observer (parent process, webhook)

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::config::AppConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncNotice {
    Started {
        network: String,
        client: String,
        interval_ms: u64,
    },
    RegistrationFailed {
        network: String,
        client: String,
    },
    ChannelSynced {
        channel: String,
        height: u64,
        blocks_applied: u64,
    },
    ChannelError {
        channel: String,
        message: String,
    },
    ChannelReconnecting {
        channel: String,
    },
    Stopped {
        network: String,
    },
}

/// Fire-and-forget sink for [`SyncNotice`]s. Implementations never block
/// and never fail the caller.
pub trait Notifier: Send + Sync {
    fn send(&self, notice: SyncNotice);
}

/// Used when no upstream is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn send(&self, notice: SyncNotice) {
        debug!("No upstream configured, dropping notice {:?}", notice);
    }
}

/// Forwards notices to an in-process receiver, e.g. a supervising task
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<SyncNotice>,
}

impl ChannelNotifier {
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SyncNotice>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn send(&self, notice: SyncNotice) {
        if let Err(e) = self.tx.try_send(notice) {
            debug!("Dropping notice, upstream unavailable: {}", e);
        }
    }
}

/// POSTs notices as JSON to a webhook
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    const MAX_RETRIES: u32 = 3;
    const RETRY_DELAY_MS: u64 = 1000;

    #[must_use]
    pub fn new(url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to create webhook client: {}", e);
                Client::new()
            });

        Self {
            client,
            url: url.to_string(),
        }
    }

    /// Send a notice with retry logic
    pub async fn deliver(&self, notice: &SyncNotice) -> crate::Result<()> {
        let mut last_error = String::new();

        for attempt in 1..=Self::MAX_RETRIES {
            match self.client.post(&self.url).json(notice).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("Notice delivered to {} (status: {})", self.url, response.status());
                    return Ok(());
                }
                Ok(response) => {
                    last_error = format!("HTTP {}", response.status());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            error!(
                "Webhook delivery to {} failed: {} (attempt {}/{})",
                self.url,
                last_error,
                attempt,
                Self::MAX_RETRIES
            );
            if attempt < Self::MAX_RETRIES {
                tokio::time::sleep(Duration::from_millis(
                    Self::RETRY_DELAY_MS * u64::from(attempt),
                ))
                .await;
            }
        }

        Err(crate::LedgerSyncError::Custom(format!(
            "Webhook delivery failed after {} attempts: {}",
            Self::MAX_RETRIES,
            last_error
        )))
    }
}

impl Notifier for WebhookNotifier {
    fn send(&self, notice: SyncNotice) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime available, dropping notice {:?}", notice);
            return;
        };

        let notifier = self.clone();
        handle.spawn(async move {
            let _ = notifier.deliver(&notice).await;
        });
    }
}

/// Pick the notifier the configuration asks for
#[must_use]
pub fn notifier_from_config(config: &AppConfig) -> Arc<dyn Notifier> {
    match config.webhook_url() {
        Some(url) => {
            info!("Sync notices will be posted to {}", url);
            Arc::new(WebhookNotifier::new(url))
        }
        None => Arc::new(NoopNotifier),
    }
}
