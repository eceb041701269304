//! HTTP client for a REST ledger gateway
//!
//! Endpoints:
//! - `GET /channels` → `{"channels": ["mychannel", ...]}`
//! - `GET /channels/{channel}/height` → `{"height": 42}`
//! - `GET /channels/{channel}/blocks/{number}` → [`Block`]
//! - `GET /channels/{channel}/events` → newline-delimited block events, held open

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::client::subscription_channel;
use super::client::Block;
use super::client::ClientBuildContext;
use super::client::ClientFactory;
use super::client::EventSubscription;
use super::client::LedgerClient;
use super::settings::SdkSettings;
use crate::LedgerSyncError;
use crate::Result;

#[derive(Debug, Deserialize)]
struct ChannelsResponse {
    channels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct HeightResponse {
    height: u64,
}

#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    client: Client,
    base_url: String,
}

impl HttpLedgerClient {
    /// Create a client for the gateway at `endpoint`
    pub fn new(endpoint: &str, settings: &SdkSettings) -> Result<Self> {
        let mut url = Url::parse(endpoint).map_err(|e| {
            LedgerSyncError::ClientConstruction(format!("Invalid gateway URL '{endpoint}': {e}"))
        })?;

        if settings.discovery_as_localhost {
            url.set_host(Some("localhost")).map_err(|e| {
                LedgerSyncError::ClientConstruction(format!("Cannot rewrite gateway host: {e}"))
            })?;
        }

        // No overall timeout: event streams stay open indefinitely
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(settings.discovery_cache_life)
            .build()?;

        let base_url = url.as_str().trim_end_matches('/').to_string();
        debug!("Created ledger gateway client for {}", base_url);

        Ok(Self { client, base_url })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LedgerSyncError::Custom(format!(
                "GET {path} failed: HTTP {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn channels(&self) -> Result<Vec<String>> {
        let response: ChannelsResponse = self.get_json("/channels").await?;
        Ok(response.channels)
    }

    async fn ledger_height(&self, channel: &str) -> Result<u64> {
        let response: HeightResponse = self
            .get_json(&format!("/channels/{channel}/height"))
            .await
            .map_err(|e| LedgerSyncError::sync(channel, e))?;
        Ok(response.height)
    }

    async fn fetch_block(&self, channel: &str, number: u64) -> Result<Block> {
        self.get_json(&format!("/channels/{channel}/blocks/{number}"))
            .await
            .map_err(|e| LedgerSyncError::sync(channel, format!("block {number}: {e}")))
    }

    async fn subscribe(&self, channel: &str) -> Result<EventSubscription> {
        let url = format!("{}/channels/{}/events", self.base_url, channel);
        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerSyncError::connection(channel, e))?;

        if !response.status().is_success() {
            return Err(LedgerSyncError::connection(
                channel,
                format!("HTTP {}", response.status()),
            ));
        }

        let (subscription, mut feed) = subscription_channel(true);
        let channel = channel.to_string();
        info!("Event stream opened for channel {}", channel);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = feed.closed() => {
                        debug!("Event stream for channel {} closed by subscriber", channel);
                        break;
                    }
                    chunk = response.chunk() => match chunk {
                        Ok(Some(bytes)) => {
                            debug!("Channel {}: {} bytes of block events", channel, bytes.len());
                        }
                        Ok(None) => {
                            warn!("Event stream for channel {} ended", channel);
                            break;
                        }
                        Err(e) => {
                            warn!("Event stream for channel {} failed: {}", channel, e);
                            break;
                        }
                    }
                }
            }
            feed.set_active(false);
        });

        Ok(subscription)
    }
}

/// Builds [`HttpLedgerClient`]s from the selected connection profile
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpClientFactory;

#[async_trait]
impl ClientFactory for HttpClientFactory {
    async fn build(&self, context: &ClientBuildContext) -> Result<Option<Arc<dyn LedgerClient>>> {
        let Some(endpoint) = context.profile.gateway_url() else {
            warn!(
                "Connection profile for {} has no gateway or peer URL",
                context.selection
            );
            return Ok(None);
        };

        let client = HttpLedgerClient::new(endpoint, &context.settings)?;
        info!(
            "Ledger client for {} targets {} ({} organizations)",
            context.selection,
            client.base_url(),
            context.credentials.len()
        );
        Ok(Some(Arc::new(client)))
    }
}
