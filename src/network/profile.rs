//! Network configuration document and network/client selection
//!
//! The document is JSON:
//!
//! ```json
//! {
//!   "network-configs": {
//!     "net1": {
//!       "name": "clientA",
//!       "clients": { "clientA": { "organizations": { ... }, "peers": { ... } } }
//!     }
//!   },
//!   "blocksSyncTime": "1"
//! }
//! ```
//!
//! Network and client order follows the document, so "first network" and
//! "first client" are well defined.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tracing::warn;

use crate::LedgerSyncError;
use crate::Result;

pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 60_000;

/// File reference used by credential entries: either a path or inline PEM
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PemRef {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub pem: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationConfig {
    pub mspid: String,
    #[serde(rename = "adminPrivateKey", default)]
    pub admin_private_key: Option<PemRef>,
    #[serde(rename = "signedCert", default)]
    pub signed_cert: Option<PemRef>,
    #[serde(default)]
    pub peers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    pub url: String,
    #[serde(rename = "tlsCACerts", default)]
    pub tls_ca_certs: Option<PemRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientSection {
    #[serde(default)]
    pub organization: Option<String>,
    /// Explicit gateway endpoint; falls back to the first peer URL
    #[serde(default)]
    pub gateway: Option<String>,
}

/// Connection profile of one client identity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionProfile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub organizations: BTreeMap<String, OrganizationConfig>,
    #[serde(default)]
    pub peers: BTreeMap<String, PeerConfig>,
    /// Credential paths are already absolute
    #[serde(default)]
    pub fullpath: bool,
}

impl ConnectionProfile {
    /// Endpoint the ledger client talks to
    #[must_use]
    pub fn gateway_url(&self) -> Option<&str> {
        self.client
            .gateway
            .as_deref()
            .or_else(|| self.peers.values().next().map(|peer| peer.url.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct NetworkProfile {
    /// Default client name
    pub name: String,
    pub clients: Vec<(String, ConnectionProfile)>,
}

impl NetworkProfile {
    #[must_use]
    pub fn client(&self, name: &str) -> Option<&ConnectionProfile> {
        self.clients
            .iter()
            .find(|(client_name, _)| client_name == name)
            .map(|(_, profile)| profile)
    }
}

/// Parsed network configuration document
#[derive(Debug, Clone)]
pub struct NetworkConfigDocument {
    pub networks: Vec<(String, NetworkProfile)>,
    /// Raw `blocksSyncTime` value (minutes)
    pub blocks_sync_time: Option<String>,
    /// Directory relative credential paths resolve against
    pub base_dir: PathBuf,
}

impl NetworkConfigDocument {
    /// Load the document from disk; malformed JSON is fatal
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LedgerSyncError::Config(format!(
                "Failed to read network config {}: {e}",
                path.display()
            ))
        })?;
        let base_dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self::parse(&content, base_dir)
    }

    pub fn parse(content: &str, base_dir: PathBuf) -> Result<Self> {
        let root: Value = serde_json::from_str(content)
            .map_err(|e| LedgerSyncError::Config(format!("Malformed network config: {e}")))?;

        let configs = root
            .get("network-configs")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                LedgerSyncError::Config("Missing 'network-configs' object".to_string())
            })?;

        let mut networks = Vec::with_capacity(configs.len());
        for (network_name, raw) in configs {
            networks.push((network_name.clone(), parse_network(network_name, raw)?));
        }

        let blocks_sync_time = root.get("blocksSyncTime").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        Ok(Self {
            networks,
            blocks_sync_time,
            base_dir,
        })
    }

    #[must_use]
    pub fn network(&self, name: &str) -> Option<&NetworkProfile> {
        self.networks
            .iter()
            .find(|(network_name, _)| network_name == name)
            .map(|(_, profile)| profile)
    }
}

fn parse_network(network_name: &str, raw: &Value) -> Result<NetworkProfile> {
    let default_client = raw
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let empty = Map::new();
    let raw_clients = raw.get("clients").and_then(Value::as_object).unwrap_or(&empty);

    let mut clients = Vec::with_capacity(raw_clients.len());
    for (client_name, profile) in raw_clients {
        let profile: ConnectionProfile = serde_json::from_value(profile.clone()).map_err(|e| {
            LedgerSyncError::Config(format!(
                "Invalid connection profile {network_name}/{client_name}: {e}"
            ))
        })?;
        clients.push((client_name.clone(), profile));
    }

    Ok(NetworkProfile {
        name: default_client,
        clients,
    })
}

/// The single (network, client) pair active for the process lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkSelection {
    pub network_name: String,
    pub client_name: String,
}

impl NetworkSelection {
    /// Resolve from zero, one or two positional arguments
    ///
    /// - no args: first network, its default client
    /// - one arg: the named network, its first client
    /// - two args: both explicit
    pub fn resolve(document: &NetworkConfigDocument, args: &[String]) -> Result<Self> {
        let (network_name, client_name) = match args {
            [] => {
                let (network_name, profile) = document.networks.first().ok_or_else(|| {
                    LedgerSyncError::Config("No network defined in network-configs".to_string())
                })?;
                (network_name.clone(), profile.name.clone())
            }
            [network_name] => {
                let profile = document.network(network_name).ok_or_else(|| {
                    LedgerSyncError::Config(format!("Network '{network_name}' not found"))
                })?;
                let (client_name, _) = profile.clients.first().ok_or_else(|| {
                    LedgerSyncError::Config(format!(
                        "Network '{network_name}' defines no clients"
                    ))
                })?;
                (network_name.clone(), client_name.clone())
            }
            [network_name, client_name] => (network_name.clone(), client_name.clone()),
            _ => {
                return Err(LedgerSyncError::Config(format!(
                    "Expected at most two arguments (network, client), got {}",
                    args.len()
                )))
            }
        };

        let network = document.network(&network_name).ok_or_else(|| {
            LedgerSyncError::Config(format!("Network '{network_name}' not found"))
        })?;
        if network.client(&client_name).is_none() {
            return Err(LedgerSyncError::Config(format!(
                "Client '{client_name}' not found in network '{network_name}'"
            )));
        }

        Ok(Self {
            network_name,
            client_name,
        })
    }

    /// Connection profile of the selected client
    pub fn profile<'a>(&self, document: &'a NetworkConfigDocument) -> Result<&'a ConnectionProfile> {
        document
            .network(&self.network_name)
            .and_then(|network| network.client(&self.client_name))
            .ok_or_else(|| {
                LedgerSyncError::Config(format!(
                    "Client '{}' not found in network '{}'",
                    self.client_name, self.network_name
                ))
            })
    }
}

impl std::fmt::Display for NetworkSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network_name, self.client_name)
    }
}

/// Period between controller ticks; always positive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncInterval(Duration);

impl SyncInterval {
    #[must_use]
    pub const fn from_millis(ms: u64) -> Option<Self> {
        if ms == 0 {
            None
        } else {
            Some(Self(Duration::from_millis(ms)))
        }
    }

    /// Apply a raw minutes value; malformed or non-positive input keeps `current`
    #[must_use]
    pub fn resolve(raw: Option<&str>, current: Self) -> Self {
        let Some(raw) = raw else {
            return current;
        };

        match raw.trim().parse::<u64>() {
            Ok(minutes) if minutes > 0 => minutes
                .checked_mul(60_000)
                .and_then(Self::from_millis)
                .unwrap_or_else(|| {
                    warn!("Sync interval of {} minutes overflows, keeping current", minutes);
                    current
                }),
            _ => {
                warn!(
                    "Ignoring invalid sync interval '{}', keeping {} ms",
                    raw,
                    current.as_millis()
                );
                current
            }
        }
    }

    #[must_use]
    pub const fn as_duration(&self) -> Duration {
        self.0
    }

    #[must_use]
    pub fn as_millis(&self) -> u64 {
        u64::try_from(self.0.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for SyncInterval {
    fn default() -> Self {
        Self(Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_NETWORKS: &str = r#"{
        "network-configs": {
            "net1": {
                "name": "clientA",
                "clients": {
                    "clientB": { "peers": { "peer0": { "url": "http://peer0:7051" } } },
                    "clientA": { "client": { "gateway": "http://gw:8080" } }
                }
            },
            "net2": {
                "name": "admin",
                "clients": {
                    "admin": {},
                    "reader": {}
                }
            }
        },
        "blocksSyncTime": 5
    }"#;

    fn document() -> NetworkConfigDocument {
        NetworkConfigDocument::parse(TWO_NETWORKS, PathBuf::from("/etc/ledgersync")).unwrap()
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_document_preserves_order() {
        let doc = document();
        let names: Vec<_> = doc.networks.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["net1", "net2"]);
        let clients: Vec<_> = doc.networks[0]
            .1
            .clients
            .iter()
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(clients, vec!["clientB", "clientA"]);
        assert_eq!(doc.blocks_sync_time.as_deref(), Some("5"));
    }

    #[test]
    fn test_selection_without_args_uses_default_client() {
        let selection = NetworkSelection::resolve(&document(), &[]).unwrap();
        assert_eq!(selection.network_name, "net1");
        assert_eq!(selection.client_name, "clientA");
    }

    #[test]
    fn test_selection_with_network_uses_first_client() {
        let selection = NetworkSelection::resolve(&document(), &args(&["net1"])).unwrap();
        assert_eq!(selection.client_name, "clientB");

        let selection = NetworkSelection::resolve(&document(), &args(&["net2"])).unwrap();
        assert_eq!(selection.client_name, "admin");
    }

    #[test]
    fn test_selection_with_both_args() {
        let selection =
            NetworkSelection::resolve(&document(), &args(&["net2", "reader"])).unwrap();
        assert_eq!(selection.to_string(), "net2/reader");
    }

    #[test]
    fn test_selection_rejects_unknown_names() {
        for bad in [
            args(&["missing"]),
            args(&["net1", "nobody"]),
            args(&["missing", "clientA"]),
            args(&["net1", "clientA", "extra"]),
        ] {
            let err = NetworkSelection::resolve(&document(), &bad).unwrap_err();
            assert!(matches!(err, LedgerSyncError::Config(_)), "{bad:?}");
        }
    }

    #[test]
    fn test_default_client_must_exist() {
        let raw = r#"{"network-configs": {"net1": {"name": "ghost", "clients": {"clientA": {}}}}}"#;
        let doc = NetworkConfigDocument::parse(raw, PathBuf::from(".")).unwrap();
        assert!(matches!(
            NetworkSelection::resolve(&doc, &[]),
            Err(LedgerSyncError::Config(_))
        ));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = NetworkConfigDocument::parse("{ not json", PathBuf::from(".")).unwrap_err();
        assert!(err.is_fatal());
        let err = NetworkConfigDocument::parse("{}", PathBuf::from(".")).unwrap_err();
        assert!(matches!(err, LedgerSyncError::Config(_)));
    }

    #[test]
    fn test_gateway_url() {
        let doc = document();
        let net1 = doc.network("net1").unwrap();
        assert_eq!(
            net1.client("clientA").unwrap().gateway_url(),
            Some("http://gw:8080")
        );
        assert_eq!(
            net1.client("clientB").unwrap().gateway_url(),
            Some("http://peer0:7051")
        );
        assert_eq!(doc.network("net2").unwrap().client("admin").unwrap().gateway_url(), None);
    }

    #[test]
    fn test_sync_interval_parsing() {
        let default = SyncInterval::default();
        assert_eq!(default.as_millis(), 60_000);
        assert_eq!(SyncInterval::resolve(Some("5"), default).as_millis(), 300_000);
        assert_eq!(SyncInterval::resolve(Some(" 2 "), default).as_millis(), 120_000);
        assert_eq!(SyncInterval::resolve(Some("abc"), default), default);
        assert_eq!(SyncInterval::resolve(None, default), default);
        assert_eq!(SyncInterval::resolve(Some("0"), default), default);
        assert_eq!(SyncInterval::resolve(Some("-3"), default), default);
        assert_eq!(SyncInterval::resolve(Some("1.5"), default), default);
    }

    #[test]
    fn test_sync_interval_fallback_keeps_current_value() {
        let current = SyncInterval::resolve(Some("3"), SyncInterval::default());
        assert_eq!(SyncInterval::resolve(Some("bogus"), current).as_millis(), 180_000);
        assert!(SyncInterval::from_millis(0).is_none());
    }
}
