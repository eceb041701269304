//! Per-organization credential and enrollment paths

use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;
use tracing::warn;

use super::profile::ConnectionProfile;
use super::profile::PemRef;

/// Where a credential comes from once paths are resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CredentialSource {
    File(PathBuf),
    InlinePem(String),
}

impl CredentialSource {
    fn from_ref(pem_ref: &PemRef, base_dir: &Path, fullpath: bool) -> Option<Self> {
        if let Some(pem) = &pem_ref.pem {
            return Some(Self::InlinePem(pem.clone()));
        }
        pem_ref.path.as_ref().map(|raw| {
            let path = PathBuf::from(raw);
            if fullpath || path.is_absolute() {
                Self::File(path)
            } else {
                Self::File(base_dir.join(path))
            }
        })
    }

    /// Missing file on disk; inline material is always present
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::File(path) => !path.exists(),
            Self::InlinePem(_) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganizationCredentials {
    pub org: String,
    pub msp_id: String,
    pub admin_private_key: Option<CredentialSource>,
    pub signed_cert: Option<CredentialSource>,
    /// TLS CA certificates of the organization's peers, keyed by peer name
    pub tls_ca_certs: Vec<(String, CredentialSource)>,
}

/// Resolve credential locations for every organization of the profile.
///
/// Missing files are logged but not fatal; enrollment is the client's concern.
#[must_use]
pub fn resolve_credentials(
    profile: &ConnectionProfile,
    base_dir: &Path,
) -> Vec<OrganizationCredentials> {
    profile
        .organizations
        .iter()
        .map(|(org, config)| {
            let resolve = |pem_ref: &PemRef| {
                CredentialSource::from_ref(pem_ref, base_dir, profile.fullpath)
            };

            let tls_ca_certs = config
                .peers
                .iter()
                .filter_map(|peer_name| {
                    profile
                        .peers
                        .get(peer_name)
                        .and_then(|peer| peer.tls_ca_certs.as_ref())
                        .and_then(resolve)
                        .map(|source| (peer_name.clone(), source))
                })
                .collect();

            let credentials = OrganizationCredentials {
                org: org.clone(),
                msp_id: config.mspid.clone(),
                admin_private_key: config.admin_private_key.as_ref().and_then(resolve),
                signed_cert: config.signed_cert.as_ref().and_then(resolve),
                tls_ca_certs,
            };

            for source in credentials
                .admin_private_key
                .iter()
                .chain(credentials.signed_cert.iter())
                .chain(credentials.tls_ca_certs.iter().map(|(_, source)| source))
            {
                if source.is_missing() {
                    warn!("Organization {}: credential not found: {:?}", org, source);
                }
            }
            debug!("Resolved credentials for organization {} ({})", org, config.mspid);

            credentials
        })
        .collect()
}
