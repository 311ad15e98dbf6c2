//! Topology configuration: which collaborators exist and where they live.
//!
//! The file is TOML and is normally produced by the provisioning tool once a
//! topology is up:
//!
//! ```toml
//! [apps.ledger]
//! status_uri = "http://localhost:9001/_status"
//! test_support_uri = "http://localhost:9001/_test-support/"
//!
//! [endpoints."api.example.com"]
//! uri = "https://localhost:9443"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::domain::CollaboratorInfo;
use crate::error::{CoreError, Result};

const DEFAULT_READY_TIMEOUT_SECS: u64 = 120;
const DEFAULT_BACKOFF_MS: u64 = 1000;
const DEFAULT_REPORT_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyConfig {
    #[serde(default)]
    pub apps: BTreeMap<String, AppConfig>,
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioner: Option<ProvisionerConfig>,
    #[serde(default)]
    pub readiness: ReadinessSettings,
    #[serde(default)]
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_installed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_support_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_certificate: Option<String>,
}

/// External tool that brings a topology up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    pub program: PathBuf,
    pub root: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_READY_TIMEOUT_SECS,
            backoff_ms: DEFAULT_BACKOFF_MS,
            report_interval_secs: DEFAULT_REPORT_INTERVAL_SECS,
        }
    }
}

impl ReadinessSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Unset means sync rounds repeat until a round reports no changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_READY_TIMEOUT_SECS
}

fn default_backoff_ms() -> u64 {
    DEFAULT_BACKOFF_MS
}

fn default_report_interval_secs() -> u64 {
    DEFAULT_REPORT_INTERVAL_SECS
}

impl TopologyConfig {
    /// Read and validate a topology file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), apps = config.apps.len(), "Topology config loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TopologyConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for name in self.apps.keys() {
            if name.trim().is_empty() {
                return Err(CoreError::Validation(
                    "app names must not be empty".to_string(),
                ));
            }
        }
        if self.readiness.report_interval_secs == 0 {
            return Err(CoreError::Validation(
                "readiness.report_interval_secs must be greater than zero".to_string(),
            ));
        }
        self.collaborators().map(|_| ())
    }

    pub fn app_names(&self) -> BTreeSet<String> {
        self.apps.keys().cloned().collect()
    }

    /// Collaborators in name order, with their URIs parsed.
    pub fn collaborators(&self) -> Result<Vec<CollaboratorInfo>> {
        self.apps
            .iter()
            .map(|(name, app)| {
                let mut info = CollaboratorInfo::new(name.clone());
                if let Some(uri) = &app.status_uri {
                    info = info.with_status_url(parse_uri(&format!("{name}.status_uri"), uri)?);
                }
                if let Some(uri) = &app.test_support_uri {
                    info = info.with_test_support_url(parse_uri(
                        &format!("{name}.test_support_uri"),
                        uri,
                    )?);
                }
                Ok(info)
            })
            .collect()
    }

    pub fn endpoint(&self, uri: &Url) -> Result<&EndpointConfig> {
        let host = uri.host_str().unwrap_or_default();
        self.endpoints
            .get(host)
            .ok_or_else(|| CoreError::EndpointNotConfigured {
                host: host.to_string(),
                uri: uri.to_string(),
            })
    }

    /// Point `uri` at the endpoint configured for its host, keeping the
    /// path, query and fragment.
    pub fn remap_uri(&self, uri: &Url) -> Result<Url> {
        let endpoint = self.endpoint(uri)?;
        let context = format!("endpoints.{}", uri.host_str().unwrap_or_default());
        let mut remapped = parse_uri(&context, &endpoint.uri)?;
        remapped.set_path(uri.path());
        remapped.set_query(uri.query());
        remapped.set_fragment(uri.fragment());
        Ok(remapped)
    }

    pub fn server_certificate(&self, uri: &Url) -> Result<Option<&str>> {
        Ok(self.endpoint(uri)?.server_certificate.as_deref())
    }
}

fn parse_uri(context: &str, uri: &str) -> Result<Url> {
    Url::parse(uri).map_err(|e| CoreError::InvalidUri {
        context: context.to_string(),
        uri: uri.to_string(),
        reason: e.to_string(),
    })
}
