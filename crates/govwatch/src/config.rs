//! Monitor configuration from TOML.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::EndpointKind;

/// Execution mode; shortens cycle periods in development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    #[default]
    Production,
}

impl Mode {
    /// Period of the proposal-poller cycle.
    pub fn poll_interval(self) -> Duration {
        match self {
            Mode::Development => Duration::from_secs(10),
            Mode::Production => Duration::from_secs(5 * 60),
        }
    }

    /// Period of the upgrade-tracker cycle.
    pub fn tracker_interval(self) -> Duration {
        match self {
            Mode::Development => Duration::from_secs(10),
            Mode::Production => Duration::from_secs(60),
        }
    }
}

/// Outbound HTTP knobs. The per-request timeout applies to every endpoint
/// attempt; the retry settings only apply to the interactive endpoint probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_retries_per_endpoint")]
    pub retries_per_endpoint: u32,

    #[serde(default = "default_retry_wait_secs")]
    pub retry_wait_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_retries_per_endpoint() -> u32 {
    3
}

fn default_retry_wait_secs() -> u64 {
    5
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            retries_per_endpoint: default_retries_per_endpoint(),
            retry_wait_secs: default_retry_wait_secs(),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_secs(self.retry_wait_secs)
    }
}

/// Chain-registry refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_registry_interval_secs")]
    pub refresh_interval_secs: u64,
}

fn default_registry_interval_secs() -> u64 {
    60 * 60
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            refresh_interval_secs: default_registry_interval_secs(),
        }
    }
}

/// A seeded endpoint for a chain configured by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSeed {
    pub kind: EndpointKind,
    pub url: String,
    pub provider: String,
}

/// A chain configured by hand rather than discovered via the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSeed {
    /// On-chain chain id, e.g. `cosmoshub-4`.
    pub chain_id: String,

    pub endpoints: Vec<EndpointSeed>,

    /// Restricts the chain to one notification group.
    pub custom_for_group: Option<String>,

    pub link_pattern: Option<String>,
}

/// Monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub mode: Mode,

    /// Globally supported chain names; chains outside this list are only
    /// polled when they are custom to a group.
    #[serde(default)]
    pub supported_chains: Vec<String>,

    /// Health/metrics server port (disabled if not set).
    pub health_port: Option<u16>,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    /// Seeded chains, keyed by chain name.
    #[serde(default)]
    pub chains: HashMap<String, ChainSeed>,

    /// Notification groups and the chain names they subscribe to.
    #[serde(default)]
    pub subscribers: HashMap<String, Vec<String>>,
}

impl MonitorConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("{}: {e}", path.as_ref().display())))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))?;
        Ok(config)
    }

    /// Whether a chain is in scope for the poller and tracker.
    pub fn chain_in_scope(&self, name: &str, custom_for_group: Option<&str>) -> bool {
        custom_for_group.is_some() || self.supported_chains.iter().any(|c| c == name)
    }
}
