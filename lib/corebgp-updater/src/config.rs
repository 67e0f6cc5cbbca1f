//! Updater settings

use crate::{Result, UpdaterError};
use corebgp_gobgp::{CallTimeouts, TlsClientConfig};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// How the snapshot reconciler compares desired and installed routes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcileMode {
    /// Routes match when prefix, length and next hop match
    #[default]
    KeyOnly,
    /// Routes with a matching key but a different origin or identifier are reinstalled
    Strict,
}

impl FromStr for ReconcileMode {
    type Err = UpdaterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "key-only" => Ok(ReconcileMode::KeyOnly),
            "strict" => Ok(ReconcileMode::Strict),
            other => Err(UpdaterError::Configuration(format!(
                "unknown reconcile mode '{}' (expected key-only or strict)",
                other
            ))),
        }
    }
}

impl fmt::Display for ReconcileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileMode::KeyOnly => f.write_str("key-only"),
            ReconcileMode::Strict => f.write_str("strict"),
        }
    }
}

/// Certificate files for the GoBGP connection
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TlsPaths {
    pub ca_cert: PathBuf,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
}

/// Updater configuration
#[derive(Clone, Debug, PartialEq)]
pub struct UpdaterConfig {
    /// Base URL of the CoreBGP API
    pub api_endpoint: String,
    /// GoBGP gRPC address, `host:port`
    pub gobgp_endpoint: String,
    /// TLS for GoBGP. Plaintext when unset.
    pub gobgp_tls: Option<TlsPaths>,
    /// Interval between connectivity probes
    pub probe_interval: Duration,
    /// Pause before a new session after the previous one ended
    pub retry_interval: Duration,
    /// Timeout for API requests and the watch handshake
    pub api_timeout: Duration,
    /// Timeouts for single speaker calls
    pub call_timeouts: CallTimeouts,
    pub reconcile_mode: ReconcileMode,
    /// Prefixes the snapshot reconciler considers owned
    pub prefix_filters: Vec<String>,
    /// Capacity of the route update queue between watch and processor
    pub update_queue_capacity: usize,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "http://localhost:8080".to_string(),
            gobgp_endpoint: "127.0.0.1:50051".to_string(),
            gobgp_tls: None,
            probe_interval: Duration::from_secs(10),
            retry_interval: Duration::from_secs(5),
            api_timeout: Duration::from_secs(5),
            call_timeouts: CallTimeouts::default(),
            reconcile_mode: ReconcileMode::default(),
            prefix_filters: vec!["0.0.0.0/0".to_string()],
            update_queue_capacity: 100,
        }
    }
}

impl UpdaterConfig {
    /// Reject settings no session could start with
    pub fn validate(&self) -> Result<()> {
        let api = self.api_endpoint.trim();
        if !(api.starts_with("http://") || api.starts_with("https://")) {
            return Err(UpdaterError::Configuration(format!(
                "api endpoint must be an http(s) URL, got '{}'",
                self.api_endpoint
            )));
        }

        if self.gobgp_endpoint.trim().is_empty() {
            return Err(UpdaterError::Configuration("gobgp endpoint is empty".to_string()));
        }

        if let Some(tls) = &self.gobgp_tls {
            if tls.client_cert.is_some() != tls.client_key.is_some() {
                return Err(UpdaterError::Configuration(
                    "gobgp client certificate and key must be given together".to_string(),
                ));
            }
        }

        for (name, value) in [
            ("probe interval", self.probe_interval),
            ("retry interval", self.retry_interval),
            ("api timeout", self.api_timeout),
            ("add timeout", self.call_timeouts.add),
            ("delete timeout", self.call_timeouts.delete),
            ("list timeout", self.call_timeouts.list),
            ("probe timeout", self.call_timeouts.probe),
        ] {
            if value.is_zero() {
                return Err(UpdaterError::Configuration(format!("{} must be positive", name)));
            }
        }

        if self.update_queue_capacity == 0 {
            return Err(UpdaterError::Configuration(
                "update queue capacity must be positive".to_string(),
            ));
        }

        for filter in &self.prefix_filters {
            IpNetwork::from_str(filter).map_err(|e| {
                UpdaterError::Configuration(format!("invalid prefix filter '{}': {}", filter, e))
            })?;
        }

        Ok(())
    }

    /// Read the GoBGP certificate files. Done once at startup.
    pub fn load_tls(&self) -> Result<Option<TlsClientConfig>> {
        let Some(paths) = &self.gobgp_tls else {
            return Ok(None);
        };

        let tls = TlsClientConfig::load(
            &paths.ca_cert,
            paths.client_cert.as_deref(),
            paths.client_key.as_deref(),
        )
        .map_err(|e| UpdaterError::Configuration(e.to_string()))?;

        info!(
            "Loaded GoBGP TLS material from {} (mutual: {})",
            paths.ca_cert.display(),
            tls.is_mutual()
        );
        Ok(Some(tls))
    }
}
