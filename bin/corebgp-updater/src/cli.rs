//! Command line and config file handling
//!
//! Settings resolve in order: built-in defaults, then the YAML file given by
//! `--config`, then flags and their environment variables.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use corebgp_updater::{ReconcileMode, TlsPaths, UpdaterConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    Text,
    /// One JSON object per event
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "corebgp-updater")]
#[command(version, about = "Keeps GoBGP routes in sync with CoreBGP announcements", long_about = None)]
pub struct Args {
    /// YAML config file
    #[arg(long, env = "COREBGP_CONFIG")]
    pub config: Option<PathBuf>,

    /// CoreBGP API base URL
    #[arg(long, env = "COREBGP_API_ENDPOINT")]
    pub api_endpoint: Option<String>,

    /// GoBGP gRPC address (host:port)
    #[arg(long, env = "COREBGP_GOBGP_ENDPOINT")]
    pub gobgp_endpoint: Option<String>,

    /// CA certificate for the GoBGP connection. Enables TLS.
    #[arg(long, env = "COREBGP_GOBGP_CA_CERT")]
    pub gobgp_ca_cert: Option<PathBuf>,

    /// Client certificate for mutual TLS with GoBGP
    #[arg(long, env = "COREBGP_GOBGP_CLIENT_CERT")]
    pub gobgp_client_cert: Option<PathBuf>,

    /// Client private key for mutual TLS with GoBGP
    #[arg(long, env = "COREBGP_GOBGP_CLIENT_KEY")]
    pub gobgp_client_key: Option<PathBuf>,

    /// Snapshot comparison: key-only or strict
    #[arg(long, env = "COREBGP_RECONCILE_MODE")]
    pub reconcile_mode: Option<ReconcileMode>,

    /// Seconds between connectivity probes
    #[arg(long)]
    pub probe_interval: Option<u64>,

    /// Seconds to wait before starting a new session
    #[arg(long)]
    pub retry_interval: Option<u64>,

    /// Append logs to this file instead of stderr
    #[arg(long, env = "COREBGP_LOG_PATH")]
    pub log_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Increase verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct TlsFile {
    ca_cert: Option<PathBuf>,
    client_cert: Option<PathBuf>,
    client_key: Option<PathBuf>,
}

/// Config file layout. Every key is optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ConfigFile {
    api_endpoint: Option<String>,
    gobgp_endpoint: Option<String>,
    gobgp_tls: Option<TlsFile>,
    probe_interval_secs: Option<u64>,
    retry_interval_secs: Option<u64>,
    api_timeout_secs: Option<u64>,
    add_timeout_secs: Option<u64>,
    delete_timeout_secs: Option<u64>,
    list_timeout_secs: Option<u64>,
    probe_timeout_secs: Option<u64>,
    reconcile_mode: Option<ReconcileMode>,
    prefix_filters: Option<Vec<String>>,
    update_queue_capacity: Option<usize>,
}

impl ConfigFile {
    fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn apply(self, config: &mut UpdaterConfig) {
        let secs = Duration::from_secs;

        if let Some(v) = self.api_endpoint {
            config.api_endpoint = v;
        }
        if let Some(v) = self.gobgp_endpoint {
            config.gobgp_endpoint = v;
        }
        if let Some(v) = self.probe_interval_secs {
            config.probe_interval = secs(v);
        }
        if let Some(v) = self.retry_interval_secs {
            config.retry_interval = secs(v);
        }
        if let Some(v) = self.api_timeout_secs {
            config.api_timeout = secs(v);
        }
        if let Some(v) = self.add_timeout_secs {
            config.call_timeouts.add = secs(v);
        }
        if let Some(v) = self.delete_timeout_secs {
            config.call_timeouts.delete = secs(v);
        }
        if let Some(v) = self.list_timeout_secs {
            config.call_timeouts.list = secs(v);
        }
        if let Some(v) = self.probe_timeout_secs {
            config.call_timeouts.probe = secs(v);
        }
        if let Some(v) = self.reconcile_mode {
            config.reconcile_mode = v;
        }
        if let Some(v) = self.prefix_filters {
            config.prefix_filters = v;
        }
        if let Some(v) = self.update_queue_capacity {
            config.update_queue_capacity = v;
        }
    }
}

impl Args {
    /// Resolve the effective configuration
    pub fn resolve(&self) -> Result<UpdaterConfig> {
        let mut config = UpdaterConfig::default();
        let mut tls = TlsFile::default();

        if let Some(path) = &self.config {
            let mut file = ConfigFile::load(path)?;
            if let Some(file_tls) = file.gobgp_tls.take() {
                tls = file_tls;
            }
            file.apply(&mut config);
        }

        if let Some(v) = &self.api_endpoint {
            config.api_endpoint = v.clone();
        }
        if let Some(v) = &self.gobgp_endpoint {
            config.gobgp_endpoint = v.clone();
        }
        if let Some(v) = self.reconcile_mode {
            config.reconcile_mode = v;
        }
        if let Some(v) = self.probe_interval {
            config.probe_interval = Duration::from_secs(v);
        }
        if let Some(v) = self.retry_interval {
            config.retry_interval = Duration::from_secs(v);
        }

        tls.ca_cert = self.gobgp_ca_cert.clone().or(tls.ca_cert);
        tls.client_cert = self.gobgp_client_cert.clone().or(tls.client_cert);
        tls.client_key = self.gobgp_client_key.clone().or(tls.client_key);

        config.gobgp_tls = match tls {
            TlsFile {
                ca_cert: Some(ca_cert),
                client_cert,
                client_key,
            } => Some(TlsPaths {
                ca_cert,
                client_cert,
                client_key,
            }),
            TlsFile {
                ca_cert: None,
                client_cert: None,
                client_key: None,
            } => None,
            _ => bail!("GoBGP client certificate and key require --gobgp-ca-cert"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Level used when RUST_LOG is unset
    pub fn default_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("corebgp-updater").chain(args.iter().copied())).unwrap()
    }

    fn write_config(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("corebgp-{}-{}.yaml", name, std::process::id()));
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        let config = args.resolve().unwrap();

        assert_eq!(config, UpdaterConfig::default());
        assert_eq!(args.default_level(), "info");
        assert_eq!(args.log_format, LogFormat::Text);
    }

    #[test]
    fn test_flags_override_file() {
        let path = write_config(
            "override",
            "api-endpoint: http://file:8080\n\
             gobgp-endpoint: 10.0.0.1:50051\n\
             retry-interval-secs: 30\n\
             reconcile-mode: strict\n\
             prefix-filters: [\"10.0.0.0/8\"]\n",
        );
        let args = parse(&[
            "--config",
            path.to_str().unwrap(),
            "--api-endpoint",
            "https://flag:8443",
            "-vv",
        ]);

        let config = args.resolve().unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.api_endpoint, "https://flag:8443");
        assert_eq!(config.gobgp_endpoint, "10.0.0.1:50051");
        assert_eq!(config.retry_interval, Duration::from_secs(30));
        assert_eq!(config.reconcile_mode, ReconcileMode::Strict);
        assert_eq!(config.prefix_filters, vec!["10.0.0.0/8".to_string()]);
        assert_eq!(args.default_level(), "trace");
    }

    #[test]
    fn test_tls_paths_from_flags() {
        let args = parse(&[
            "--gobgp-ca-cert",
            "/etc/corebgp/ca.pem",
            "--gobgp-client-cert",
            "/etc/corebgp/cert.pem",
            "--gobgp-client-key",
            "/etc/corebgp/key.pem",
        ]);

        let tls = args.resolve().unwrap().gobgp_tls.unwrap();
        assert_eq!(tls.ca_cert, PathBuf::from("/etc/corebgp/ca.pem"));
        assert_eq!(tls.client_key, Some(PathBuf::from("/etc/corebgp/key.pem")));
    }

    #[test]
    fn test_client_identity_without_ca_is_rejected() {
        let args = parse(&["--gobgp-client-cert", "cert.pem", "--gobgp-client-key", "key.pem"]);
        assert!(args.resolve().is_err());
    }

    #[test]
    fn test_unknown_config_key_is_rejected() {
        let path = write_config("unknown", "api-endpoit: http://typo\n");
        let result = parse(&["--config", path.to_str().unwrap()]).resolve();
        std::fs::remove_file(&path).ok();

        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        assert!(parse(&["--api-endpoint", "localhost:8080"]).resolve().is_err());
    }
}
