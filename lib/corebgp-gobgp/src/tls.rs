//! mTLS material for the GoBGP gRPC connection

use crate::{AdapterError, Result};
use std::path::Path;
use tonic::transport::{Certificate, ClientTlsConfig, Identity};
use tracing::debug;

/// PEM material for outbound TLS to the speaker
#[derive(Clone, Debug, PartialEq)]
pub struct TlsClientConfig {
    /// PEM-encoded CA certificate used to verify the speaker
    pub ca_cert_pem: Vec<u8>,
    /// PEM-encoded client certificate
    pub cert_pem: Option<Vec<u8>>,
    /// PEM-encoded client private key
    pub key_pem: Option<Vec<u8>>,
}

impl TlsClientConfig {
    /// Read the CA and, when both are given, the client certificate and key
    pub fn load(ca_path: &Path, cert_path: Option<&Path>, key_path: Option<&Path>) -> Result<Self> {
        let ca_cert_pem = read_pem(ca_path)?;
        let (cert_pem, key_pem) = match (cert_path, key_path) {
            (Some(cert), Some(key)) => (Some(read_pem(cert)?), Some(read_pem(key)?)),
            _ => (None, None),
        };

        debug!(
            "Loaded GoBGP TLS material (client identity: {})",
            cert_pem.is_some()
        );

        Ok(Self {
            ca_cert_pem,
            cert_pem,
            key_pem,
        })
    }

    /// Whether a client identity is presented to the speaker
    pub fn is_mutual(&self) -> bool {
        self.cert_pem.is_some() && self.key_pem.is_some()
    }

    pub fn to_tonic(&self) -> ClientTlsConfig {
        let mut config = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(&self.ca_cert_pem));
        if let (Some(cert), Some(key)) = (&self.cert_pem, &self.key_pem) {
            config = config.identity(Identity::from_pem(cert, key));
        }
        config
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| AdapterError::Credentials {
        path: path.to_path_buf(),
        source,
    })
}
