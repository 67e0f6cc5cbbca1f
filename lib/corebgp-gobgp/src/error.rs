use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AdapterError>;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Invalid GoBGP endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("Failed to read {path}: {source}")]
    Credentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("GoBGP rejected {op}: {status}")]
    Rpc {
        op: &'static str,
        #[source]
        status: Box<tonic::Status>,
    },

    #[error("GoBGP {op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("Failed to decode {kind}: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: prost::DecodeError,
    },

    #[error("Invalid prefix {0:?}")]
    InvalidPrefix(String),

    #[error("Paths in one AddPaths call must share a prefix, got {0} and {1}")]
    MixedPrefixes(String, String),
}

impl AdapterError {
    pub(crate) fn rpc(op: &'static str, status: tonic::Status) -> Self {
        AdapterError::Rpc {
            op,
            status: Box::new(status),
        }
    }
}
