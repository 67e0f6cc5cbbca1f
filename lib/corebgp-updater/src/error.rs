use corebgp_model::UpdateType;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, UpdaterError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Which backend an error concerns
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Api,
    Speaker,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Api => f.write_str("CoreBGP API"),
            Backend::Speaker => f.write_str("GoBGP"),
        }
    }
}

#[derive(Error, Debug)]
pub enum UpdaterError {
    /// Bad settings or credentials. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Probe or dial failure. Ends the session.
    #[error("{backend} is unreachable: {source}")]
    Connectivity {
        backend: Backend,
        #[source]
        source: BoxError,
    },

    /// A snapshot side could not be fetched. Aborts the reconciliation pass.
    #[error("Failed to fetch routes from {backend}: {source}")]
    Fetch {
        backend: Backend,
        #[source]
        source: BoxError,
    },

    /// One install or withdraw failed. Logged, processing continues.
    #[error("Failed to apply {kind} update for {route}: {source}")]
    Apply {
        kind: UpdateType,
        route: String,
        #[source]
        source: corebgp_gobgp::AdapterError,
    },

    #[error("{backend} did not answer within {after:?}")]
    Timeout {
        backend: Backend,
        after: std::time::Duration,
    },
}

impl UpdaterError {
    pub fn connectivity(backend: Backend, source: impl Into<BoxError>) -> Self {
        UpdaterError::Connectivity {
            backend,
            source: source.into(),
        }
    }

    pub fn fetch(backend: Backend, source: impl Into<BoxError>) -> Self {
        UpdaterError::Fetch {
            backend,
            source: source.into(),
        }
    }

    /// Errors that must stop the process instead of restarting the session
    pub fn is_fatal(&self) -> bool {
        matches!(self, UpdaterError::Configuration(_))
    }
}
