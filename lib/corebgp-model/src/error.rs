use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid announced prefix {value:?}: {source}")]
    InvalidPrefix {
        value: String,
        #[source]
        source: ipnetwork::IpNetworkError,
    },

    #[error("Announcement {0} has no announced address")]
    MissingPrefix(String),

    #[error("Malformed watch event: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Watch event {0} carries no announcement")]
    EmptyEvent(&'static str),
}
