//! Crate-wide error types.

use thiserror::Error;

pub type ProflensResult<T> = Result<T, ProflensError>;

#[derive(Debug, Error)]
pub enum ProflensError {
    #[error("unresolvable metric: {0}")]
    UnresolvableMetric(String),

    #[error("invalid value index {index} for profile with {len} sample types")]
    InvalidIndex { index: usize, len: usize },

    #[error("missing basis metric: {0}")]
    MissingBasisMetric(String),

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("unsupported profile type: {0}")]
    UnsupportedProfileType(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
