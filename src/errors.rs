//! Errors surfaced by the `fieldscope` facade and configuration loader.

use std::path::PathBuf;

use action_locator::LocatorError;
use cdp_adapter::ProbeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FieldScopeError {
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {key}: {reason}")]
    InvalidOverride { key: &'static str, reason: String },

    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error(transparent)]
    Probe(#[from] ProbeError),
}

pub type FieldScopeResult<T> = Result<T, FieldScopeError>;
