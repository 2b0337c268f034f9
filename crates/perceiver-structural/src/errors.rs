use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PerceiverError {
    #[error("snapshot archive i/o failed for {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot could not be decoded: {0}")]
    Decode(String),
}

impl PerceiverError {
    pub fn archive(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Archive {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for PerceiverError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
