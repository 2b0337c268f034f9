//! Diagnostic side channel: every extracted snapshot written as pretty JSON.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use crate::errors::PerceiverError;
use crate::model::Snapshot;

#[derive(Clone, Debug)]
pub struct SnapshotArchive {
    dir: PathBuf,
}

impl SnapshotArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `snapshot` to `<dir>/snapshot-<unix-millis>.json`, returning the path.
    pub fn store(&self, snapshot: &Snapshot) -> Result<PathBuf, PerceiverError> {
        fs::create_dir_all(&self.dir).map_err(|err| PerceiverError::archive(&self.dir, err))?;

        let millis = snapshot
            .captured_at
            .unwrap_or_else(Utc::now)
            .timestamp_millis();
        let mut path = self.dir.join(format!("snapshot-{millis}.json"));
        let mut suffix = 1;
        while path.exists() {
            path = self.dir.join(format!("snapshot-{millis}-{suffix}.json"));
            suffix += 1;
        }

        let body = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, body).map_err(|err| PerceiverError::archive(&path, err))?;
        debug!(path = %path.display(), elements = snapshot.len(), "snapshot archived");
        Ok(path)
    }

    /// Load an archived snapshot (either layout accepted by [`Snapshot::from_json_str`]).
    pub fn load(path: impl AsRef<Path>) -> Result<Snapshot, PerceiverError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| PerceiverError::archive(path, err))?;
        Snapshot::from_json_str(&raw)
    }
}
