//! Structural view of a live page: the snapshot extractor, the per-page snapshot cache and the
//! optional on-disk archive of extracted snapshots.

pub mod archive;
pub mod cache;
pub mod errors;
pub mod extractor;
pub mod model;

pub use archive::SnapshotArchive;
pub use cache::{refresh_required, RefreshPolicy, ResolveMode, SnapshotCache};
pub use errors::PerceiverError;
pub use extractor::{ExtractorConfig, HiddenPolicy, ScriptSnapshotExtractor, SnapshotExtractor};
pub use model::{ElementRecord, LabelDetection, Snapshot};
