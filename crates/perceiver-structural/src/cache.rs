use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::model::Snapshot;

/// Per-call instruction for the snapshot cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPolicy {
    /// Follow the cache mode.
    #[default]
    None,
    /// Re-extract before resolving.
    Before,
    /// Drop the cache once the call finishes.
    After,
}

impl FromStr for RefreshPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(RefreshPolicy::None),
            "before" => Ok(RefreshPolicy::Before),
            "after" => Ok(RefreshPolicy::After),
            other => Err(format!("unknown refresh policy '{other}'")),
        }
    }
}

/// Process-wide cache mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMode {
    /// Extract only when nothing is cached.
    #[default]
    Smart,
    /// Extract on every lookup.
    Always,
}

impl FromStr for ResolveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smart" => Ok(ResolveMode::Smart),
            "always" => Ok(ResolveMode::Always),
            other => Err(format!("unknown resolve mode '{other}'")),
        }
    }
}

impl fmt::Display for ResolveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveMode::Smart => f.write_str("smart"),
            ResolveMode::Always => f.write_str("always"),
        }
    }
}

/// Decide whether a fresh snapshot is required.
///
/// `current_url` is only consulted when `invalidate_on_url_change` is set and the mode is
/// [`ResolveMode::Smart`].
pub fn refresh_required(
    refresh: RefreshPolicy,
    mode: ResolveMode,
    cached: Option<&Snapshot>,
    current_url: Option<&str>,
    invalidate_on_url_change: bool,
) -> bool {
    if refresh == RefreshPolicy::Before || mode == ResolveMode::Always {
        return true;
    }
    let Some(snapshot) = cached.filter(|snapshot| !snapshot.is_empty()) else {
        return true;
    };
    match current_url {
        Some(url) if invalidate_on_url_change => url != snapshot.url,
        _ => false,
    }
}

/// Holds the most recent snapshot for one page. Snapshots are replaced whole, never patched.
#[derive(Default)]
pub struct SnapshotCache {
    slot: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<Snapshot>> {
        self.slot.read().clone()
    }

    pub fn replace(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        *self.slot.write() = Some(snapshot.clone());
        snapshot
    }

    pub fn clear(&self) {
        self.slot.write().take();
    }

    /// Empty when nothing was cached or the cached snapshot has no records.
    pub fn is_empty(&self) -> bool {
        self.slot
            .read()
            .as_ref()
            .map_or(true, |snapshot| snapshot.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ElementRecord;

    fn populated(url: &str) -> Snapshot {
        Snapshot::new(url, vec![ElementRecord::default()])
    }

    #[test]
    fn before_and_always_force_refresh() {
        let cached = populated("https://a.test/");
        assert!(refresh_required(
            RefreshPolicy::Before,
            ResolveMode::Smart,
            Some(&cached),
            None,
            false
        ));
        assert!(refresh_required(
            RefreshPolicy::None,
            ResolveMode::Always,
            Some(&cached),
            None,
            false
        ));
    }

    #[test]
    fn smart_mode_refreshes_only_when_empty() {
        let cached = populated("https://a.test/");
        assert!(refresh_required(
            RefreshPolicy::None,
            ResolveMode::Smart,
            None,
            None,
            false
        ));
        assert!(refresh_required(
            RefreshPolicy::After,
            ResolveMode::Smart,
            Some(&Snapshot::empty()),
            None,
            false
        ));
        assert!(!refresh_required(
            RefreshPolicy::After,
            ResolveMode::Smart,
            Some(&cached),
            Some("https://b.test/"),
            false
        ));
    }

    #[test]
    fn url_change_invalidates_when_enabled() {
        let cached = populated("https://a.test/");
        assert!(refresh_required(
            RefreshPolicy::None,
            ResolveMode::Smart,
            Some(&cached),
            Some("https://b.test/"),
            true
        ));
        assert!(!refresh_required(
            RefreshPolicy::None,
            ResolveMode::Smart,
            Some(&cached),
            Some("https://a.test/"),
            true
        ));
    }

    #[test]
    fn cache_replaces_and_clears_whole_snapshots() {
        let cache = SnapshotCache::new();
        assert!(cache.is_empty());

        let first = cache.replace(populated("https://a.test/"));
        let held = cache.get().unwrap();
        assert!(Arc::ptr_eq(&first, &held));
        assert!(!cache.is_empty());

        cache.replace(populated("https://b.test/"));
        assert_eq!(held.url, "https://a.test/");
        assert_eq!(cache.get().unwrap().url, "https://b.test/");

        cache.clear();
        assert!(cache.get().is_none());
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("Before".parse::<RefreshPolicy>(), Ok(RefreshPolicy::Before));
        assert_eq!("".parse::<RefreshPolicy>(), Ok(RefreshPolicy::None));
        assert!("later".parse::<RefreshPolicy>().is_err());
        assert_eq!("ALWAYS".parse::<ResolveMode>(), Ok(ResolveMode::Always));
    }
}
