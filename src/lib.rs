//! fieldscope library
//!
//! [`FieldScope`] is the caller-facing entry point: one page probe, a pattern resolver over the
//! loaded template libraries and a heuristic resolver with its own snapshot cache.

pub mod config;
pub mod errors;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use action_locator::{HeuristicResolver, LocatorError, PatternResolver, TemplateStore};
use cdp_adapter::PageProbe;
use perceiver_structural::{ScriptSnapshotExtractor, SnapshotExtractor};
use tracing::info;

pub use action_locator::{Category, HeuristicConfig, PatternConfig};
pub use config::{Config, PatternSettings};
pub use errors::{FieldScopeError, FieldScopeResult};
pub use fieldscope_core_types::{ElementHandle, FieldDescriptor, LocatorCandidate};
pub use perceiver_structural::{RefreshPolicy, ResolveMode};

/// Load every configured library file or directory into one store.
pub fn load_libraries(paths: &[PathBuf]) -> Result<TemplateStore, LocatorError> {
    let mut store = TemplateStore::new();
    for path in paths {
        let names = store.load_path(path)?;
        info!(path = %path.display(), libraries = ?names, "pattern libraries loaded");
    }
    Ok(store)
}

/// Both resolvers bound to one page.
pub struct FieldScope {
    probe: Arc<dyn PageProbe>,
    pattern: PatternResolver,
    heuristic: HeuristicResolver,
}

impl FieldScope {
    pub fn new(probe: Arc<dyn PageProbe>, store: Arc<TemplateStore>, config: &Config) -> Self {
        let extractor: Arc<dyn SnapshotExtractor> =
            Arc::new(ScriptSnapshotExtractor::new(config.extractor.clone()));
        Self {
            pattern: PatternResolver::new(store, probe.clone(), config.pattern.resolver.clone()),
            heuristic: HeuristicResolver::new(probe.clone(), extractor, config.heuristic.clone()),
            probe,
        }
    }

    /// Build from configuration, loading the libraries it lists.
    pub fn from_config(probe: Arc<dyn PageProbe>, config: &Config) -> FieldScopeResult<Self> {
        let store = load_libraries(&config.pattern.libraries)?;
        Ok(Self::new(probe, Arc::new(store), config))
    }

    pub fn probe(&self) -> &Arc<dyn PageProbe> {
        &self.probe
    }

    pub fn pattern(&self) -> &PatternResolver {
        &self.pattern
    }

    pub fn heuristic(&self) -> &HeuristicResolver {
        &self.heuristic
    }

    /// Resolve through the pattern libraries. An empty handle means nothing matched in time.
    pub async fn resolve_pattern(
        &self,
        element_type: &str,
        field: &str,
        override_library: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<ElementHandle, LocatorError> {
        self.pattern
            .resolve(element_type, field, override_library, timeout)
            .await
    }

    /// Resolve by ranking a DOM snapshot.
    pub async fn resolve_heuristic(
        &self,
        element_type: &str,
        selector: &str,
        refresh: RefreshPolicy,
    ) -> Result<ElementHandle, LocatorError> {
        self.heuristic.resolve(element_type, selector, refresh).await
    }

    /// Whether `handle` currently matches an element on the page.
    pub async fn exists(&self, handle: &ElementHandle) -> Result<bool, LocatorError> {
        Ok(self.pattern.evaluator().exists(handle).await?)
    }

    /// Forget the cached snapshot, for example after navigating.
    pub fn reset_snapshot(&self) {
        self.heuristic.reset();
    }
}
