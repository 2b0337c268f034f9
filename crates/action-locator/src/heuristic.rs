//! Snapshot-driven resolution: rank extracted records, pick the requested instance and verify
//! that its computed selector still points at exactly one node.

use std::path::PathBuf;
use std::sync::Arc;

use cdp_adapter::PageProbe;
use fieldscope_core_types::{ElementHandle, FieldDescriptor, LocatorCandidate};
use perceiver_structural::{
    refresh_required, ElementRecord, RefreshPolicy, ResolveMode, Snapshot, SnapshotArchive,
    SnapshotCache, SnapshotExtractor,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::LocatorError;
use crate::rules::{rank, Category, RuleMatch, RuleQuery};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    pub mode: ResolveMode,
    /// Log every ranked match at info level.
    pub verbose: bool,
    /// Write every extracted snapshot here when set.
    pub archive_dir: Option<PathBuf>,
    /// In smart mode, also re-extract when the page URL no longer matches the cached snapshot.
    pub invalidate_on_url_change: bool,
}

/// Pick the `instance`-th (1-based) ranked match.
pub fn select_instance<'r, 'a>(
    ranked: &'r [RuleMatch<'a>],
    instance: usize,
    selector: &str,
) -> Result<&'r RuleMatch<'a>, LocatorError> {
    if ranked.is_empty() {
        return Err(LocatorError::NotFound(selector.to_string()));
    }
    ranked
        .get(instance.max(1) - 1)
        .ok_or(LocatorError::AmbiguousInstance {
            instance,
            found: ranked.len(),
        })
}

/// Resolver bound to one page. The snapshot cache lives and dies with it.
pub struct HeuristicResolver {
    probe: Arc<dyn PageProbe>,
    extractor: Arc<dyn SnapshotExtractor>,
    cache: SnapshotCache,
    archive: Option<SnapshotArchive>,
    config: HeuristicConfig,
}

impl HeuristicResolver {
    pub fn new(
        probe: Arc<dyn PageProbe>,
        extractor: Arc<dyn SnapshotExtractor>,
        config: HeuristicConfig,
    ) -> Self {
        let archive = config.archive_dir.clone().map(SnapshotArchive::new);
        Self {
            probe,
            extractor,
            cache: SnapshotCache::new(),
            archive,
            config,
        }
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn config(&self) -> &HeuristicConfig {
        &self.config
    }

    /// Drop the cached snapshot so the next call extracts again.
    pub fn reset(&self) {
        self.cache.clear();
    }

    pub async fn resolve(
        &self,
        element_type: &str,
        selector: &str,
        refresh: RefreshPolicy,
    ) -> Result<ElementHandle, LocatorError> {
        let outcome = self.resolve_uncached(element_type, selector, refresh).await;
        if refresh == RefreshPolicy::After {
            debug!(selector, "clearing snapshot cache after resolution");
            self.cache.clear();
        }
        outcome
    }

    async fn resolve_uncached(
        &self,
        element_type: &str,
        selector: &str,
        refresh: RefreshPolicy,
    ) -> Result<ElementHandle, LocatorError> {
        let category: Category = element_type.parse()?;
        let descriptor = FieldDescriptor::parse(selector)?;
        let snapshot = self.snapshot(refresh).await;

        let query = RuleQuery::new(&descriptor.field_name, descriptor.section_scope());
        let ranked = rank(&snapshot, category, &query);
        if self.config.verbose {
            info!(selector, category = %category, count = ranked.len(), "ranked matches");
            for (position, found) in ranked.iter().enumerate() {
                info!(
                    position = position + 1,
                    priority = found.priority,
                    rule = found.description,
                    css = %found.record.css_selector,
                    text = %found.record.visible_text,
                    label = %found.record.label,
                    "match"
                );
            }
        }

        let target = select_instance(&ranked, descriptor.instance, selector)?;
        debug!(
            selector,
            instance = descriptor.instance,
            rule = target.description,
            dom_index = target.record.dom_index,
            "heuristic target selected"
        );
        self.verify(target.record).await
    }

    async fn snapshot(&self, refresh: RefreshPolicy) -> Arc<Snapshot> {
        let cached = self.cache.get();
        let current_url = match &cached {
            Some(snapshot)
                if self.config.invalidate_on_url_change
                    && self.config.mode == ResolveMode::Smart
                    && !snapshot.is_empty() =>
            {
                self.probe.url().await.ok()
            }
            _ => None,
        };

        let stale = refresh_required(
            refresh,
            self.config.mode,
            cached.as_deref(),
            current_url.as_deref(),
            self.config.invalidate_on_url_change,
        );
        match cached {
            Some(snapshot) if !stale => snapshot,
            _ => {
                debug!(mode = %self.config.mode, ?refresh, "extracting snapshot");
                let snapshot = self.extractor.extract(self.probe.as_ref()).await;
                if let Some(archive) = &self.archive {
                    if let Err(err) = archive.store(&snapshot) {
                        warn!(%err, "failed to archive snapshot");
                    }
                }
                self.cache.replace(snapshot)
            }
        }
    }

    /// Accept the CSS selector when it matches exactly one node, else the XPath.
    async fn verify(&self, record: &ElementRecord) -> Result<ElementHandle, LocatorError> {
        let candidates = [
            (!record.css_selector.is_empty()).then(|| LocatorCandidate::css(&record.css_selector)),
            (!record.xpath_selector.is_empty())
                .then(|| LocatorCandidate::xpath(&record.xpath_selector)),
        ];
        for candidate in candidates.into_iter().flatten() {
            match self.probe.count(&candidate).await {
                Ok(1) => {
                    info!(selector = %candidate, "heuristic locator verified");
                    return Ok(ElementHandle::from_candidate(candidate));
                }
                Ok(count) => debug!(selector = %candidate, count, "selector is not unique"),
                Err(err) if err.is_page_closed() => return Err(err.into()),
                Err(err) => debug!(selector = %candidate, %err, "selector rejected"),
            }
        }
        Err(LocatorError::NonUniqueSelector {
            css: record.css_selector.clone(),
            xpath: record.xpath_selector.clone(),
        })
    }
}
