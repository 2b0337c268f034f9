//! Pattern-driven resolution: library templates tried in order inside a scroll-and-retry loop.

use std::sync::Arc;
use std::time::Duration;

use cdp_adapter::PageProbe;
use fieldscope_core_types::{
    has_trailing_index, ElementHandle, FieldDescriptor, LocatorCandidate, SelectorKind,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::chain::{ChainEvaluator, ChainQuery};
use crate::context::LocatorContext;
use crate::errors::LocatorError;
use crate::templates::{PatternLibrary, TemplateStore};

/// Field types whose templates run after a label pass that may discover a `for` id.
const LABEL_ELIGIBLE: [&str; 3] = ["input", "select", "textarea"];
const LABEL_FIELD_TYPE: &str = "label";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Library used when a call does not name one.
    pub default_library: Option<String>,
    pub timeout_ms: u64,
    pub interval_ms: u64,
    /// Wheel events per scroll cycle.
    pub scroll_steps: u32,
    pub scroll_delta: f64,
    pub scroll_pause_ms: u64,
    pub require_visible: bool,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            default_library: None,
            timeout_ms: 30_000,
            interval_ms: 2_000,
            scroll_steps: 10,
            scroll_delta: 400.0,
            scroll_pause_ms: 500,
            require_visible: true,
        }
    }
}

pub struct PatternResolver {
    store: Arc<TemplateStore>,
    evaluator: ChainEvaluator,
    config: PatternConfig,
}

impl PatternResolver {
    pub fn new(store: Arc<TemplateStore>, probe: Arc<dyn PageProbe>, config: PatternConfig) -> Self {
        let evaluator = ChainEvaluator::new(probe).with_require_visible(config.require_visible);
        Self {
            store,
            evaluator,
            config,
        }
    }

    pub fn evaluator(&self) -> &ChainEvaluator {
        &self.evaluator
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    /// Resolve `field` of `element_type` against the live page.
    ///
    /// Running out of time is not an error: the empty handle comes back and callers check it
    /// before acting.
    pub async fn resolve(
        &self,
        element_type: &str,
        field: &str,
        override_library: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<ElementHandle, LocatorError> {
        let element_type = element_type.trim();
        let descriptor = FieldDescriptor::parse(field)?;
        let library = self.library(override_library)?;

        let field_templates = library.templates(element_type);
        if field_templates.is_empty() {
            warn!(element_type, field, "no templates for field type");
            return Ok(ElementHandle::empty());
        }
        let label_templates: &[String] = if LABEL_ELIGIBLE.contains(&element_type) {
            library.templates(LABEL_FIELD_TYPE)
        } else {
            &[]
        };

        let mut ctx = LocatorContext::new(descriptor);
        let location = scope_selector(&ctx, &ctx.descriptor().location_name, |name| {
            library.location(name)
        });
        let section = scope_selector(&ctx, &ctx.descriptor().section_name, |name| {
            library.section(name)
        });

        let timeout = timeout.unwrap_or(Duration::from_millis(self.config.timeout_ms));
        let interval = Duration::from_millis(self.config.interval_ms);
        let started = Instant::now();
        let probe = self.evaluator.probe();

        while started.elapsed() < timeout {
            if ctx.for_id().is_none() {
                for template in label_templates {
                    let candidate = with_instance(&ctx, ctx.substitute(template));
                    let query = chain_query(&ctx, &location, &section, &candidate, true);
                    match self.evaluator.evaluate(&query).await {
                        Ok(Some(found)) => {
                            if let Some(id) = found.for_attr {
                                debug!(label = %candidate, for_id = %id, "label association found");
                                ctx.set_for_id(id);
                                // first captured `for` id wins
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(err) if err.is_page_closed() => {
                            warn!(element_type, field, "page closed while resolving");
                            return Ok(ElementHandle::empty());
                        }
                        Err(err) => debug!(label = %candidate, %err, "label candidate failed"),
                    }
                }
            }

            for template in field_templates {
                let candidate = with_instance(&ctx, ctx.substitute(template));
                let query = chain_query(&ctx, &location, &section, &candidate, false);
                match self.evaluator.evaluate(&query).await {
                    Ok(Some(found)) => {
                        let handle = handle_for(&found.chain, ctx.descriptor().instance);
                        info!(element_type, field, handle = %handle, "locator resolved");
                        return Ok(handle);
                    }
                    Ok(None) => trace!(candidate = %candidate, "no visible match"),
                    Err(err) if err.is_page_closed() => {
                        warn!(element_type, field, "page closed while resolving");
                        return Ok(ElementHandle::empty());
                    }
                    Err(err) => warn!(candidate = %candidate, %err, "locator candidate failed"),
                }
            }

            if probe.is_closed() {
                warn!(element_type, field, "page closed while resolving");
                return Ok(ElementHandle::empty());
            }
            self.scroll(&library, &ctx).await;
            debug!(interval_ms = interval.as_millis() as u64, "locator not found, retrying");
            probe.wait_for_timeout(interval).await;
        }

        warn!(
            element_type,
            field,
            timeout_ms = timeout.as_millis() as u64,
            "no valid locator found before timeout"
        );
        Ok(ElementHandle::empty())
    }

    fn library(&self, override_library: Option<&str>) -> Result<Arc<PatternLibrary>, LocatorError> {
        let name = override_library
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .or(self.config.default_library.as_deref())
            .ok_or(LocatorError::PatternLibraryMissing)?;
        self.store
            .get(name)
            .ok_or_else(|| LocatorError::UnknownPatternLibrary(name.to_string()))
    }

    /// Reveal lazily rendered content: wheel through every visible scroll target, or the page
    /// itself when the library declares none.
    async fn scroll(&self, library: &PatternLibrary, ctx: &LocatorContext) {
        if library.scroll.is_empty() {
            self.wheel_cycle().await;
            return;
        }

        let probe = self.evaluator.probe();
        for selector in library.scroll.as_slice() {
            let target = LocatorCandidate::new(ctx.substitute(selector));
            let count = match probe.count(&target).await {
                Ok(count) => count,
                Err(err) => {
                    debug!(target = %target, %err, "scroll target query failed");
                    continue;
                }
            };
            for index in 0..count {
                if !matches!(probe.is_visible(&target, index).await, Ok(true)) {
                    continue;
                }
                debug!(target = %target, index, "scrolling within target");
                if let Err(err) = probe.scroll_into_view(&target, index).await {
                    debug!(target = %target, %err, "scroll into view failed");
                }
                self.wheel_cycle().await;
            }
        }
    }

    async fn wheel_cycle(&self) {
        let probe = self.evaluator.probe();
        let pause = Duration::from_millis(self.config.scroll_pause_ms);
        for _ in 0..self.config.scroll_steps {
            if let Err(err) = probe.scroll_by(0.0, self.config.scroll_delta).await {
                debug!(%err, "wheel scroll failed");
                break;
            }
            probe.wait_for_timeout(pause).await;
        }
    }
}

fn scope_selector<'l>(
    ctx: &LocatorContext,
    name: &str,
    lookup: impl Fn(&str) -> Option<&'l str>,
) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    match lookup(name) {
        Some(selector) => Some(ctx.substitute(selector)),
        None => {
            debug!(scope = name, "scope not declared in pattern library");
            None
        }
    }
}

/// Wrap an unscoped XPath as `(xpath)[instance]` unless it already starts with `(`.
fn with_instance(ctx: &LocatorContext, candidate: String) -> String {
    let candidate = candidate.trim().to_string();
    if SelectorKind::infer(&candidate) == SelectorKind::XPath
        && !ctx.is_scoped()
        && !candidate.starts_with('(')
    {
        format!("({candidate})[{}]", ctx.descriptor().instance)
    } else {
        candidate
    }
}

fn chain_query<'a>(
    ctx: &LocatorContext,
    location: &'a Option<String>,
    section: &'a Option<String>,
    candidate: &'a str,
    capture_for: bool,
) -> ChainQuery<'a> {
    ChainQuery {
        location: location.as_deref(),
        section: section.as_deref(),
        field: candidate,
        index: field_index(candidate, ctx.descriptor().instance),
        capture_for,
    }
}

/// Candidates that pin an index themselves are taken as-is; others select the instance.
fn field_index(candidate: &str, instance: usize) -> usize {
    if has_trailing_index(candidate) {
        0
    } else {
        instance.saturating_sub(1)
    }
}

fn handle_for(chain: &str, instance: usize) -> ElementHandle {
    let handle = ElementHandle::from_chain(chain);
    if has_trailing_index(chain) {
        handle
    } else {
        handle.with_nth(instance.saturating_sub(1))
    }
}
