//! Location → section → field chain evaluation inside the page.

use std::sync::Arc;

use cdp_adapter::probe::script_call;
use cdp_adapter::{PageProbe, ProbeError, ProbeErrorKind};
use fieldscope_core_types::{ElementHandle, LoadState};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

const CHAIN_QUERY_SCRIPT: &str = include_str!("scripts/chain_query.js");

/// One candidate chain. `index` selects among the field link's matches (zero-based).
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainQuery<'a> {
    pub location: Option<&'a str>,
    pub section: Option<&'a str>,
    pub field: &'a str,
    pub index: usize,
    /// Report the matched node's `for` attribute.
    pub capture_for: bool,
}

impl<'a> ChainQuery<'a> {
    pub fn field(field: &'a str) -> Self {
        Self {
            field,
            ..Default::default()
        }
    }
}

/// A chain that resolved to a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainMatch {
    /// Links joined with ` >> `.
    pub chain: String,
    pub for_attr: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainReply {
    #[serde(default)]
    found: bool,
    #[serde(default)]
    chain: String,
    #[serde(default)]
    for_attr: String,
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChainArgs<'q, 'a> {
    #[serde(flatten)]
    query: &'q ChainQuery<'a>,
    require_visible: bool,
}

/// Runs chain queries through a [`PageProbe`].
#[derive(Clone)]
pub struct ChainEvaluator {
    probe: Arc<dyn PageProbe>,
    require_visible: bool,
}

impl ChainEvaluator {
    pub fn new(probe: Arc<dyn PageProbe>) -> Self {
        Self {
            probe,
            require_visible: true,
        }
    }

    /// Accept matches that exist but are not rendered.
    pub fn with_require_visible(mut self, require_visible: bool) -> Self {
        self.require_visible = require_visible;
        self
    }

    pub fn require_visible(&self) -> bool {
        self.require_visible
    }

    pub fn probe(&self) -> &Arc<dyn PageProbe> {
        &self.probe
    }

    /// Resolve `query` once. `Ok(None)` means nothing (visible) matched.
    pub async fn evaluate(&self, query: &ChainQuery<'_>) -> Result<Option<ChainMatch>, ProbeError> {
        self.run(query, self.require_visible).await
    }

    /// Whether `handle` currently resolves to a node. Empty handles never do.
    pub async fn exists(&self, handle: &ElementHandle) -> Result<bool, ProbeError> {
        if handle.is_empty() {
            return Ok(false);
        }
        let chain = handle.chain_string();
        let query = ChainQuery {
            index: handle.nth().unwrap_or(0),
            ..ChainQuery::field(&chain)
        };
        Ok(self.run(&query, false).await?.is_some())
    }

    async fn run(
        &self,
        query: &ChainQuery<'_>,
        require_visible: bool,
    ) -> Result<Option<ChainMatch>, ProbeError> {
        if self.probe.is_closed() {
            return Err(ProbeError::new(ProbeErrorKind::PageClosed)
                .with_hint("cannot evaluate locator on a closed page"));
        }
        self.probe.wait_for_load_state(LoadState::Load).await?;

        trace!(
            location = ?query.location,
            section = ?query.section,
            field = query.field,
            index = query.index,
            "evaluating chain"
        );
        let expression = script_call(
            CHAIN_QUERY_SCRIPT,
            &ChainArgs {
                query,
                require_visible,
            },
        )?;
        let value = self.probe.evaluate(&expression).await?;
        let reply: ChainReply = serde_json::from_value(value).map_err(|err| {
            ProbeError::new(ProbeErrorKind::Script)
                .with_hint(format!("unexpected chain query reply: {err}"))
        })?;

        if let Some(error) = reply.error {
            return Err(ProbeError::new(ProbeErrorKind::InvalidSelector).with_hint(error));
        }
        if !reply.found {
            return Ok(None);
        }
        debug!(chain = %reply.chain, "chain resolved");
        Ok(Some(ChainMatch {
            chain: reply.chain,
            for_attr: (!reply.for_attr.is_empty()).then_some(reply.for_attr),
        }))
    }
}
