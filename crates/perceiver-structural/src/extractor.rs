//! DOM snapshot extraction through the page probe.

use std::time::Duration;

use async_trait::async_trait;
use cdp_adapter::probe::script_call;
use cdp_adapter::PageProbe;
use fieldscope_core_types::LoadState;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::model::Snapshot;

const EXTRACT_SNAPSHOT_SCRIPT: &str = include_str!("scripts/extract_snapshot.js");

/// Which elements count as hidden and are left out of a snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HiddenPolicy {
    /// Keep everything.
    Off,
    /// Drop elements with an empty bounding box.
    Strict,
    /// Drop elements whose computed style is `display: none` or `visibility: hidden`.
    #[default]
    Flexible,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub allowed_tags: Vec<String>,
    pub allowed_attributes: Vec<String>,
    pub hidden_policy: HiddenPolicy,
    /// Drop non-form elements that carry neither text nor a label.
    pub skip_empty: bool,
    /// Pause after the load state settles and before the script runs.
    pub settle_ms: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            allowed_tags: ["input", "button", "select", "textarea", "a", "li", "span"]
                .into_iter()
                .map(String::from)
                .collect(),
            allowed_attributes: [
                "id",
                "class",
                "aria-label",
                "role",
                "name",
                "placeholder",
                "value",
                "type",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            hidden_policy: HiddenPolicy::Flexible,
            skip_empty: true,
            settle_ms: 1_000,
        }
    }
}

/// Produces snapshots of the current page.
///
/// Extraction is infallible from the caller's point of view: failures degrade to an empty
/// snapshot so the resolver reports "not found" instead of a transport error.
#[async_trait]
pub trait SnapshotExtractor: Send + Sync {
    async fn extract(&self, probe: &dyn PageProbe) -> Snapshot;
}

/// Runs the bundled in-page extraction script.
#[derive(Clone, Debug, Default)]
pub struct ScriptSnapshotExtractor {
    config: ExtractorConfig,
}

impl ScriptSnapshotExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    fn script_args(&self) -> serde_json::Value {
        json!({
            "allowedTags": self.config.allowed_tags,
            "allowedAttributes": self.config.allowed_attributes,
            "hiddenPolicy": self.config.hidden_policy,
            "skipEmpty": self.config.skip_empty,
        })
    }
}

#[async_trait]
impl SnapshotExtractor for ScriptSnapshotExtractor {
    async fn extract(&self, probe: &dyn PageProbe) -> Snapshot {
        for state in [LoadState::DomContentLoaded, LoadState::Load] {
            if let Err(err) = probe.wait_for_load_state(state).await {
                warn!(?state, %err, "load state wait failed before extraction");
            }
        }
        if self.config.settle_ms > 0 {
            probe
                .wait_for_timeout(Duration::from_millis(self.config.settle_ms))
                .await;
        }

        let expression = match script_call(EXTRACT_SNAPSHOT_SCRIPT, &self.script_args()) {
            Ok(expression) => expression,
            Err(err) => {
                warn!(%err, "failed to build extraction call");
                return Snapshot::empty();
            }
        };

        let value = match probe.evaluate(&expression).await {
            Ok(value) => value,
            Err(err) => {
                warn!(%err, "snapshot script failed");
                return Snapshot::empty();
            }
        };

        match Snapshot::from_value(value) {
            Ok(mut snapshot) => {
                if snapshot.captured_at.is_none() {
                    snapshot.captured_at = Some(chrono::Utc::now());
                }
                debug!(elements = snapshot.len(), url = %snapshot.url, "snapshot extracted");
                snapshot
            }
            Err(err) => {
                warn!(%err, "snapshot payload could not be decoded");
                Snapshot::empty()
            }
        }
    }
}
