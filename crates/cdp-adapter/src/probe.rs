//! The narrow page interface the resolvers depend on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fieldscope_core_types::{LoadState, LocatorCandidate};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::config::{CdpConfig, DEFAULT_LOAD_POLL_MS, DEFAULT_LOAD_TIMEOUT_MS};
use crate::error::{ProbeError, ProbeErrorKind};
use crate::transport::{ChromiumSession, PageChannel};

const ELEMENT_QUERY_SCRIPT: &str = include_str!("scripts/element_query.js");

// "Session with given id not found" / "Target closed".
const CDP_SESSION_GONE: i64 = -32001;

/// Live page operations: script evaluation plus selector queries, scrolling and waits.
///
/// Selector queries run against the top-level document. A selector the page rejects surfaces
/// as [`ProbeErrorKind::InvalidSelector`].
#[async_trait]
pub trait PageProbe: Send + Sync {
    /// Evaluate `expression` in the page and return its JSON value. Promises are awaited.
    async fn evaluate(&self, expression: &str) -> Result<Value, ProbeError>;

    async fn count(&self, candidate: &LocatorCandidate) -> Result<usize, ProbeError>;

    /// Whether the `index`-th match (zero-based) exists and is rendered.
    async fn is_visible(&self, candidate: &LocatorCandidate, index: usize)
        -> Result<bool, ProbeError>;

    async fn scroll_into_view(
        &self,
        candidate: &LocatorCandidate,
        index: usize,
    ) -> Result<(), ProbeError>;

    /// Dispatch a mouse wheel event of the given deltas.
    async fn scroll_by(&self, delta_x: f64, delta_y: f64) -> Result<(), ProbeError>;

    async fn wait_for_load_state(&self, state: LoadState) -> Result<(), ProbeError>;

    async fn wait_for_timeout(&self, duration: Duration) {
        sleep(duration).await;
    }

    fn is_closed(&self) -> bool {
        false
    }

    async fn url(&self) -> Result<String, ProbeError> {
        let value = self.evaluate("location.href").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

/// Render `(<script>)(<args as JSON>)` for evaluation through [`PageProbe::evaluate`].
pub fn script_call<A: Serialize + ?Sized>(script: &str, args: &A) -> Result<String, ProbeError> {
    let literal = serde_json::to_string(args).map_err(|err| {
        ProbeError::new(ProbeErrorKind::Internal)
            .with_hint(format!("failed to encode script arguments: {err}"))
    })?;
    Ok(format!("({})({})", script.trim(), literal))
}

/// [`PageProbe`] over one browser tab.
pub struct CdpPageProbe {
    channel: Arc<dyn PageChannel>,
    closed: AtomicBool,
    load_poll: Duration,
    load_timeout: Duration,
}

impl CdpPageProbe {
    pub fn new(channel: Arc<dyn PageChannel>) -> Self {
        Self {
            channel,
            closed: AtomicBool::new(false),
            load_poll: Duration::from_millis(DEFAULT_LOAD_POLL_MS),
            load_timeout: Duration::from_millis(DEFAULT_LOAD_TIMEOUT_MS),
        }
    }

    /// Open a session per `cfg` and bind to its first page, opening `about:blank` when the
    /// browser has none.
    pub async fn launch(cfg: &CdpConfig) -> Result<Self, ProbeError> {
        let session = ChromiumSession::open(cfg).await?;
        let page = session.first_page().await?;
        Ok(Self::new(Arc::new(page)).configured(cfg))
    }

    /// Apply the load-state timing from `cfg`.
    pub fn configured(self, cfg: &CdpConfig) -> Self {
        self.with_load_timing(
            Duration::from_millis(cfg.load_poll_ms),
            Duration::from_millis(cfg.load_timeout_ms),
        )
    }

    pub fn with_load_timing(mut self, poll: Duration, timeout: Duration) -> Self {
        self.load_poll = poll;
        self.load_timeout = timeout;
        self
    }

    fn ensure_open(&self) -> Result<(), ProbeError> {
        if self.is_closed() {
            return Err(ProbeError::new(ProbeErrorKind::PageClosed));
        }
        Ok(())
    }

    /// A vanished session turns into [`ProbeErrorKind::PageClosed`] and latches the probe closed.
    fn track<T>(&self, result: Result<T, ProbeError>) -> Result<T, ProbeError> {
        match result {
            Err(err) if err.cdp_code() == Some(CDP_SESSION_GONE) => {
                self.closed.store(true, Ordering::SeqCst);
                Err(ProbeError {
                    kind: ProbeErrorKind::PageClosed,
                    ..err
                })
            }
            other => other,
        }
    }

    async fn element_query(
        &self,
        candidate: &LocatorCandidate,
        op: &str,
        index: usize,
    ) -> Result<Value, ProbeError> {
        let expression = script_call(
            ELEMENT_QUERY_SCRIPT,
            &json!({
                "selector": candidate.selector,
                "kind": candidate.kind.name(),
                "op": op,
                "index": index,
            }),
        )?;
        let value = self.evaluate(&expression).await?;
        if let Some(message) = value.get("error").and_then(Value::as_str) {
            return Err(ProbeError::new(ProbeErrorKind::InvalidSelector)
                .with_hint(format!("{candidate}: {message}")));
        }
        Ok(value)
    }

    async fn ready_state(&self) -> Result<String, ProbeError> {
        let value = self.evaluate("document.readyState").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl PageProbe for CdpPageProbe {
    async fn evaluate(&self, expression: &str) -> Result<Value, ProbeError> {
        self.ensure_open()?;
        let result = self.channel.evaluate(expression).await;
        self.track(result)
    }

    async fn count(&self, candidate: &LocatorCandidate) -> Result<usize, ProbeError> {
        let value = self.element_query(candidate, "count", 0).await?;
        Ok(value.get("count").and_then(Value::as_u64).unwrap_or(0) as usize)
    }

    async fn is_visible(
        &self,
        candidate: &LocatorCandidate,
        index: usize,
    ) -> Result<bool, ProbeError> {
        let value = self.element_query(candidate, "visible", index).await?;
        Ok(value
            .get("visible")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    async fn scroll_into_view(
        &self,
        candidate: &LocatorCandidate,
        index: usize,
    ) -> Result<(), ProbeError> {
        let value = self.element_query(candidate, "scroll", index).await?;
        if value.get("found").and_then(Value::as_bool) == Some(true) {
            Ok(())
        } else {
            Err(ProbeError::new(ProbeErrorKind::Internal)
                .with_hint(format!("{candidate} has no match at index {index}")))
        }
    }

    async fn scroll_by(&self, delta_x: f64, delta_y: f64) -> Result<(), ProbeError> {
        let viewport = self
            .evaluate("[window.innerWidth / 2, window.innerHeight / 2]")
            .await?;
        let center = |axis: usize| viewport.get(axis).and_then(Value::as_f64).unwrap_or(0.0);
        let result = self
            .channel
            .wheel(center(0), center(1), delta_x, delta_y)
            .await;
        self.track(result)
    }

    async fn wait_for_load_state(&self, state: LoadState) -> Result<(), ProbeError> {
        let deadline = Instant::now() + self.load_timeout;
        loop {
            let current = self.ready_state().await?;
            if state.ready_states().contains(&current.as_str()) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ProbeError::new(ProbeErrorKind::Timeout)
                    .with_hint(format!("waiting for {state:?}, readyState={current}"))
                    .retriable(true));
            }
            trace!(target: "cdp-probe", ready_state = %current, "page not ready yet");
            sleep(self.load_poll).await;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
