//! In-memory page used by the resolver integration tests.
//!
//! Chain queries are answered by a closure over the decoded script arguments; snapshot
//! extraction returns a fixed payload; selector counts come from a table.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use cdp_adapter::{PageProbe, ProbeError};
use fieldscope_core_types::{LoadState, LocatorCandidate};
use parking_lot::Mutex;
use serde_json::{json, Value};

type ChainResponder = Box<dyn Fn(&Value) -> Value + Send + Sync>;

pub struct FakePage {
    responder: ChainResponder,
    snapshot: Mutex<Value>,
    counts: Mutex<HashMap<String, usize>>,
    url: Mutex<String>,
    closed: AtomicBool,
    pub chain_queries: Mutex<Vec<Value>>,
    pub extractions: AtomicUsize,
    pub wheel_events: AtomicUsize,
}

impl FakePage {
    pub fn new() -> Self {
        Self::answering(|_| json!({ "found": false }))
    }

    pub fn answering(responder: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            snapshot: Mutex::new(json!({ "url": "https://app.test/", "elements": [] })),
            counts: Mutex::new(HashMap::new()),
            url: Mutex::new("https://app.test/".to_string()),
            closed: AtomicBool::new(false),
            chain_queries: Mutex::new(Vec::new()),
            extractions: AtomicUsize::new(0),
            wheel_events: AtomicUsize::new(0),
        }
    }

    pub fn with_snapshot(self, snapshot: Value) -> Self {
        *self.snapshot.lock() = snapshot;
        self
    }

    pub fn with_count(self, selector: &str, count: usize) -> Self {
        self.counts.lock().insert(selector.to_string(), count);
        self
    }

    pub fn navigate(&self, url: &str) {
        *self.url.lock() = url.to_string();
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// `field` argument of every chain query, in order.
    pub fn queried_fields(&self) -> Vec<String> {
        self.chain_queries
            .lock()
            .iter()
            .map(|args| args["field"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn extraction_count(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }

    pub fn wheel_count(&self) -> usize {
        self.wheel_events.load(Ordering::SeqCst)
    }
}

/// Decode the JSON argument object from a `(script)(args)` call.
fn script_args(expression: &str) -> Option<Value> {
    let start = expression.find("})({\"")? + 3;
    let body = expression.get(start..expression.len().checked_sub(1)?)?;
    serde_json::from_str(body).ok()
}

#[async_trait]
impl PageProbe for FakePage {
    async fn evaluate(&self, expression: &str) -> Result<Value, ProbeError> {
        if expression == "location.href" {
            return Ok(Value::String(self.url.lock().clone()));
        }
        let Some(args) = script_args(expression) else {
            return Ok(Value::Null);
        };
        if args.get("requireVisible").is_some() {
            self.chain_queries.lock().push(args.clone());
            return Ok((self.responder)(&args));
        }
        if args.get("allowedTags").is_some() {
            self.extractions.fetch_add(1, Ordering::SeqCst);
            return Ok(self.snapshot.lock().clone());
        }
        Ok(Value::Null)
    }

    async fn count(&self, candidate: &LocatorCandidate) -> Result<usize, ProbeError> {
        Ok(self
            .counts
            .lock()
            .get(&candidate.selector)
            .copied()
            .unwrap_or(0))
    }

    async fn is_visible(
        &self,
        candidate: &LocatorCandidate,
        index: usize,
    ) -> Result<bool, ProbeError> {
        Ok(self.count(candidate).await? > index)
    }

    async fn scroll_into_view(
        &self,
        _candidate: &LocatorCandidate,
        _index: usize,
    ) -> Result<(), ProbeError> {
        Ok(())
    }

    async fn scroll_by(&self, _dx: f64, _dy: f64) -> Result<(), ProbeError> {
        self.wheel_events.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn wait_for_load_state(&self, _state: LoadState) -> Result<(), ProbeError> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
