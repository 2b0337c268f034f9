//! Chromium sessions on top of chromiumoxide's browser and page handles.
//!
//! A probe needs two protocol calls from its page: `Runtime.evaluate` and wheel input through
//! `Input.dispatchMouseEvent`. [`PageChannel`] is exactly that surface; [`ChromiumPage`] serves it
//! from a live tab and tests serve it from memory.

use std::fs;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType,
};
use chromiumoxide::cdp::js_protocol::runtime::{EvaluateParams, EvaluateReturns};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::CdpConfig;
use crate::error::{ProbeError, ProbeErrorKind};

/// The protocol surface a page probe drives.
#[async_trait]
pub trait PageChannel: Send + Sync {
    /// Evaluate `expression`, awaiting promises and returning the result by value.
    async fn evaluate(&self, expression: &str) -> Result<Value, ProbeError>;

    /// Dispatch one mouse wheel event at viewport point `(x, y)`.
    async fn wheel(&self, x: f64, y: f64, delta_x: f64, delta_y: f64) -> Result<(), ProbeError>;
}

/// A launched or attached Chromium and the task pumping its protocol handler.
pub struct ChromiumSession {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    command_timeout: Duration,
}

impl ChromiumSession {
    /// Connect to `websocket_url` when configured, else launch a browser.
    pub async fn open(cfg: &CdpConfig) -> Result<Arc<Self>, ProbeError> {
        let (browser, mut handler) = match cfg.websocket_url.as_deref() {
            Some(url) => Browser::connect(url).await.map_err(|err| launch_failed(url, err))?,
            None => Browser::launch(browser_config(cfg)?)
                .await
                .map_err(|err| launch_failed("local chromium", err))?,
        };

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(target: "cdp-transport", %err, "browser handler event failed");
                }
            }
            debug!(target: "cdp-transport", "browser connection closed");
        });

        info!(
            target: "cdp-transport",
            attached = cfg.websocket_url.is_some(),
            "chromium session open"
        );
        Ok(Arc::new(Self {
            browser: Mutex::new(browser),
            handler,
            command_timeout: cfg.command_timeout(),
        }))
    }

    /// The first page target the browser knows about, or a new `about:blank` tab.
    pub async fn first_page(self: &Arc<Self>) -> Result<ChromiumPage, ProbeError> {
        let mut browser = self.browser.lock().await;
        if let Err(err) = browser.fetch_targets().await {
            debug!(target: "cdp-transport", %err, "target discovery failed");
        }
        let existing = browser.pages().await.map_err(probe_error)?.into_iter().next();
        let page = match existing {
            Some(page) => page,
            None => self.bounded("Target.createTarget", browser.new_page("about:blank")).await?,
        };
        debug!(target: "cdp-transport", target_id = ?page.target_id(), "page attached");
        Ok(ChromiumPage {
            page,
            session: Arc::clone(self),
        })
    }

    async fn bounded<T>(
        &self,
        method: &str,
        call: impl Future<Output = Result<T, CdpError>>,
    ) -> Result<T, ProbeError> {
        match tokio::time::timeout(self.command_timeout, call).await {
            Ok(result) => result.map_err(probe_error),
            Err(_) => Err(ProbeError::new(ProbeErrorKind::Timeout)
                .with_hint(format!("{method} gave no answer within {:?}", self.command_timeout))
                .retriable(true)),
        }
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// One tab of a [`ChromiumSession`]. Keeps the session alive while in use.
pub struct ChromiumPage {
    page: Page,
    session: Arc<ChromiumSession>,
}

#[async_trait]
impl PageChannel for ChromiumPage {
    async fn evaluate(&self, expression: &str) -> Result<Value, ProbeError> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(invalid_params)?;
        let response = self
            .session
            .bounded("Runtime.evaluate", self.page.execute(params))
            .await?;
        evaluation_value(response.result)
    }

    async fn wheel(&self, x: f64, y: f64, delta_x: f64, delta_y: f64) -> Result<(), ProbeError> {
        let params = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseWheel)
            .x(x)
            .y(y)
            .delta_x(delta_x)
            .delta_y(delta_y)
            .build()
            .map_err(invalid_params)?;
        self.session
            .bounded("Input.dispatchMouseEvent", self.page.execute(params))
            .await
            .map(|_| ())
    }
}

fn browser_config(cfg: &CdpConfig) -> Result<BrowserConfig, ProbeError> {
    let profile = cfg.launch_profile();
    fs::create_dir_all(&profile).map_err(|err| {
        ProbeError::new(ProbeErrorKind::Internal)
            .with_hint(format!("cannot create profile dir {}: {err}", profile.display()))
    })?;

    let mut builder = BrowserConfig::builder()
        .user_data_dir(profile)
        .request_timeout(cfg.command_timeout())
        .args(launch_args(cfg));
    if !cfg.headless {
        builder = builder.with_head();
    }
    if let Some(executable) = cfg.chrome_executable() {
        builder = builder.chrome_executable(executable);
    }
    builder.build().map_err(|err| {
        ProbeError::new(ProbeErrorKind::CdpIo)
            .with_hint(format!("cannot launch chromium: {err}"))
            .with_data(json!({ "fix": "set FIELDSCOPE_CHROME to a chrome/chromium binary" }))
    })
}

fn launch_args(cfg: &CdpConfig) -> Vec<&'static str> {
    let mut args = vec![
        "--no-first-run",
        "--no-default-browser-check",
        "--disable-extensions",
        "--disable-dev-shm-usage",
        "--password-store=basic",
        "--use-mock-keychain",
    ];
    if cfg.headless {
        args.extend(["--hide-scrollbars", "--mute-audio"]);
    }
    args
}

/// Unwrap a `Runtime.evaluate` reply. A thrown exception becomes [`ProbeErrorKind::Script`];
/// `undefined` becomes `null`.
fn evaluation_value(returns: EvaluateReturns) -> Result<Value, ProbeError> {
    match returns.exception_details {
        Some(details) => {
            let message = details
                .exception
                .as_ref()
                .and_then(|thrown| thrown.description.clone())
                .unwrap_or_else(|| details.text.clone());
            Err(ProbeError::new(ProbeErrorKind::Script)
                .with_hint(message)
                .with_data(json!({
                    "line": details.line_number,
                    "column": details.column_number,
                })))
        }
        None => Ok(returns.result.value.unwrap_or(Value::Null)),
    }
}

fn probe_error(err: CdpError) -> ProbeError {
    let hint = err.to_string();
    match err {
        CdpError::Chrome(reply) => ProbeError::new(ProbeErrorKind::CdpIo)
            .with_hint(hint)
            .with_data(json!({ "code": reply.code })),
        CdpError::Timeout => ProbeError::new(ProbeErrorKind::Timeout)
            .with_hint(hint)
            .retriable(true),
        CdpError::JavascriptException(_) => ProbeError::new(ProbeErrorKind::Script).with_hint(hint),
        CdpError::Serde(_) | CdpError::FrameNotFound(_) => {
            ProbeError::new(ProbeErrorKind::Internal).with_hint(hint)
        }
        _ => ProbeError::new(ProbeErrorKind::CdpIo)
            .with_hint(hint)
            .retriable(true),
    }
}

fn launch_failed(endpoint: &str, err: CdpError) -> ProbeError {
    ProbeError::new(ProbeErrorKind::CdpIo).with_hint(format!("cannot reach {endpoint}: {err}"))
}

fn invalid_params(reason: String) -> ProbeError {
    ProbeError::new(ProbeErrorKind::Internal).with_hint(format!("invalid command params: {reason}"))
}
