//! Chromium DevTools Protocol plumbing for fieldscope.
//!
//! The resolvers only ever talk to a [`PageProbe`]. [`CdpPageProbe`] implements it over a
//! [`PageChannel`], which [`ChromiumPage`] provides from a tab of a [`ChromiumSession`].

pub mod config;
pub mod probe;
pub mod transport;

pub use config::{detect_chrome_executable, CdpConfig};
pub use error::{ProbeError, ProbeErrorKind};
pub use probe::{CdpPageProbe, PageProbe};
pub use transport::{ChromiumPage, ChromiumSession, PageChannel};

pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    /// Error categories surfaced by page probes.
    #[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
    pub enum ProbeErrorKind {
        #[error("page operation timed out")]
        Timeout,
        #[error("cdp i/o failure")]
        CdpIo,
        #[error("selector rejected by the page")]
        InvalidSelector,
        #[error("page script raised an exception")]
        Script,
        #[error("page is closed")]
        PageClosed,
        #[error("internal error")]
        Internal,
    }

    /// Probe failure with optional hint and raw protocol data.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct ProbeError {
        pub kind: ProbeErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
        pub data: Option<serde_json::Value>,
    }

    impl fmt::Display for ProbeError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.kind)?;
            if let Some(hint) = &self.hint {
                write!(f, ": {}", hint)?;
            }
            Ok(())
        }
    }

    impl std::error::Error for ProbeError {}

    impl ProbeError {
        pub fn new(kind: ProbeErrorKind) -> Self {
            Self {
                kind,
                hint: None,
                retriable: false,
                data: None,
            }
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn retriable(mut self, flag: bool) -> Self {
            self.retriable = flag;
            self
        }

        pub fn with_data(mut self, data: serde_json::Value) -> Self {
            self.data = Some(data);
            self
        }

        /// DevTools error code carried in `data.code`, if the failure came from the browser.
        pub fn cdp_code(&self) -> Option<i64> {
            self.data
                .as_ref()
                .and_then(|data| data.get("code"))
                .and_then(|code| code.as_i64())
        }

        pub fn is_page_closed(&self) -> bool {
            self.kind == ProbeErrorKind::PageClosed
        }
    }
}
