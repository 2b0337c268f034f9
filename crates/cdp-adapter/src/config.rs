//! Browser session settings and Chromium discovery.

use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use which::which;

pub const DEFAULT_LOAD_POLL_MS: u64 = 100;
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;

const ENV_CHROME: &str = "FIELDSCOPE_CHROME";
const ENV_PROFILE: &str = "FIELDSCOPE_CHROME_PROFILE";
const ENV_HEADLESS: &str = "FIELDSCOPE_HEADLESS";
const ENV_WS_URL: &str = "FIELDSCOPE_WS_URL";
const ENV_SKIP_OS_PATHS: &str = "FIELDSCOPE_SKIP_OS_PATHS";

/// How the session reaches a browser and how long page operations may take.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CdpConfig {
    /// Chromium binary. Detected at launch when unset.
    pub executable: Option<PathBuf>,
    /// Profile directory. Each launch gets a scratch directory when unset.
    pub profile_dir: Option<PathBuf>,
    pub headless: bool,
    /// Attach to this DevTools endpoint instead of launching a browser.
    pub websocket_url: Option<String>,
    /// Upper bound for one protocol command.
    pub command_timeout_ms: u64,
    /// Poll period while waiting on `document.readyState`.
    pub load_poll_ms: u64,
    /// Upper bound for a single load-state wait.
    pub load_timeout_ms: u64,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            executable: None,
            profile_dir: env_value(ENV_PROFILE).map(PathBuf::from),
            headless: env_value(ENV_HEADLESS)
                .and_then(|raw| parse_flag(&raw))
                .unwrap_or(true),
            websocket_url: env_value(ENV_WS_URL),
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            load_poll_ms: DEFAULT_LOAD_POLL_MS,
            load_timeout_ms: DEFAULT_LOAD_TIMEOUT_MS,
        }
    }
}

impl CdpConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// The configured binary, else whatever [`detect_chrome_executable`] finds.
    pub fn chrome_executable(&self) -> Option<PathBuf> {
        self.executable.clone().or_else(detect_chrome_executable)
    }

    pub fn launch_profile(&self) -> PathBuf {
        self.profile_dir.clone().unwrap_or_else(scratch_profile)
    }
}

/// Locate a Chromium binary: `FIELDSCOPE_CHROME` if it names a file, then well-known binary names
/// on `PATH`, then the platform's install locations unless `FIELDSCOPE_SKIP_OS_PATHS` is set.
pub fn detect_chrome_executable() -> Option<PathBuf> {
    if let Some(path) = env_value(ENV_CHROME).map(PathBuf::from) {
        if path.is_file() {
            return Some(path);
        }
        debug!(target: "cdp-config", path = %path.display(), "FIELDSCOPE_CHROME is not a file");
    }
    CHROME_BINARIES
        .iter()
        .find_map(|name| which(name).ok())
        .or_else(|| {
            if env_value(ENV_SKIP_OS_PATHS).is_some() {
                return None;
            }
            install_locations().into_iter().find(|path| path.is_file())
        })
}

pub(crate) fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

// Chromium refuses to share a profile between running instances.
fn scratch_profile() -> PathBuf {
    static LAUNCHES: AtomicUsize = AtomicUsize::new(0);
    let launch = LAUNCHES.fetch_add(1, Ordering::Relaxed);
    env::temp_dir().join(format!("fieldscope-{}-{launch}", std::process::id()))
}

#[cfg(windows)]
const CHROME_BINARIES: &[&str] = &["chrome.exe", "chromium.exe", "msedge.exe"];

#[cfg(not(windows))]
const CHROME_BINARIES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
];

#[cfg(windows)]
fn install_locations() -> Vec<PathBuf> {
    let suffixes = [
        r"Google\Chrome\Application\chrome.exe",
        r"Chromium\Application\chrome.exe",
        r"Microsoft\Edge\Application\msedge.exe",
    ];
    ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"]
        .into_iter()
        .filter_map(env_value)
        .flat_map(|root| suffixes.map(|suffix| PathBuf::from(&root).join(suffix)))
        .collect()
}

#[cfg(target_os = "macos")]
fn install_locations() -> Vec<PathBuf> {
    [
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

#[cfg(not(any(windows, target_os = "macos")))]
fn install_locations() -> Vec<PathBuf> {
    [
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/snap/bin/chromium",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}
