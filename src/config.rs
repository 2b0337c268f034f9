//! Configuration loading.
//!
//! Looks for `config/fieldscope.yaml` in the working directory, then
//! `<config_dir>/fieldscope/config.yaml`, then falls back to defaults. Environment variables
//! override whatever the file says.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use action_locator::{HeuristicConfig, PatternConfig};
use cdp_adapter::CdpConfig;
use perceiver_structural::{ExtractorConfig, ResolveMode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{FieldScopeError, FieldScopeResult};

pub const ENV_PATTERN_LIBRARY: &str = "FIELDSCOPE_PATTERN_LIBRARY";
pub const ENV_RESOLVE_MODE: &str = "FIELDSCOPE_RESOLVE_MODE";
pub const ENV_CHROME: &str = "FIELDSCOPE_CHROME";
pub const ENV_WS_URL: &str = "FIELDSCOPE_WS_URL";
pub const ENV_HEADLESS: &str = "FIELDSCOPE_HEADLESS";

const LOCAL_CONFIG: &str = "config/fieldscope.yaml";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pattern: PatternSettings,
    pub heuristic: HeuristicConfig,
    pub extractor: ExtractorConfig,
    pub cdp: CdpConfig,
}

/// Pattern resolver settings plus the library files to load at startup.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSettings {
    #[serde(flatten)]
    pub resolver: PatternConfig,
    /// Library files or directories. Relative paths resolve against the working directory.
    pub libraries: Vec<PathBuf>,
}

impl Config {
    /// Load from `explicit` when given, else from the first default location that exists.
    pub fn load(explicit: Option<&Path>) -> FieldScopeResult<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => default_locations().into_iter().find(|path| path.is_file()),
        };

        let mut config = match path {
            Some(path) => {
                let config = Self::from_file(&path)?;
                info!(path = %path.display(), "loaded configuration");
                config
            }
            None => {
                debug!("no configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> FieldScopeResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| FieldScopeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw).map_err(|source| FieldScopeError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    pub fn apply_env_overrides(&mut self) -> FieldScopeResult<()> {
        if let Some(library) = env_value(ENV_PATTERN_LIBRARY) {
            self.pattern.resolver.default_library = Some(library);
        }
        if let Some(mode) = env_value(ENV_RESOLVE_MODE) {
            self.heuristic.mode = mode
                .parse::<ResolveMode>()
                .map_err(|reason| FieldScopeError::InvalidOverride {
                    key: ENV_RESOLVE_MODE,
                    reason,
                })?;
        }
        if let Some(chrome) = env_value(ENV_CHROME) {
            self.cdp.executable = Some(PathBuf::from(chrome));
        }
        if let Some(url) = env_value(ENV_WS_URL) {
            self.cdp.websocket_url = Some(url);
        }
        if let Some(flag) = env_value(ENV_HEADLESS) {
            self.cdp.headless =
                parse_flag(&flag).ok_or_else(|| FieldScopeError::InvalidOverride {
                    key: ENV_HEADLESS,
                    reason: format!("expected a boolean, got '{flag}'"),
                })?;
        }
        Ok(())
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(LOCAL_CONFIG)];
    if let Some(mut dir) = dirs::config_dir() {
        dir.push("fieldscope");
        dir.push("config.yaml");
        locations.push(dir);
    }
    locations
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
