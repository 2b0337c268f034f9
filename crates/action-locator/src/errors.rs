//! Error types for locator system

use cdp_adapter::ProbeError;
use fieldscope_core_types::DescriptorError;
use thiserror::Error;

/// Locator error enumeration
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// No snapshot record matched any rule of the category
    #[error("no element matched '{0}'")]
    NotFound(String),

    /// Requested occurrence is past the end of the ranked matches
    #[error("instance {instance} requested but only {found} unique matches found")]
    AmbiguousInstance { instance: usize, found: usize },

    /// Neither computed selector resolves to exactly one live node
    #[error("selectors are not unique on the page (css: '{css}', xpath: '{xpath}')")]
    NonUniqueSelector { css: String, xpath: String },

    /// Neither an override nor a default pattern library was given
    #[error("no pattern library selected; pass one or configure pattern.default_library")]
    PatternLibraryMissing,

    /// Pattern library name is not registered in the template store
    #[error("pattern library '{0}' is not loaded")]
    UnknownPatternLibrary(String),

    /// Heuristic category outside button/input/radio/checkbox/dropdown/link
    #[error("unsupported element category '{0}'")]
    UnsupportedCategory(String),

    /// Descriptor string could not be parsed
    #[error("invalid field descriptor: {0}")]
    InvalidDescriptor(#[from] DescriptorError),

    /// Pattern library file could not be read or decoded
    #[error("failed to load pattern library {path}: {reason}")]
    TemplateLoad { path: String, reason: String },

    /// Page probe failure that aborts resolution
    #[error("page probe failed: {0}")]
    Probe(#[from] ProbeError),
}

impl LocatorError {
    /// Failures a caller can sensibly retry after the page changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            LocatorError::NotFound(_)
            | LocatorError::AmbiguousInstance { .. }
            | LocatorError::NonUniqueSelector { .. } => true,
            LocatorError::Probe(err) => err.retriable,
            _ => false,
        }
    }

    pub fn template_load(path: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        LocatorError::TemplateLoad {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}
