//! Shared primitives for the fieldscope resolver crates.
//!
//! Everything in here is page-agnostic: the field descriptor grammar, the selector kinds the
//! resolvers hand to a page probe, and the element handle they return to callers.

pub mod descriptor;

use std::fmt;

pub use descriptor::{DescriptorError, FieldDescriptor};

/// Selector dialect understood by the page probe.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "lowercase"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SelectorKind {
    Css,
    XPath,
}

impl SelectorKind {
    /// Infer the dialect from the leading characters: `//` or `(` is XPath, anything else CSS.
    ///
    /// A single leading `/` also counts as XPath so absolute paths such as `/html[1]/body[1]`
    /// produced by the snapshot extractor are recognized.
    pub fn infer(selector: &str) -> Self {
        let trimmed = selector.trim_start();
        if trimmed.starts_with('/') || trimmed.starts_with('(') {
            SelectorKind::XPath
        } else {
            SelectorKind::Css
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SelectorKind::Css => "css",
            SelectorKind::XPath => "xpath",
        }
    }
}

/// A fully substituted selector plus its dialect.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct LocatorCandidate {
    pub selector: String,
    pub kind: SelectorKind,
}

impl LocatorCandidate {
    pub fn new(selector: impl Into<String>) -> Self {
        let selector = selector.into();
        let kind = SelectorKind::infer(&selector);
        Self { selector, kind }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            kind: SelectorKind::Css,
        }
    }

    pub fn xpath(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            kind: SelectorKind::XPath,
        }
    }

    pub fn is_xpath(&self) -> bool {
        self.kind == SelectorKind::XPath
    }

    /// Whether the selector already carries a trailing positional index such as `[2]`.
    pub fn has_trailing_index(&self) -> bool {
        has_trailing_index(&self.selector)
    }
}

impl fmt::Display for LocatorCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind.name(), self.selector)
    }
}

/// Returns `true` when `selector` ends with `[<digits>]`, ignoring trailing whitespace.
pub fn has_trailing_index(selector: &str) -> bool {
    let trimmed = selector.trim_end();
    let Some(body) = trimmed.strip_suffix(']') else {
        return false;
    };
    match body.rfind('[') {
        Some(open) => {
            let digits = &body[open + 1..];
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Lazy reference to a live element.
///
/// A handle is a selector chain (`>>`-joined links, each evaluated inside the previous link's
/// subtree) plus an optional zero-based `nth` filter. It is re-evaluated against the page
/// whenever it is used. The empty handle never resolves; callers check [`ElementHandle::is_empty`]
/// or probe the page before acting on it.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ElementHandle {
    chain: Vec<LocatorCandidate>,
    nth: Option<usize>,
}

impl ElementHandle {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_candidate(candidate: LocatorCandidate) -> Self {
        Self {
            chain: vec![candidate],
            nth: None,
        }
    }

    /// Build a handle from a `>>`-joined chain string.
    pub fn from_chain(chain: &str) -> Self {
        let links = chain
            .split(">>")
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(LocatorCandidate::new)
            .collect();
        Self {
            chain: links,
            nth: None,
        }
    }

    pub fn with_nth(mut self, nth: usize) -> Self {
        self.nth = Some(nth);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn links(&self) -> &[LocatorCandidate] {
        &self.chain
    }

    pub fn nth(&self) -> Option<usize> {
        self.nth
    }

    /// The chain rendered back into its `>>`-joined form.
    pub fn chain_string(&self) -> String {
        self.chain
            .iter()
            .map(|link| link.selector.as_str())
            .collect::<Vec<_>>()
            .join(" >> ")
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "<empty>");
        }
        write!(f, "{}", self.chain_string())?;
        if let Some(nth) = self.nth {
            write!(f, " [nth={nth}]")?;
        }
        Ok(())
    }
}

/// Page load milestones a probe can wait for.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadState {
    DomContentLoaded,
    Load,
}

impl LoadState {
    /// `document.readyState` values that satisfy this milestone.
    pub fn ready_states(&self) -> &'static [&'static str] {
        match self {
            LoadState::DomContentLoaded => &["interactive", "complete"],
            LoadState::Load => &["complete"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_selector_kind_from_prefix() {
        assert_eq!(SelectorKind::infer("//input"), SelectorKind::XPath);
        assert_eq!(SelectorKind::infer("(//input)[2]"), SelectorKind::XPath);
        assert_eq!(SelectorKind::infer("/html[1]/body[1]"), SelectorKind::XPath);
        assert_eq!(SelectorKind::infer("input[name='q']"), SelectorKind::Css);
        assert_eq!(SelectorKind::infer("#main > a"), SelectorKind::Css);
    }

    #[test]
    fn trailing_index_detection() {
        assert!(has_trailing_index("(//input)[2]"));
        assert!(has_trailing_index("(//input)[12] "));
        assert!(!has_trailing_index("input[name='q']"));
        assert!(!has_trailing_index("//input[]"));
        assert!(!has_trailing_index("div"));
    }

    #[test]
    fn handle_chain_round_trips_through_string() {
        let handle = ElementHandle::from_chain("#main >> //fieldset >> input[name='q']");
        assert_eq!(handle.links().len(), 3);
        assert!(handle.links()[1].is_xpath());
        assert_eq!(
            handle.chain_string(),
            "#main >> //fieldset >> input[name='q']"
        );
    }

    #[test]
    fn empty_handle_reports_empty() {
        let handle = ElementHandle::empty();
        assert!(handle.is_empty());
        assert_eq!(handle.to_string(), "<empty>");
        assert!(ElementHandle::from_chain("  ").is_empty());
    }
}
