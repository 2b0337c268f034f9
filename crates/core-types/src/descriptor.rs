//! Field descriptor grammar.
//!
//! ```text
//! {{location[::value]}} {section[::value]} field name[instance]
//! ```
//!
//! Every part except the field name is optional. `/{{`, `/{` and `/[` escape the grammar
//! characters so they can appear literally inside a field name.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static DESCRIPTOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:\{\{([^:}]+)(?:::(.+?))?\}\}\s*)?(?:\{([^:}]+)(?:::(.+?))?\}\s*)?(.+?)(?:\[(\d+)\])?$",
    )
    .expect("descriptor grammar must compile")
});

// Private-use code points stand in for escaped grammar characters while the regex runs.
const ESC_DOUBLE_BRACE: char = '\u{E000}';
const ESC_BRACE: char = '\u{E001}';
const ESC_BRACKET: char = '\u{E002}';

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("field descriptor is blank")]
    Blank,
}

/// Structured form of a field descriptor string.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub location_name: String,
    pub location_value: String,
    pub section_name: String,
    pub section_value: String,
    pub field_name: String,
    /// 1-based occurrence index.
    pub instance: usize,
}

impl FieldDescriptor {
    /// Parse `raw` into a descriptor.
    ///
    /// Anything the grammar does not recognise becomes the field name verbatim (trimmed) with
    /// instance 1, so every non-blank input parses.
    pub fn parse(raw: &str) -> Result<Self, DescriptorError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DescriptorError::Blank);
        }

        let shielded = shield_escapes(trimmed);
        if let Some(parsed) = Self::parse_grammar(&shielded) {
            return Ok(parsed);
        }
        Ok(Self::plain(&unshield(&shielded)))
    }

    /// A descriptor carrying only a field name.
    pub fn plain(field_name: &str) -> Self {
        Self {
            location_name: String::new(),
            location_value: String::new(),
            section_name: String::new(),
            section_value: String::new(),
            field_name: field_name.trim().to_string(),
            instance: 1,
        }
    }

    fn parse_grammar(shielded: &str) -> Option<Self> {
        let caps = DESCRIPTOR_RE.captures(shielded)?;
        let group = |idx: usize| {
            caps.get(idx)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default()
        };

        let field_name = unshield(&group(5));
        if field_name.is_empty() {
            return None;
        }
        let instance = match caps.get(6) {
            Some(m) => m.as_str().parse::<usize>().ok()?.max(1),
            None => 1,
        };

        Some(Self {
            location_name: group(1),
            location_value: group(2),
            section_name: group(3),
            section_value: group(4),
            field_name,
            instance,
        })
    }

    pub fn has_location(&self) -> bool {
        !self.location_name.is_empty()
    }

    pub fn has_section(&self) -> bool {
        !self.section_name.is_empty()
    }

    /// Text rules compare the section against: the section value when given, else its name.
    pub fn section_scope(&self) -> &str {
        if self.section_value.is_empty() {
            &self.section_name
        } else {
            &self.section_value
        }
    }
}

impl std::str::FromStr for FieldDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn shield_escapes(input: &str) -> String {
    input
        .replace("/{{", &ESC_DOUBLE_BRACE.to_string())
        .replace("/{", &ESC_BRACE.to_string())
        .replace("/[", &ESC_BRACKET.to_string())
}

fn unshield(input: &str) -> String {
    input
        .replace(ESC_DOUBLE_BRACE, "{{")
        .replace(ESC_BRACE, "{")
        .replace(ESC_BRACKET, "[")
}
