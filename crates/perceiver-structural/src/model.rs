use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::PerceiverError;

/// How trustworthy an extracted label is.
///
/// `Safe` labels come from an authoritative association (`label[for]`, `aria-labelledby`,
/// `aria-label`, placeholder, name). `Proximity` labels were inferred from DOM neighbourhood.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelDetection {
    Safe,
    Proximity,
    #[default]
    #[serde(rename = "")]
    None,
}

impl LabelDetection {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelDetection::Safe => "safe",
            LabelDetection::Proximity => "proximity",
            LabelDetection::None => "",
        }
    }
}

impl fmt::Display for LabelDetection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LabelDetection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw.as_deref().map(str::trim) {
            Some(mode) if mode.eq_ignore_ascii_case("safe") => LabelDetection::Safe,
            Some(mode) if mode.eq_ignore_ascii_case("proximity") => LabelDetection::Proximity,
            _ => LabelDetection::None,
        })
    }
}

/// One eligible element captured from the page.
///
/// Keys also decode from the abbreviated archive layout (`tg`, `tp`, `cs`, `xp`, `at.al`, ...).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ElementRecord {
    #[serde(alias = "index", alias = "i")]
    pub dom_index: usize,
    #[serde(alias = "pi", deserialize_with = "parent_index")]
    pub parent_index: Option<usize>,
    #[serde(alias = "tg")]
    pub tag: String,
    #[serde(alias = "type", alias = "tp")]
    pub semantic_type: String,
    #[serde(alias = "css", alias = "cs")]
    pub css_selector: String,
    #[serde(alias = "xpath", alias = "xp")]
    pub xpath_selector: String,
    #[serde(alias = "text", alias = "tx")]
    pub visible_text: String,
    #[serde(alias = "lb")]
    pub label: String,
    #[serde(alias = "ld")]
    pub label_detection: LabelDetection,
    #[serde(alias = "lg", skip_serializing_if = "Option::is_none")]
    pub label_group: Option<String>,
    #[serde(alias = "fs", skip_serializing_if = "Option::is_none")]
    pub fieldset: Option<String>,
    #[serde(alias = "at", deserialize_with = "attribute_map")]
    pub attributes: BTreeMap<String, String>,
}

impl ElementRecord {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn aria_label(&self) -> Option<&str> {
        self.attr("aria-label")
    }

    pub fn name_attr(&self) -> Option<&str> {
        self.attr("name")
    }

    pub fn placeholder(&self) -> Option<&str> {
        self.attr("placeholder")
    }

    pub fn type_attr(&self) -> Option<&str> {
        self.attr("type")
    }

    /// Identity used to collapse duplicate records: css, else xpath, else `tag-label-text`.
    pub fn dedupe_key(&self) -> String {
        if !self.css_selector.is_empty() {
            self.css_selector.clone()
        } else if !self.xpath_selector.is_empty() {
            self.xpath_selector.clone()
        } else {
            format!("{}-{}-{}", self.tag, self.label, self.visible_text)
        }
    }
}

/// Point-in-time extraction of every eligible element, in document order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Snapshot {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    pub elements: Vec<ElementRecord>,
}

impl Snapshot {
    pub fn new(url: impl Into<String>, elements: Vec<ElementRecord>) -> Self {
        Self {
            url: url.into(),
            captured_at: Some(Utc::now()),
            elements,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Decode a snapshot from JSON: either the `{ url, elements }` object or a bare record array.
    pub fn from_json_str(raw: &str) -> Result<Self, PerceiverError> {
        Ok(serde_json::from_str::<SnapshotWire>(raw)?.into())
    }

    pub fn from_value(value: Value) -> Result<Self, PerceiverError> {
        Ok(serde_json::from_value::<SnapshotWire>(value)?.into())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotWire {
    Bare(Vec<ElementRecord>),
    Wrapped(Snapshot),
}

impl From<SnapshotWire> for Snapshot {
    fn from(wire: SnapshotWire) -> Self {
        match wire {
            SnapshotWire::Bare(elements) => Snapshot {
                url: String::new(),
                captured_at: None,
                elements,
            },
            SnapshotWire::Wrapped(snapshot) => snapshot,
        }
    }
}

fn parent_index<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.and_then(|idx| usize::try_from(idx).ok()))
}

fn expand_attribute_key(key: &str) -> &str {
    match key {
        "cl" => "class",
        "rl" => "role",
        "al" => "aria-label",
        "nm" => "name",
        "ph" => "placeholder",
        "vl" => "value",
        "tp" => "type",
        "ck" => "checked",
        other => other,
    }
}

fn attribute_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s,
                other => other.to_string(),
            };
            Some((expand_attribute_key(&key).to_string(), text))
        })
        .collect())
}
