//! Per-call substitution context for selector templates.

use std::borrow::Cow;

use fieldscope_core_types::FieldDescriptor;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"#\{(loc\.auto\.[A-Za-z.]+)\}").expect("placeholder pattern must compile")
});

/// Values visible to `#{loc.auto.*}` placeholders during one resolution.
///
/// Created per call from the parsed descriptor; the label pass may add the `for` id it
/// discovers. Never shared between calls.
#[derive(Clone, Debug)]
pub struct LocatorContext {
    descriptor: FieldDescriptor,
    for_id: Option<String>,
}

impl LocatorContext {
    pub fn new(descriptor: FieldDescriptor) -> Self {
        Self {
            descriptor,
            for_id: None,
        }
    }

    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }

    pub fn for_id(&self) -> Option<&str> {
        self.for_id.as_deref()
    }

    pub fn set_for_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.for_id = (!id.is_empty()).then_some(id);
    }

    /// Whether the descriptor names a location or a section.
    pub fn is_scoped(&self) -> bool {
        self.descriptor.has_location() || self.descriptor.has_section()
    }

    fn lookup(&self, key: &str) -> Option<Cow<'_, str>> {
        let d = &self.descriptor;
        let value = match key {
            "loc.auto.fieldName" => Cow::Borrowed(d.field_name.as_str()),
            "loc.auto.fieldName.toLowerCase" => Cow::Owned(d.field_name.to_lowercase()),
            "loc.auto.fieldInstance" => Cow::Owned(d.instance.to_string()),
            "loc.auto.forId" => Cow::Borrowed(self.for_id.as_deref().unwrap_or_default()),
            "loc.auto.location.name" => Cow::Borrowed(d.location_name.as_str()),
            "loc.auto.location.value" => Cow::Borrowed(d.location_value.as_str()),
            "loc.auto.section.name" => Cow::Borrowed(d.section_name.as_str()),
            "loc.auto.section.value" => Cow::Borrowed(d.section_value.as_str()),
            _ => return None,
        };
        Some(value)
    }

    /// Replace known placeholders in `template`. Unknown ones are left as written.
    pub fn substitute(&self, template: &str) -> String {
        PLACEHOLDER_RE
            .replace_all(template, |caps: &Captures<'_>| match self.lookup(&caps[1]) {
                Some(value) => value.into_owned(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}
