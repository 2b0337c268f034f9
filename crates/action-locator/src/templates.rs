//! Pattern libraries: operator-authored selector templates per field type.
//!
//! ```yaml
//! fields:
//!   label: ["//label[text()='#{loc.auto.fieldName}']"]
//!   input: "//input[@id='#{loc.auto.forId}'];//input[@placeholder='#{loc.auto.fieldName}']"
//! locations:
//!   top_menu: "#main-navigation"
//! sections:
//!   radio_group: "//fieldset[legend[normalize-space(text())='#{loc.auto.section.value}']]"
//! scroll: ["main"]
//! ```
//!
//! Template lists are either YAML sequences or a single `;`-separated string.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::errors::LocatorError;

/// Ordered selector templates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TemplateList(Vec<String>);

impl TemplateList {
    pub fn new<I, S>(templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            templates
                .into_iter()
                .map(Into::into)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        )
    }

    /// Split a `;`-separated template string.
    pub fn parse(joined: &str) -> Self {
        Self::new(joined.split(';'))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<'de> Deserialize<'de> for TemplateList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Joined(String),
            Listed(Vec<String>),
        }

        Ok(match Option::<Wire>::deserialize(deserializer)? {
            Some(Wire::Joined(joined)) => TemplateList::parse(&joined),
            Some(Wire::Listed(list)) => TemplateList::new(list),
            None => TemplateList::default(),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternLibrary {
    pub fields: BTreeMap<String, TemplateList>,
    pub locations: BTreeMap<String, String>,
    pub sections: BTreeMap<String, String>,
    pub scroll: TemplateList,
}

impl PatternLibrary {
    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Templates declared for a field type; empty when the type is absent.
    pub fn templates(&self, field_type: &str) -> &[String] {
        self.fields
            .get(field_type)
            .map(TemplateList::as_slice)
            .unwrap_or_default()
    }

    pub fn location(&self, name: &str) -> Option<&str> {
        self.locations.get(name).map(String::as_str)
    }

    pub fn section(&self, name: &str) -> Option<&str> {
        self.sections.get(name).map(String::as_str)
    }
}

/// Pattern libraries registered by name.
#[derive(Clone, Debug, Default)]
pub struct TemplateStore {
    libraries: HashMap<String, Arc<PatternLibrary>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, library: PatternLibrary) {
        self.libraries.insert(name.into(), Arc::new(library));
    }

    pub fn get(&self, name: &str) -> Option<Arc<PatternLibrary>> {
        self.libraries.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.libraries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// Load one library file and register it under its stem (`shop.pattern.yaml` becomes `shop`).
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<String, LocatorError> {
        let path = path.as_ref();
        let name = library_name(path)
            .ok_or_else(|| LocatorError::template_load(path.display(), "file has no usable name"))?;
        self.load_file_as(name.clone(), path)?;
        Ok(name)
    }

    pub fn load_file_as(
        &mut self,
        name: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<(), LocatorError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|err| LocatorError::template_load(path.display(), err))?;
        let library = if has_extension(path, &["json"]) {
            serde_json::from_str(&raw)
                .map_err(|err| LocatorError::template_load(path.display(), err))?
        } else {
            PatternLibrary::from_yaml_str(&raw)
                .map_err(|err| LocatorError::template_load(path.display(), err))?
        };
        let name = name.into();
        debug!(library = %name, path = %path.display(), "pattern library loaded");
        self.register(name, library);
        Ok(())
    }

    /// Load every `.yaml`, `.yml` and `.json` file in `dir`, in file-name order.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<Vec<String>, LocatorError> {
        let dir = dir.as_ref();
        let entries =
            fs::read_dir(dir).map_err(|err| LocatorError::template_load(dir.display(), err))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|err| LocatorError::template_load(dir.display(), err))?
                .path();
            if path.is_file() && has_extension(&path, &["yaml", "yml", "json"]) {
                files.push(path);
            }
        }
        files.sort();

        files.iter().map(|path| self.load_file(path)).collect()
    }

    /// Load a file or a directory of libraries.
    pub fn load_path(&mut self, path: impl AsRef<Path>) -> Result<Vec<String>, LocatorError> {
        let path = path.as_ref();
        if path.is_dir() {
            self.load_dir(path)
        } else {
            self.load_file(path).map(|name| vec![name])
        }
    }
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| allowed.iter().any(|a| ext.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

fn library_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let name = stem.strip_suffix(".pattern").unwrap_or(stem);
    (!name.is_empty()).then(|| name.to_string())
}
