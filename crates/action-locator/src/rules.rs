//! Per-category matching rules and snapshot ranking.
//!
//! Each category owns a static table of `(priority, predicate, description)` rules in ascending
//! priority. A record is matched by the first rule whose predicate holds. Signals rank as: exact
//! label, exact text, exact aria-label, exact name, then the partial variants, then the exact
//! `type` attribute as a last resort. All comparisons ignore case.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use perceiver_structural::{ElementRecord, Snapshot};
use serde::Serialize;

use crate::errors::LocatorError;

/// Element categories the heuristic resolver understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Button,
    Input,
    Radio,
    Checkbox,
    Dropdown,
    Link,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Button,
        Category::Input,
        Category::Radio,
        Category::Checkbox,
        Category::Dropdown,
        Category::Link,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Button => "button",
            Category::Input => "input",
            Category::Radio => "radio",
            Category::Checkbox => "checkbox",
            Category::Dropdown => "dropdown",
            Category::Link => "link",
        }
    }

    /// Whether `record` belongs to this category at all, before any rule runs.
    pub fn admits(&self, record: &ElementRecord) -> bool {
        let item_type = if record.semantic_type.is_empty() {
            record.tag.as_str()
        } else {
            record.semantic_type.as_str()
        };
        let is = |value: &str| item_type.eq_ignore_ascii_case(value);
        let tag_is = |value: &str| record.tag.eq_ignore_ascii_case(value);
        match self {
            Category::Radio => is("radio"),
            Category::Checkbox => is("checkbox"),
            Category::Button => is("button") || tag_is("button"),
            Category::Input => tag_is("input") && !is("radio") && !is("checkbox"),
            Category::Dropdown => is("dropdown") || tag_is("select") || tag_is("button"),
            Category::Link => is("link"),
        }
    }

    pub fn rules(&self) -> &'static [Rule] {
        match self {
            Category::Button => BUTTON_RULES,
            Category::Input => INPUT_RULES,
            Category::Radio => RADIO_RULES,
            Category::Checkbox => CHECKBOX_RULES,
            Category::Dropdown => DROPDOWN_RULES,
            Category::Link => LINK_RULES,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "button" => Ok(Category::Button),
            "input" | "textbox" => Ok(Category::Input),
            "radio" => Ok(Category::Radio),
            "checkbox" => Ok(Category::Checkbox),
            "dropdown" | "select" => Ok(Category::Dropdown),
            "link" => Ok(Category::Link),
            _ => Err(LocatorError::UnsupportedCategory(s.trim().to_string())),
        }
    }
}

/// Query side of a rule: the field text and the section scope, both lowercased once.
#[derive(Clone, Debug)]
pub struct RuleQuery {
    text: String,
    section: String,
}

impl RuleQuery {
    pub fn new(text: &str, section: &str) -> Self {
        Self {
            text: text.trim().to_lowercase(),
            section: section.trim().to_lowercase(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn section(&self) -> &str {
        &self.section
    }
}

pub type Predicate = fn(&ElementRecord, &RuleQuery) -> bool;

pub struct Rule {
    pub priority: u16,
    pub predicate: Predicate,
    pub description: &'static str,
}

impl Rule {
    pub fn matches(&self, record: &ElementRecord, query: &RuleQuery) -> bool {
        (self.predicate)(record, query)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("priority", &self.priority)
            .field("description", &self.description)
            .finish()
    }
}

/// A ranked record with the rule that claimed it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RuleMatch<'a> {
    pub record: &'a ElementRecord,
    pub priority: u16,
    pub description: &'static str,
}

/// Evaluate `category` rules over `snapshot`.
///
/// Records are claimed by their first matching rule, collapsed by
/// [`ElementRecord::dedupe_key`] (first claim wins) and ordered by `(priority, dom_index)`.
pub fn rank<'a>(snapshot: &'a Snapshot, category: Category, query: &RuleQuery) -> Vec<RuleMatch<'a>> {
    let rules = category.rules();
    let mut seen = HashSet::new();
    let mut matches: Vec<RuleMatch<'a>> = snapshot
        .elements
        .iter()
        .filter(|record| category.admits(record))
        .filter_map(|record| {
            let rule = rules.iter().find(|rule| rule.matches(record, query))?;
            seen.insert(record.dedupe_key()).then_some(RuleMatch {
                record,
                priority: rule.priority,
                description: rule.description,
            })
        })
        .collect();
    matches.sort_by_key(|m| (m.priority, m.record.dom_index));
    matches
}

fn same(value: &str, query: &str) -> bool {
    !value.is_empty() && value.to_lowercase() == query
}

fn contains(value: &str, query: &str) -> bool {
    !value.is_empty() && value.to_lowercase().contains(query)
}

fn attr_same(record: &ElementRecord, name: &str, query: &str) -> bool {
    record.attr(name).map_or(false, |value| same(value, query))
}

fn attr_contains(record: &ElementRecord, name: &str, query: &str) -> bool {
    record.attr(name).map_or(false, |value| contains(value, query))
}

fn semantic_is(record: &ElementRecord, value: &str) -> bool {
    record.semantic_type.eq_ignore_ascii_case(value)
}

fn tag_is(record: &ElementRecord, value: &str) -> bool {
    record.tag.eq_ignore_ascii_case(value)
}

fn buttonish(r: &ElementRecord) -> bool {
    tag_is(r, "button") || semantic_is(r, "button")
}

fn inputish(r: &ElementRecord) -> bool {
    tag_is(r, "input") || semantic_is(r, "input")
}

fn radio(r: &ElementRecord) -> bool {
    tag_is(r, "input") && semantic_is(r, "radio")
}

fn checkbox(r: &ElementRecord) -> bool {
    tag_is(r, "input") && semantic_is(r, "checkbox")
}

fn dropdownish(r: &ElementRecord) -> bool {
    tag_is(r, "select") || tag_is(r, "button") || semantic_is(r, "dropdown")
}

fn linkish(r: &ElementRecord) -> bool {
    tag_is(r, "a") || semantic_is(r, "link")
}

fn in_fieldset(r: &ElementRecord, q: &RuleQuery) -> bool {
    // A blank legend never scopes anything, so it cannot match an unscoped query.
    r.fieldset
        .as_deref()
        .map(str::trim)
        .filter(|legend| !legend.is_empty())
        .map_or(false, |legend| legend.to_lowercase() == q.section())
}

static BUTTON_RULES: &[Rule] = &[
    Rule {
        priority: 10,
        predicate: |r, q| buttonish(r) && same(&r.label, q.text()),
        description: "exact label",
    },
    Rule {
        priority: 10,
        predicate: |r, q| buttonish(r) && same(&r.visible_text, q.text()),
        description: "exact text",
    },
    Rule {
        priority: 15,
        predicate: |r, q| buttonish(r) && attr_same(r, "aria-label", q.text()),
        description: "exact aria-label",
    },
    Rule {
        priority: 20,
        predicate: |r, q| buttonish(r) && attr_same(r, "name", q.text()),
        description: "exact name",
    },
    Rule {
        priority: 30,
        predicate: |r, q| {
            buttonish(r) && (contains(&r.label, q.text()) || contains(&r.visible_text, q.text()))
        },
        description: "partial label or text",
    },
    Rule {
        priority: 40,
        predicate: |r, q| buttonish(r) && attr_contains(r, "aria-label", q.text()),
        description: "partial aria-label",
    },
    Rule {
        priority: 50,
        predicate: |r, q| buttonish(r) && attr_contains(r, "name", q.text()),
        description: "partial name",
    },
    Rule {
        priority: 60,
        predicate: |r, q| buttonish(r) && attr_same(r, "type", q.text()),
        description: "exact type",
    },
];

static INPUT_RULES: &[Rule] = &[
    Rule {
        priority: 10,
        predicate: |r, q| inputish(r) && same(&r.label, q.text()),
        description: "exact label",
    },
    Rule {
        priority: 15,
        predicate: |r, q| inputish(r) && same(&r.visible_text, q.text()),
        description: "exact text",
    },
    Rule {
        priority: 20,
        predicate: |r, q| inputish(r) && attr_same(r, "aria-label", q.text()),
        description: "exact aria-label",
    },
    Rule {
        priority: 30,
        predicate: |r, q| inputish(r) && attr_same(r, "placeholder", q.text()),
        description: "exact placeholder",
    },
    Rule {
        priority: 40,
        predicate: |r, q| inputish(r) && attr_same(r, "name", q.text()),
        description: "exact name",
    },
    Rule {
        priority: 50,
        predicate: |r, q| inputish(r) && contains(&r.label, q.text()),
        description: "partial label",
    },
    Rule {
        priority: 60,
        predicate: |r, q| inputish(r) && contains(&r.visible_text, q.text()),
        description: "partial text",
    },
    Rule {
        priority: 70,
        predicate: |r, q| inputish(r) && attr_contains(r, "aria-label", q.text()),
        description: "partial aria-label",
    },
    Rule {
        priority: 80,
        predicate: |r, q| inputish(r) && attr_contains(r, "placeholder", q.text()),
        description: "partial placeholder",
    },
    Rule {
        priority: 90,
        predicate: |r, q| inputish(r) && attr_contains(r, "name", q.text()),
        description: "partial name",
    },
    Rule {
        priority: 100,
        predicate: |r, q| inputish(r) && attr_same(r, "type", q.text()),
        description: "exact type",
    },
];

static RADIO_RULES: &[Rule] = &[
    Rule {
        priority: 10,
        predicate: |r, q| radio(r) && same(&r.label, q.text()) && in_fieldset(r, q),
        description: "exact label within fieldset",
    },
    Rule {
        priority: 15,
        predicate: |r, q| radio(r) && same(&r.label, q.text()),
        description: "exact label",
    },
    Rule {
        priority: 20,
        predicate: |r, q| radio(r) && attr_same(r, "aria-label", q.text()),
        description: "exact aria-label",
    },
    Rule {
        priority: 30,
        predicate: |r, q| radio(r) && attr_same(r, "name", q.text()),
        description: "exact name",
    },
    Rule {
        priority: 40,
        predicate: |r, q| radio(r) && contains(&r.label, q.text()),
        description: "partial label",
    },
    Rule {
        priority: 50,
        predicate: |r, q| radio(r) && attr_contains(r, "aria-label", q.text()),
        description: "partial aria-label",
    },
    Rule {
        priority: 60,
        predicate: |r, q| radio(r) && attr_contains(r, "name", q.text()),
        description: "partial name",
    },
    Rule {
        priority: 70,
        predicate: |r, q| radio(r) && attr_same(r, "type", q.text()),
        description: "exact type",
    },
];

static CHECKBOX_RULES: &[Rule] = &[
    Rule {
        priority: 10,
        predicate: |r, q| {
            checkbox(r) && !q.section().is_empty() && same(&r.label, q.text()) && in_fieldset(r, q)
        },
        description: "exact label within fieldset",
    },
    Rule {
        priority: 15,
        predicate: |r, q| checkbox(r) && same(&r.label, q.text()),
        description: "exact label",
    },
    Rule {
        priority: 20,
        predicate: |r, q| checkbox(r) && attr_same(r, "aria-label", q.text()),
        description: "exact aria-label",
    },
    Rule {
        priority: 30,
        predicate: |r, q| checkbox(r) && attr_same(r, "name", q.text()),
        description: "exact name",
    },
    Rule {
        priority: 40,
        predicate: |r, q| checkbox(r) && contains(&r.label, q.text()),
        description: "partial label",
    },
    Rule {
        priority: 50,
        predicate: |r, q| checkbox(r) && attr_contains(r, "aria-label", q.text()),
        description: "partial aria-label",
    },
    Rule {
        priority: 60,
        predicate: |r, q| checkbox(r) && attr_contains(r, "name", q.text()),
        description: "partial name",
    },
    Rule {
        priority: 70,
        predicate: |r, q| checkbox(r) && attr_same(r, "type", q.text()),
        description: "exact type",
    },
];

static DROPDOWN_RULES: &[Rule] = &[
    Rule {
        priority: 10,
        predicate: |r, q| {
            dropdownish(r) && (same(&r.label, q.text()) || same(&r.visible_text, q.text()))
        },
        description: "exact label or text",
    },
    Rule {
        priority: 15,
        predicate: |r, q| dropdownish(r) && attr_same(r, "aria-label", q.text()),
        description: "exact aria-label",
    },
    Rule {
        priority: 20,
        predicate: |r, q| dropdownish(r) && attr_same(r, "name", q.text()),
        description: "exact name",
    },
    Rule {
        priority: 30,
        predicate: |r, q| {
            dropdownish(r) && (contains(&r.label, q.text()) || contains(&r.visible_text, q.text()))
        },
        description: "partial label or text",
    },
    Rule {
        priority: 40,
        predicate: |r, q| dropdownish(r) && attr_contains(r, "aria-label", q.text()),
        description: "partial aria-label",
    },
    Rule {
        priority: 50,
        predicate: |r, q| dropdownish(r) && attr_contains(r, "name", q.text()),
        description: "partial name",
    },
    Rule {
        priority: 60,
        predicate: |r, q| {
            dropdownish(r) && (attr_same(r, "type", q.text()) || attr_same(r, "role", q.text()))
        },
        description: "exact type or role",
    },
];

static LINK_RULES: &[Rule] = &[
    Rule {
        priority: 10,
        predicate: |r, q| linkish(r) && same(&r.visible_text, q.text()),
        description: "exact text",
    },
    Rule {
        priority: 15,
        predicate: |r, q| linkish(r) && same(&r.label, q.text()),
        description: "exact label",
    },
    Rule {
        priority: 20,
        predicate: |r, q| linkish(r) && attr_same(r, "aria-label", q.text()),
        description: "exact aria-label",
    },
    Rule {
        priority: 30,
        predicate: |r, q| {
            linkish(r) && (contains(&r.visible_text, q.text()) || contains(&r.label, q.text()))
        },
        description: "partial text or label",
    },
    Rule {
        priority: 40,
        predicate: |r, q| linkish(r) && attr_contains(r, "aria-label", q.text()),
        description: "partial aria-label",
    },
];
