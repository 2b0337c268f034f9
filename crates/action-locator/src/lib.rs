//! Element resolution for fieldscope.
//!
//! Two resolvers share the descriptor grammar from `fieldscope-core-types`:
//! - [`PatternResolver`] substitutes the descriptor into operator-authored selector templates
//!   and retries with scrolling until a visible match appears or time runs out
//! - [`HeuristicResolver`] ranks a DOM snapshot with per-category [`rules`] and verifies the
//!   winner's computed selector against the live page

pub mod chain;
pub mod context;
pub mod errors;
pub mod heuristic;
pub mod pattern;
pub mod rules;
pub mod templates;

pub use chain::{ChainEvaluator, ChainMatch, ChainQuery};
pub use context::LocatorContext;
pub use errors::LocatorError;
pub use heuristic::{select_instance, HeuristicConfig, HeuristicResolver};
pub use pattern::{PatternConfig, PatternResolver};
pub use rules::{rank, Category, Rule, RuleMatch, RuleQuery};
pub use templates::{PatternLibrary, TemplateList, TemplateStore};
