//! Per-collection access rules
//!
//! A collection carries one read and one write predicate drawn from a
//! small closed grammar. Expressions are parsed once when rules are
//! loaded or updated and evaluated structurally per request: there is
//! no free-form rule language and no user-supplied code execution.

pub mod expr;
pub mod store;

pub use expr::{Resource, ResourceField, RuleExpr};
pub use store::{CollectionRules, RuleStore};
