//! Query parsing and execution
//!
//! A query is built fresh per request from query-string parameters:
//! repeated `where` clauses (AND semantics), an optional `orderBy`
//! field path, an optional `limit`, and an accepted-but-unapplied
//! `startAfter` cursor. Execution is pure filtering/sorting over a
//! snapshot of candidate documents: a type mismatch or missing field
//! is never an error, it just fails the condition.

pub mod engine;
pub mod parser;

pub use engine::{apply_limit, apply_order_by, apply_where, execute, resolve_path};
pub use parser::{
    parse_query_params, parse_where_condition, CompareOp, OrderDirection, Query, WhereCondition,
};
