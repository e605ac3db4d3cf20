//! Query execution over document snapshots
//!
//! All functions are pure: they consume a candidate vector and return
//! the filtered/sorted/truncated result. Field lookups traverse
//! dot-paths through JSON objects only: hitting a non-object mid-path
//! means "not found", and a condition over a missing or null field
//! simply does not match.

use std::cmp::Ordering;

use serde_json::Value;

use crate::query::parser::{CompareOp, OrderDirection, Query, WhereCondition};
use crate::store::Document;

/// Resolve a dot-path against a JSON value. Traversal only descends
/// through objects; anything else mid-path yields `None`.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Keep every document that matches all conditions (AND semantics)
pub fn apply_where(items: Vec<Document>, conditions: &[WhereCondition]) -> Vec<Document> {
    if conditions.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|doc| conditions.iter().all(|cond| matches(doc, cond)))
        .collect()
}

fn matches(doc: &Document, cond: &WhereCondition) -> bool {
    let resolved = resolve_path(&doc.value, &cond.field);

    // `field == true` doubles as the existence check: present and
    // non-null passes, regardless of the field's actual value.
    if cond.operator == CompareOp::Eq && cond.value == Value::Bool(true) {
        return resolved.is_some_and(|v| !v.is_null());
    }

    let Some(field_value) = resolved else {
        return false;
    };
    if field_value.is_null() {
        return false;
    }

    match (cond.operator, partial_compare(field_value, &cond.value)) {
        (CompareOp::Eq, ordering) => ordering == Some(Ordering::Equal),
        // Values of different types are never equal, so a cross-type
        // `!=` matches
        (CompareOp::Ne, ordering) => ordering != Some(Ordering::Equal),
        (CompareOp::Gt, Some(ordering)) => ordering == Ordering::Greater,
        (CompareOp::Ge, Some(ordering)) => ordering != Ordering::Less,
        (CompareOp::Lt, Some(ordering)) => ordering == Ordering::Less,
        (CompareOp::Le, Some(ordering)) => ordering != Ordering::Greater,
        // Ordering against an incomparable type fails the condition
        (_, None) => false,
    }
}

/// Compare two JSON scalars of the same type. `None` means the pair is
/// not comparable (different types, or non-scalar values).
fn partial_compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x.as_f64().and_then(|x| x.partial_cmp(&y.as_f64()?))
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Stable sort by a dot-path field. Documents whose field is missing
/// or null sort with the empty string. Descending order reverses the
/// key comparison only, so equal keys keep their original relative
/// order in both directions.
pub fn apply_order_by(
    mut items: Vec<Document>,
    field: &str,
    direction: OrderDirection,
) -> Vec<Document> {
    let empty = Value::String(String::new());

    items.sort_by(|a, b| {
        let ka = resolve_path(&a.value, field)
            .filter(|v| !v.is_null())
            .unwrap_or(&empty);
        let kb = resolve_path(&b.value, field)
            .filter(|v| !v.is_null())
            .unwrap_or(&empty);
        let ordering = sort_order(ka, kb);
        match direction {
            OrderDirection::Asc => ordering,
            OrderDirection::Desc => ordering.reverse(),
        }
    });
    items
}

/// Total order over JSON values for sorting: rank by type first so a
/// mixed-type collection still sorts deterministically, then compare
/// within the type. Arrays and objects compare equal (stability keeps
/// their original order).
fn sort_order(a: &Value, b: &Value) -> Ordering {
    fn type_rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Truncate to the first `n` items; `None` or `0` is a no-op
pub fn apply_limit(items: Vec<Document>, limit: Option<usize>) -> Vec<Document> {
    match limit {
        Some(n) if n > 0 => items.into_iter().take(n).collect(),
        _ => items,
    }
}

/// Run a full query: where, then order_by, then limit.
pub fn execute(items: Vec<Document>, query: &Query) -> Vec<Document> {
    // TODO: wire query.start_after into the pipeline once keyset
    // pagination semantics are settled; until then the cursor is
    // accepted and ignored.
    let mut items = apply_where(items, &query.conditions);
    if let Some(field) = &query.order_by {
        items = apply_order_by(items, field, query.order_direction);
    }
    apply_limit(items, query.limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::{parse_query_params, parse_where_condition};
    use chrono::Utc;
    use serde_json::json;

    fn doc(key: &str, value: Value) -> Document {
        Document {
            id: format!("test:{key}"),
            collection: "test".to_string(),
            key: key.to_string(),
            value,
            owner: "tester".to_string(),
            created_at: Utc::now(),
        }
    }

    fn keys(items: &[Document]) -> Vec<&str> {
        items.iter().map(|d| d.key.as_str()).collect()
    }

    #[test]
    fn test_resolve_path_nesting() {
        let value = json!({"a": {"b": {"c": 7}}, "list": [1, 2]});

        assert_eq!(resolve_path(&value, "a.b.c"), Some(&json!(7)));
        assert_eq!(resolve_path(&value, "a.b"), Some(&json!({"c": 7})));
        assert_eq!(resolve_path(&value, "a.x"), None);
        // Traversal through a non-object yields not-found
        assert_eq!(resolve_path(&value, "list.0"), None);
        assert_eq!(resolve_path(&value, "a.b.c.d"), None);
    }

    #[test]
    fn test_where_numeric() {
        let items = vec![
            doc("cold", json!({"temperature": 18})),
            doc("warm", json!({"temperature": 25})),
            doc("hot", json!({"temperature": 31.5})),
        ];
        let cond = parse_where_condition("temperature>=25");

        let result = apply_where(items, &[cond]);
        assert_eq!(keys(&result), vec!["warm", "hot"]);
    }

    #[test]
    fn test_where_missing_field_fails_closed() {
        let items = vec![
            doc("has", json!({"temperature": 20})),
            doc("lacks", json!({"humidity": 40})),
            doc("null", json!({"temperature": null})),
        ];
        let cond = parse_where_condition("temperature>0");

        let result = apply_where(items, &[cond]);
        assert_eq!(keys(&result), vec!["has"]);
    }

    #[test]
    fn test_existence_check() {
        let items = vec![
            doc("missing", json!({"other": 1})),
            doc("null", json!({"name": null})),
            doc("empty", json!({"name": ""})),
            doc("set", json!({"name": "x"})),
        ];
        let cond = parse_where_condition("name");

        let result = apply_where(items, &[cond]);
        // Present-and-non-null passes; the empty string counts
        assert_eq!(keys(&result), vec!["empty", "set"]);
    }

    #[test]
    fn test_cross_type_comparisons() {
        let items = vec![doc("a", json!({"v": "text"}))];

        // Cross-type equality never matches
        let eq = parse_where_condition("v==5");
        assert!(apply_where(items.clone(), &[eq]).is_empty());

        // Cross-type inequality always matches
        let ne = parse_where_condition("v!=5");
        assert_eq!(apply_where(items.clone(), &[ne]).len(), 1);

        // Cross-type ordering fails the condition instead of erroring
        let gt = parse_where_condition("v>5");
        assert!(apply_where(items, &[gt]).is_empty());
    }

    #[test]
    fn test_multiple_conditions_and() {
        let items = vec![
            doc("a", json!({"t": 25, "h": 50})),
            doc("b", json!({"t": 25, "h": 90})),
            doc("c", json!({"t": 10, "h": 50})),
        ];
        let conds = vec![
            parse_where_condition("t>=20"),
            parse_where_condition("h<80"),
        ];

        let result = apply_where(items, &conds);
        assert_eq!(keys(&result), vec!["a"]);
    }

    #[test]
    fn test_order_by_stable() {
        let items = vec![
            doc("first", json!({"v": 2})),
            doc("second", json!({"v": 1})),
            doc("third", json!({"v": 2})),
        ];

        let result = apply_order_by(items, "v", OrderDirection::Asc);
        // Equal keys retain original relative order
        assert_eq!(keys(&result), vec!["second", "first", "third"]);
    }

    #[test]
    fn test_order_by_desc_preserves_ties() {
        let items = vec![
            doc("first", json!({"v": 2})),
            doc("second", json!({"v": 1})),
            doc("third", json!({"v": 2})),
        ];

        let result = apply_order_by(items, "v", OrderDirection::Desc);
        assert_eq!(keys(&result), vec!["first", "third", "second"]);
    }

    #[test]
    fn test_order_by_missing_sorts_as_empty_string() {
        let items = vec![
            doc("named", json!({"name": "zoe"})),
            doc("anon", json!({})),
            doc("early", json!({"name": "abe"})),
        ];

        let result = apply_order_by(items, "name", OrderDirection::Asc);
        // "" sorts before any non-empty string
        assert_eq!(keys(&result), vec!["anon", "early", "named"]);
    }

    #[test]
    fn test_limit() {
        let items: Vec<Document> = (0..5).map(|i| doc(&format!("k{i}"), json!({}))).collect();

        assert_eq!(apply_limit(items.clone(), Some(2)).len(), 2);
        assert_eq!(apply_limit(items.clone(), None).len(), 5);
        assert_eq!(apply_limit(items, Some(0)).len(), 5);
    }

    #[test]
    fn test_execute_pipeline() {
        let items = vec![
            doc("a", json!({"t": 30})),
            doc("b", json!({"t": 10})),
            doc("c", json!({"t": 20})),
            doc("d", json!({"t": 25})),
        ];
        let query = parse_query_params([
            ("where", "t>=20"),
            ("orderBy", "t"),
            ("limit", "2"),
        ]);

        let result = execute(items, &query);
        assert_eq!(keys(&result), vec!["c", "d"]);
    }

    #[test]
    fn test_start_after_is_inert() {
        let items = vec![
            doc("a", json!({"t": 1})),
            doc("b", json!({"t": 2})),
        ];
        let with = parse_query_params([("orderBy", "t"), ("startAfter", "a")]);
        let without = parse_query_params([("orderBy", "t")]);

        assert_eq!(
            keys(&execute(items.clone(), &with)),
            keys(&execute(items, &without))
        );
    }
}
