//! Query-string parsing
//!
//! `where` clauses arrive as `field<op>value` text. The operator scan
//! tries longer tokens first so `=` never shadows `==`; the value is
//! coerced by shape (bool, number, quoted string) and otherwise kept
//! as the raw string. A clause with no operator at all becomes an
//! existence check on the field.

use serde::Serialize;
use serde_json::Value;

/// Comparison operator of a where clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompareOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
}

/// One parsed where clause
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhereCondition {
    pub field: String,
    pub operator: CompareOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// A fully parsed query
#[derive(Debug, Clone, Serialize)]
pub struct Query {
    #[serde(rename = "where")]
    pub conditions: Vec<WhereCondition>,
    pub order_by: Option<String>,
    pub order_direction: OrderDirection,
    pub limit: Option<usize>,
    /// Keyset-pagination cursor. Parsed and echoed back, not applied.
    pub start_after: Option<String>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            order_by: None,
            order_direction: OrderDirection::Asc,
            limit: None,
            start_after: None,
        }
    }
}

/// Operator tokens in scan priority order. Longer tokens come first:
/// `=` is a substring of `==`, so it must be tried last.
const OPERATORS: &[(&str, CompareOp)] = &[
    (">=", CompareOp::Ge),
    ("<=", CompareOp::Le),
    ("!=", CompareOp::Ne),
    ("==", CompareOp::Eq),
    (">", CompareOp::Gt),
    ("<", CompareOp::Lt),
    ("=", CompareOp::Eq),
];

/// Parse one where clause like `temperature>=25` or `name=="John"`.
///
/// The field side is trimmed; the value side is taken verbatim. A
/// clause with no operator is an existence check: the field must be
/// present and non-null.
pub fn parse_where_condition(text: &str) -> WhereCondition {
    for (token, operator) in OPERATORS {
        if let Some(at) = text.find(token) {
            let field = text[..at].trim().to_string();
            let raw = &text[at + token.len()..];
            return WhereCondition {
                field,
                operator: *operator,
                value: coerce_value(raw),
            };
        }
    }

    WhereCondition {
        field: text.trim().to_string(),
        operator: CompareOp::Eq,
        value: Value::Bool(true),
    }
}

/// Coerce a raw where-clause value by shape
fn coerce_value(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }

    // Digits-and-dots with at least one digit: numeric candidate.
    // A leading sign disqualifies it, so negative numbers stay strings.
    let digits_and_dots =
        !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit() || c == '.');
    if digits_and_dots && raw.chars().any(|c| c.is_ascii_digit()) {
        if raw.contains('.') {
            if let Ok(float) = raw.parse::<f64>() {
                if let Some(number) = serde_json::Number::from_f64(float) {
                    return Value::Number(number);
                }
            }
        } else if let Ok(int) = raw.parse::<i64>() {
            return Value::Number(int.into());
        }
        // Parse failure (e.g. "1.2.3") falls through to the raw string
    }

    if let Some(unquoted) = strip_quotes(raw) {
        return Value::String(unquoted.to_string());
    }

    Value::String(raw.to_string())
}

fn strip_quotes(raw: &str) -> Option<&str> {
    if raw.len() < 2 {
        return None;
    }
    raw.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
}

/// Assemble a [`Query`] from query-string pairs. Repeated `where`
/// entries are kept in arrival order (AND semantics). An unparseable
/// `limit` becomes `None`, not an error.
pub fn parse_query_params<'a, I>(pairs: I) -> Query
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut query = Query::default();

    for (key, value) in pairs {
        match key {
            "where" => query.conditions.push(parse_where_condition(value)),
            "orderBy" => query.order_by = Some(value.to_string()),
            "limit" => query.limit = value.parse::<usize>().ok(),
            "startAfter" => query.start_after = Some(value.to_string()),
            _ => {}
        }
    }

    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_comparison() {
        let cond = parse_where_condition("temperature>=25");
        assert_eq!(cond.field, "temperature");
        assert_eq!(cond.operator, CompareOp::Ge);
        assert_eq!(cond.value, json!(25));
    }

    #[test]
    fn test_longer_tokens_win() {
        // "==" must not be split as "=" + "="
        let cond = parse_where_condition("name==John");
        assert_eq!(cond.operator, CompareOp::Eq);
        assert_eq!(cond.value, json!("John"));

        // Single "=" normalizes to equality
        let cond = parse_where_condition("name=John");
        assert_eq!(cond.operator, CompareOp::Eq);
        assert_eq!(cond.value, json!("John"));

        let cond = parse_where_condition("count!=3");
        assert_eq!(cond.operator, CompareOp::Ne);
        assert_eq!(cond.value, json!(3));
    }

    #[test]
    fn test_value_coercion() {
        assert_eq!(parse_where_condition("active==TRUE").value, json!(true));
        assert_eq!(parse_where_condition("active==false").value, json!(false));
        assert_eq!(parse_where_condition("n==42").value, json!(42));
        assert_eq!(parse_where_condition("n==3.5").value, json!(3.5));
        // Quoted strings unquote
        assert_eq!(parse_where_condition("status=='ok'").value, json!("ok"));
        assert_eq!(parse_where_condition("status==\"ok\"").value, json!("ok"));
        // Negative numbers and malformed decimals stay strings
        assert_eq!(parse_where_condition("n==-5").value, json!("-5"));
        assert_eq!(parse_where_condition("v==1.2.3").value, json!("1.2.3"));
    }

    #[test]
    fn test_bare_field_is_existence_check() {
        let cond = parse_where_condition("name");
        assert_eq!(cond.field, "name");
        assert_eq!(cond.operator, CompareOp::Eq);
        assert_eq!(cond.value, json!(true));
    }

    #[test]
    fn test_dot_path_field() {
        let cond = parse_where_condition("location.city=='Berlin'");
        assert_eq!(cond.field, "location.city");
        assert_eq!(cond.value, json!("Berlin"));
    }

    #[test]
    fn test_parse_query_params() {
        let query = parse_query_params([
            ("where", "temperature>20"),
            ("where", "humidity<80"),
            ("orderBy", "temperature"),
            ("limit", "10"),
            ("startAfter", "cursor123"),
            ("ignored", "x"),
        ]);

        assert_eq!(query.conditions.len(), 2);
        assert_eq!(query.conditions[0].field, "temperature");
        assert_eq!(query.conditions[1].field, "humidity");
        assert_eq!(query.order_by.as_deref(), Some("temperature"));
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.start_after.as_deref(), Some("cursor123"));
        assert_eq!(query.order_direction, OrderDirection::Asc);
    }

    #[test]
    fn test_bad_limit_is_none() {
        let query = parse_query_params([("limit", "ten")]);
        assert_eq!(query.limit, None);
    }
}
