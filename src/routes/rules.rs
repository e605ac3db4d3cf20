//! Security-rule endpoints
//!
//! Rule management is a privileged surface: both endpoints require an
//! authenticated principal. Updates are validated against the closed
//! grammar: an expression that does not parse is rejected with 400
//! and nothing is stored.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::routes::{error_response, forbidden, json_response};
use crate::server::AppState;

/// Body of `POST /security/rules/{collection}`
#[derive(Debug, Deserialize)]
pub struct RuleUpdateRequest {
    pub read: Option<String>,
    pub write: Option<String>,
}

/// `GET /security/rules`
pub fn handle_get_rules(state: &AppState, principal: Option<&str>) -> Response<Full<Bytes>> {
    if principal.is_none() {
        return forbidden("Authentication required");
    }

    let table: Map<String, Value> = state
        .rules
        .snapshot()
        .into_iter()
        .map(|(collection, (read, write))| {
            (collection, json!({ "read": read, "write": write }))
        })
        .collect();

    json_response(StatusCode::OK, &Value::Object(table))
}

/// `POST /security/rules/{collection}`
pub fn handle_update_rule(
    state: &AppState,
    principal: Option<&str>,
    collection: &str,
    body: &[u8],
) -> Response<Full<Bytes>> {
    if principal.is_none() {
        return forbidden("Authentication required");
    }

    let request: RuleUpdateRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("invalid request body: {e}"),
            )
        }
    };

    if request.read.is_none() && request.write.is_none() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "at least one of 'read' or 'write' must be provided",
        );
    }

    match state.rules.update(
        collection,
        request.read.as_deref(),
        request.write.as_deref(),
    ) {
        Ok(()) => {
            info!("Rules updated for {}", collection);
            json_response(
                StatusCode::OK,
                &json!({
                    "success": true,
                    "message": format!("Rules updated for {collection}"),
                }),
            )
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn body_json(resp: Response<Full<Bytes>>) -> Value {
        let bytes = futures::executor::block_on(async {
            resp.into_body().collect().await.unwrap().to_bytes()
        });
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_rules_require_auth() {
        let state = AppState::for_tests();
        assert_eq!(
            handle_get_rules(&state, None).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            handle_update_rule(&state, None, "notes", br#"{"read":"true"}"#).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_get_rules_renders_expressions() {
        let state = AppState::for_tests();
        let body = body_json(handle_get_rules(&state, Some("alice")));

        assert_eq!(body["sensors"]["read"], json!("true"));
        assert_eq!(body["sensors"]["write"], json!("resource.owner == auth.uid"));
        assert_eq!(body["admin"]["read"], json!("auth.uid == 'admin'"));
    }

    #[test]
    fn test_update_and_reject_invalid() {
        let state = AppState::for_tests();

        let resp = handle_update_rule(
            &state,
            Some("alice"),
            "notes",
            br#"{"read":"true","write":"auth != null"}"#,
        );
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(state.rules.validate_read("notes", None, None));

        // Free-form text never becomes a rule
        let resp = handle_update_rule(
            &state,
            Some("alice"),
            "notes",
            br#"{"write":"let everyone in"}"#,
        );
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        // Previous predicate untouched
        assert!(state.rules.validate_write("notes", Some("bob"), None));

        // An empty update is a bad request, not a silent no-op
        let resp = handle_update_rule(&state, Some("alice"), "notes", b"{}");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
