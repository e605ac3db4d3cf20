//! HTTP route handlers
//!
//! Handlers return fully-built responses; the server's routing table
//! in `server::http` decides which handler a request reaches.

pub mod data;
pub mod rules;
pub mod status;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

/// Build a JSON response from any serializable payload
pub fn json_response<T: Serialize>(status: StatusCode, payload: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(payload).unwrap_or_default();
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from(r#"{"error":"Internal error"}"#)))
                .unwrap()
        })
}

/// Build a `{"error": …}` response
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": message }))
}

/// 403 with the standard denial message
pub fn forbidden(message: &str) -> Response<Full<Bytes>> {
    error_response(StatusCode::FORBIDDEN, message)
}

/// 404 with the standard message
pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, message)
}
