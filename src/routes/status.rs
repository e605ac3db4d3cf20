//! Service banner, liveness, and status endpoints

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde_json::json;

use crate::routes::json_response;
use crate::server::AppState;

/// `GET /`: service banner
pub fn handle_root() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &json!({
            "message": "Welcome to Storehouse",
            "status": "running",
            "version": env!("CARGO_PKG_VERSION"),
            "features": [
                "Real-time WebSockets",
                "MQTT Integration",
                "Security Rules",
                "Query System",
            ],
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    )
}

/// `GET /health`: liveness probe
pub fn handle_health() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &json!({ "status": "ok" }))
}

/// `GET /version`: build identity
pub fn handle_version() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &json!({
            "version": env!("CARGO_PKG_VERSION"),
            "commit": env!("GIT_COMMIT_SHORT"),
            "built_at": env!("BUILD_TIMESTAMP"),
        }),
    )
}

/// `GET /system/status`: runtime counters
pub fn handle_status(state: &AppState) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &json!({
            "websocket_clients": state.hub.subscriber_count(),
            "mqtt_connected": state.mqtt_connected(),
            "documents": state.store.len(),
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    )
}
