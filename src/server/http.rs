//! HTTP server implementation
//!
//! hyper http1 with TokioIo for async handling; one spawned task per
//! connection, upgrades enabled for the WebSocket endpoint.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::principal_from_headers;
use crate::config::Args;
use crate::realtime::BroadcastHub;
use crate::routes::{self, error_response};
use crate::rules::RuleStore;
use crate::server::websocket;
use crate::store::DataStore;
use crate::types::StorehouseError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub store: Arc<DataStore>,
    pub rules: Arc<RuleStore>,
    pub hub: Arc<BroadcastHub>,
    /// Set by the device bridge's event loop
    pub mqtt_connected: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(args: Args) -> Self {
        Self {
            args,
            store: Arc::new(DataStore::new()),
            rules: Arc::new(RuleStore::with_defaults()),
            hub: Arc::new(BroadcastHub::new()),
            mqtt_connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mqtt_connected(&self) -> bool {
        self.mqtt_connected.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        use clap::Parser;
        Self::new(Args::parse_from(["storehouse"]))
    }
}

/// Run the HTTP server until the process exits
pub async fn run(state: Arc<AppState>) -> Result<(), StorehouseError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Storehouse listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        warn!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());
    let principal = principal_from_headers(req.headers());

    info!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        (Method::GET, "/") => routes::status::handle_root(),
        (Method::GET, "/health") | (Method::GET, "/healthz") => routes::status::handle_health(),
        (Method::GET, "/version") => routes::status::handle_version(),
        (Method::GET, "/system/status") => routes::status::handle_status(&state),

        // Real-time feed
        (Method::GET, "/ws") => websocket::handle_ws_upgrade(Arc::clone(&state), req).await,

        (Method::POST, "/data/set") => {
            let body = req.into_body().collect().await?.to_bytes();
            routes::data::handle_set(&state, principal.as_deref(), &body)
        }
        (Method::GET, p) if p.starts_with("/data/get/") => {
            match split_collection_key(p, "/data/get/") {
                Some((collection, key)) => {
                    routes::data::handle_get(&state, principal.as_deref(), &collection, &key)
                }
                None => bad_route(p),
            }
        }
        (Method::GET, p) if p.starts_with("/data/list/") => {
            match single_segment(p, "/data/list/") {
                Some(collection) => {
                    routes::data::handle_list(&state, principal.as_deref(), &collection)
                }
                None => bad_route(p),
            }
        }
        (Method::GET, p) if p.starts_with("/data/query/") => {
            match single_segment(p, "/data/query/") {
                Some(collection) => {
                    let params = parse_query_pairs(query.as_deref().unwrap_or(""));
                    routes::data::handle_query(&state, principal.as_deref(), &collection, &params)
                }
                None => bad_route(p),
            }
        }
        (Method::DELETE, p) if p.starts_with("/data/delete/") => {
            match split_collection_key(p, "/data/delete/") {
                Some((collection, key)) => {
                    routes::data::handle_delete(&state, principal.as_deref(), &collection, &key)
                }
                None => bad_route(p),
            }
        }
        (Method::DELETE, p) if p.starts_with("/data/clear/") => {
            match single_segment(p, "/data/clear/") {
                Some(collection) => {
                    routes::data::handle_clear(&state, principal.as_deref(), &collection)
                }
                None => bad_route(p),
            }
        }

        (Method::GET, "/security/rules") => {
            routes::rules::handle_get_rules(&state, principal.as_deref())
        }
        (Method::POST, p) if p.starts_with("/security/rules/") => {
            match single_segment(p, "/security/rules/") {
                Some(collection) => {
                    let body = req.into_body().collect().await?.to_bytes();
                    routes::rules::handle_update_rule(
                        &state,
                        principal.as_deref(),
                        &collection,
                        &body,
                    )
                }
                None => bad_route(p),
            }
        }

        (_, p) => routes::not_found(&format!("No route for {p}")),
    };

    Ok(response)
}

fn bad_route(path: &str) -> Response<Full<Bytes>> {
    error_response(StatusCode::BAD_REQUEST, &format!("Invalid route: {path}"))
}

/// Percent-decode one path segment after `prefix`; rejects empty or
/// multi-segment remainders.
fn single_segment(path: &str, prefix: &str) -> Option<String> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.contains('/') {
        return None;
    }
    decode(rest)
}

/// Percent-decode `{collection}/{key}` after `prefix`. The key is the
/// remainder, so keys containing `/` survive round-trips.
fn split_collection_key(path: &str, prefix: &str) -> Option<(String, String)> {
    let rest = path.strip_prefix(prefix)?;
    let (collection, key) = rest.split_once('/')?;
    if collection.is_empty() || key.is_empty() {
        return None;
    }
    Some((decode(collection)?, decode(key)?))
}

/// Split a raw query string into decoded key/value pairs, preserving
/// arrival order (repeated keys are meaningful for `where`).
fn parse_query_pairs(query: &str) -> Vec<(String, String)> {
    if query.is_empty() {
        return Vec::new();
    }

    query
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = decode(parts.next()?)?;
            let value = decode(parts.next().unwrap_or(""))?;
            Some((key, value))
        })
        .collect()
}

fn decode(raw: &str) -> Option<String> {
    urlencoding::decode(raw).ok().map(|s| s.into_owned())
}
