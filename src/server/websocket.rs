//! WebSocket endpoint for the real-time feed
//!
//! `GET /ws` upgrades the connection and registers it with the
//! broadcast hub. The server pushes every change event as a JSON text
//! frame; inbound text frames are logged and otherwise ignored
//! (clients use them as keep-alives), pings are answered with pongs.
//! The subscription is torn down when the connection ends for any
//! reason.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::routes::error_response;
use crate::server::AppState;

/// WebSocket type after upgrade
type HyperWebSocket =
    hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>;

/// Handle the `/ws` upgrade request
pub async fn handle_ws_upgrade(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    if !hyper_tungstenite::is_upgrade_request(&req) {
        return error_response(StatusCode::BAD_REQUEST, "WebSocket upgrade required");
    }

    match hyper_tungstenite::upgrade(req, None) {
        Ok((response, websocket)) => {
            tokio::spawn(async move {
                match websocket.await {
                    Ok(ws) => {
                        if let Err(e) = handle_connection(state, ws).await {
                            warn!("WebSocket connection error: {}", e);
                        }
                    }
                    Err(e) => {
                        error!("WebSocket upgrade failed: {:?}", e);
                    }
                }
            });

            let (parts, _body) = response.into_parts();
            Response::from_parts(parts, Full::new(Bytes::new()))
        }
        Err(e) => {
            error!("WebSocket upgrade error: {:?}", e);
            error_response(StatusCode::BAD_REQUEST, "WebSocket upgrade failed")
        }
    }
}

/// Pump events to one subscriber until it disconnects
async fn handle_connection(
    state: Arc<AppState>,
    ws: HyperWebSocket,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (mut sender, mut receiver) = ws.split();
    let (subscriber_id, mut events) = state.hub.subscribe();

    info!(
        "WebSocket client connected ({} total)",
        state.hub.subscriber_count()
    );

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(payload) => {
                        if sender.send(WsMessage::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        debug!("WebSocket message received: {}", text);
                    }
                    Some(Ok(WsMessage::Close(_))) => break,
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = sender.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.hub.unsubscribe(subscriber_id);
    info!(
        "WebSocket client disconnected ({} remaining)",
        state.hub.subscriber_count()
    );

    Ok(())
}
