//! HTTP and WebSocket serving

pub mod http;
pub mod websocket;

pub use http::{run, AppState};
