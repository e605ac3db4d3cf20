//! Storehouse - real-time rule-gated document store
//!
//! "Bring the whole tithe into the storehouse" - Malachi 3:10
//!
//! Storehouse keeps JSON documents in named collections, gates every
//! read and write with declarative per-collection rules, answers a
//! small filter/sort/limit query language, and fans each successful
//! mutation out to live WebSocket subscribers. An MQTT bridge lets
//! devices write into the same store through the same mutation and
//! broadcast pipeline.
//!
//! ## Services
//!
//! - **Store**: in-memory keyed document table with per-id mutation
//!   serialization
//! - **Rules**: closed-grammar access predicates per collection
//! - **Query**: where/orderBy/limit execution over collection snapshots
//! - **Realtime**: best-effort change fan-out to WebSocket subscribers
//! - **Bridge**: MQTT device ingestion as a trusted system principal

pub mod auth;
pub mod bridge;
pub mod config;
pub mod query;
pub mod realtime;
pub mod routes;
pub mod rules;
pub mod server;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, StorehouseError};
