//! MQTT device-ingestion bridge
//!
//! A long-running loop that consumes device messages from an MQTT
//! broker and writes them into the document store through the same
//! serialized entry point HTTP clients use, then broadcasts the
//! change with `source: "mqtt"`. The bridge acts as a trusted system
//! principal and bypasses collection rules.

pub mod client;
pub mod ingest;

pub use client::MqttClient;
pub use ingest::{route_topic, DeviceBridge, TopicRoute, BRIDGE_OWNER, EVENT_SOURCE};
