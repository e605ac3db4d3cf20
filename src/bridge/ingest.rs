//! Topic routing and message ingestion
//!
//! Routing is a substring match over the topic, first match wins:
//!
//! - topic containing `sensors` → collection `sensors`, key
//!   `{device_id}_{unix_seconds}`: every reading lands under a fresh
//!   key, readings are never overwritten
//! - topic containing `status` → collection `devices`, key
//!   `{device_id}`: one upserted record per device
//! - anything else (commands included) is logged and dropped
//!
//! A malformed payload is warned about and dropped; the run loop never
//! dies on bad input or a broken broker connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rumqttc::{Event, EventLoop, Packet};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::bridge::client::MqttClient;
use crate::config::MqttArgs;
use crate::realtime::{BroadcastHub, ChangeEvent};
use crate::store::DataStore;

/// Trusted system principal that owns all bridge-written documents
pub const BRIDGE_OWNER: &str = "mqtt_bridge";

/// `source` tag on bridge-originated broadcast events
pub const EVENT_SOURCE: &str = "mqtt";

/// Delay before re-polling after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Where a topic's payload should land
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicRoute {
    /// Append-style sensor readings
    Sensors,
    /// Per-device status upserts
    Status,
    /// Logged and dropped
    Unhandled,
}

/// Classify a topic. Substring match, first match wins.
pub fn route_topic(topic: &str) -> TopicRoute {
    if topic.contains("sensors") {
        TopicRoute::Sensors
    } else if topic.contains("status") {
        TopicRoute::Status
    } else {
        TopicRoute::Unhandled
    }
}

/// The device-ingestion bridge
pub struct DeviceBridge {
    store: Arc<DataStore>,
    hub: Arc<BroadcastHub>,
    client: MqttClient,
    args: MqttArgs,
    connected: Arc<AtomicBool>,
}

impl DeviceBridge {
    pub fn new(
        store: Arc<DataStore>,
        hub: Arc<BroadcastHub>,
        client: MqttClient,
        args: MqttArgs,
        connected: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            hub,
            client,
            args,
            connected,
        }
    }

    /// Drive the event loop forever. Connection errors are logged and
    /// retried after a short delay; rumqttc reconnects on the next
    /// poll. Subscriptions are re-established on every ConnAck so they
    /// survive reconnects.
    pub async fn run(self, mut eventloop: EventLoop) {
        info!("Device bridge {} starting", self.client.name());

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("MQTT connected");
                    self.connected.store(true, Ordering::Relaxed);
                    if let Err(e) = self
                        .client
                        .subscribe_device_topics(&self.args.topic_prefix)
                        .await
                    {
                        warn!("Device topic subscription failed: {}", e);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.ingest(&publish.topic, &publish.payload);
                }
                Ok(_) => {}
                Err(e) => {
                    self.connected.store(false, Ordering::Relaxed);
                    warn!("MQTT connection error: {} (retrying in {:?})", e, RECONNECT_DELAY);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    /// Process one (topic, payload) pair. Returns the `(collection,
    /// key)` written, or `None` when the message was dropped.
    pub fn ingest(&self, topic: &str, payload: &[u8]) -> Option<(String, String)> {
        let value: Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!("Dropping malformed payload on {}: {}", topic, e);
                return None;
            }
        };
        let Some(object) = value.as_object() else {
            warn!("Dropping non-object payload on {}", topic);
            return None;
        };

        let device_id = object
            .get("device_id")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        let (collection, key) = match route_topic(topic) {
            TopicRoute::Sensors => (
                "sensors".to_string(),
                format!("{}_{}", device_id, Utc::now().timestamp()),
            ),
            TopicRoute::Status => ("devices".to_string(), device_id.to_string()),
            TopicRoute::Unhandled => {
                debug!("Unhandled topic {}, dropping", topic);
                return None;
            }
        };

        self.write_and_broadcast(&collection, &key, object.clone(), topic)
    }

    fn write_and_broadcast(
        &self,
        collection: &str,
        key: &str,
        payload: Map<String, Value>,
        topic: &str,
    ) -> Option<(String, String)> {
        match self.store.set(collection, key, payload, BRIDGE_OWNER) {
            Ok(doc) => {
                self.hub
                    .publish(&ChangeEvent::update(&doc.collection, &doc.key).with_source(EVENT_SOURCE));
                info!("Device data stored: {}/{} (topic {})", collection, key, topic);
                Some((doc.collection, doc.key))
            }
            Err(e) => {
                warn!("Device write to {}/{} failed: {}", collection, key, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn bridge_with_state() -> (DeviceBridge, Arc<DataStore>, Arc<BroadcastHub>) {
        let store = Arc::new(DataStore::new());
        let hub = Arc::new(BroadcastHub::new());
        let args = MqttArgs::parse_from(["test"]);
        let (client, _eventloop) = MqttClient::new(&args, "bridge-test");
        let bridge = DeviceBridge::new(
            Arc::clone(&store),
            Arc::clone(&hub),
            client,
            args,
            Arc::new(AtomicBool::new(false)),
        );
        (bridge, store, hub)
    }

    #[test]
    fn test_route_topic() {
        assert_eq!(route_topic("storehouse/sensors/esp32"), TopicRoute::Sensors);
        assert_eq!(route_topic("storehouse/status/esp32"), TopicRoute::Status);
        assert_eq!(route_topic("storehouse/commands/esp32"), TopicRoute::Unhandled);
        assert_eq!(route_topic("other/things"), TopicRoute::Unhandled);
        // First match wins when both substrings appear
        assert_eq!(route_topic("x/sensors/status"), TopicRoute::Sensors);
    }

    #[tokio::test]
    async fn test_sensor_message_creates_fresh_key() {
        let (bridge, store, hub) = bridge_with_state();
        let (_id, mut rx) = hub.subscribe();

        let written = bridge.ingest(
            "storehouse/sensors/esp32",
            br#"{"device_id":"d1","temperature":22.5}"#,
        );

        let (collection, key) = written.unwrap();
        assert_eq!(collection, "sensors");
        assert!(key.starts_with("d1_"), "key was {key}");

        let doc = store.get(&format!("sensors:{key}")).unwrap();
        assert_eq!(doc.owner, BRIDGE_OWNER);
        assert_eq!(doc.value.get("temperature"), Some(&serde_json::json!(22.5)));

        // Exactly one broadcast, tagged with the bridge source
        let event = rx.recv().await.unwrap();
        assert!(event.contains(r#""source":"mqtt""#));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_status_message_upserts_per_device() {
        let (bridge, store, _hub) = bridge_with_state();

        bridge
            .ingest("storehouse/status/esp32", br#"{"device_id":"d1","online":true}"#)
            .unwrap();
        bridge
            .ingest("storehouse/status/esp32", br#"{"device_id":"d1","online":false}"#)
            .unwrap();

        // One record per device, last write wins
        assert_eq!(store.list("devices").len(), 1);
        let doc = store.get("devices:d1").unwrap();
        assert_eq!(doc.value.get("online"), Some(&serde_json::json!(false)));
    }

    #[tokio::test]
    async fn test_missing_device_id_defaults_to_unknown() {
        let (bridge, _store, _hub) = bridge_with_state();

        let (_, key) = bridge
            .ingest("storehouse/status/esp32", br#"{"online":true}"#)
            .unwrap();
        assert_eq!(key, "unknown");
    }

    #[tokio::test]
    async fn test_malformed_payload_dropped_without_effects() {
        let (bridge, store, hub) = bridge_with_state();
        let (_id, mut rx) = hub.subscribe();

        assert!(bridge.ingest("storehouse/sensors/x", b"not json").is_none());
        assert!(bridge.ingest("storehouse/sensors/x", b"[1,2,3]").is_none());

        assert_eq!(store.len(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_command_topic_dropped() {
        let (bridge, store, _hub) = bridge_with_state();

        let result = bridge.ingest("storehouse/commands/esp32", br#"{"device_id":"d1"}"#);
        assert!(result.is_none());
        assert_eq!(store.len(), 0);
    }
}
