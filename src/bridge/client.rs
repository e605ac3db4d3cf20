//! MQTT client wrapper
//!
//! Thin wrapper over rumqttc with connection naming, optional
//! credentials, and the device-topic subscription set.

use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use tracing::info;

use crate::config::MqttArgs;
use crate::types::StorehouseError;

/// Channel capacity for the rumqttc request queue
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Keep-alive interval for the broker connection
const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// MQTT client wrapper for the device bridge
pub struct MqttClient {
    client: AsyncClient,
    /// Client name for logging
    name: String,
}

impl MqttClient {
    /// Create a client and its event loop. The connection itself is
    /// established lazily by polling the event loop.
    pub fn new(args: &MqttArgs, name: &str) -> (Self, EventLoop) {
        info!(
            "MQTT client {} targeting {}:{}",
            name, args.mqtt_host, args.mqtt_port
        );

        let mut options = MqttOptions::new(name, args.mqtt_host.as_str(), args.mqtt_port);
        options.set_keep_alive(KEEP_ALIVE);

        if let (Some(user), Some(pass)) = (&args.mqtt_user, &args.mqtt_password) {
            options.set_credentials(user.clone(), pass.clone());
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        (
            Self {
                client,
                name: name.to_string(),
            },
            eventloop,
        )
    }

    /// Subscribe to the device topic set under `prefix`:
    /// `{prefix}/sensors/#`, `{prefix}/status/#`, `{prefix}/commands/#`.
    /// Commands are subscribed but intentionally left unhandled by the
    /// ingest routing.
    pub async fn subscribe_device_topics(&self, prefix: &str) -> Result<(), StorehouseError> {
        for suffix in ["sensors", "status", "commands"] {
            let topic = format!("{prefix}/{suffix}/#");
            self.client
                .subscribe(topic.clone(), QoS::AtMostOnce)
                .await
                .map_err(|e| StorehouseError::Mqtt(format!("subscribe {topic} failed: {e}")))?;
            info!("Subscribed to {}", topic);
        }
        Ok(())
    }

    /// Get the client name
    pub fn name(&self) -> &str {
        &self.name
    }
}
