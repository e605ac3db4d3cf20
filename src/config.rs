//! Configuration for Storehouse
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Storehouse - real-time rule-gated document store
///
/// "Bring the whole tithe into the storehouse" - Malachi 3:10
#[derive(Parser, Debug, Clone)]
#[command(name = "storehouse")]
#[command(about = "Real-time document store with per-collection access rules")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// MQTT configuration
    #[command(flatten)]
    pub mqtt: MqttArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// MQTT broker connection configuration for the device bridge
#[derive(Parser, Debug, Clone)]
pub struct MqttArgs {
    /// Enable the MQTT device bridge
    #[arg(long, env = "MQTT_ENABLED", default_value = "true")]
    pub mqtt_enabled: bool,

    /// MQTT broker host
    #[arg(long, env = "MQTT_HOST", default_value = "localhost")]
    pub mqtt_host: String,

    /// MQTT broker port
    #[arg(long, env = "MQTT_PORT", default_value = "1883")]
    pub mqtt_port: u16,

    /// MQTT username (optional)
    #[arg(long, env = "MQTT_USER")]
    pub mqtt_user: Option<String>,

    /// MQTT password (optional)
    #[arg(long, env = "MQTT_PASSWORD")]
    pub mqtt_password: Option<String>,

    /// Topic prefix for device subscriptions ({prefix}/sensors/#, {prefix}/status/#, {prefix}/commands/#)
    #[arg(long, env = "TOPIC_PREFIX", default_value = "storehouse")]
    pub topic_prefix: String,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let prefix = self.mqtt.topic_prefix.trim();
        if prefix.is_empty() {
            return Err("TOPIC_PREFIX must not be empty".to_string());
        }
        if prefix.contains('#') || prefix.contains('+') {
            return Err("TOPIC_PREFIX must not contain MQTT wildcards".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["storehouse"])
    }

    #[test]
    fn test_defaults_validate() {
        assert!(base_args().validate().is_ok());
    }

    #[test]
    fn test_wildcard_prefix_rejected() {
        let mut args = base_args();
        args.mqtt.topic_prefix = "devices/#".to_string();
        assert!(args.validate().is_err());

        args.mqtt.topic_prefix = "  ".to_string();
        assert!(args.validate().is_err());
    }
}
