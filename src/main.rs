//! Storehouse - real-time rule-gated document store
//!
//! "Bring the whole tithe into the storehouse" - Malachi 3:10

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storehouse::{
    bridge::{DeviceBridge, MqttClient},
    config::Args,
    server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("storehouse={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Storehouse - real-time document store");
    info!("  \"Bring the whole tithe into the storehouse\"");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    if args.mqtt.mqtt_enabled {
        info!(
            "MQTT: {}:{} (prefix {})",
            args.mqtt.mqtt_host, args.mqtt.mqtt_port, args.mqtt.topic_prefix
        );
    } else {
        info!("MQTT: disabled");
    }
    info!("======================================");

    let state = Arc::new(server::AppState::new(args.clone()));

    // Start the device bridge. The MQTT connection is established (and
    // re-established) by the bridge's own loop, so a missing broker
    // never blocks or kills the server.
    if args.mqtt.mqtt_enabled {
        let (client, eventloop) = MqttClient::new(
            &args.mqtt,
            &format!("storehouse-{}", args.node_id),
        );
        let bridge = DeviceBridge::new(
            Arc::clone(&state.store),
            Arc::clone(&state.hub),
            client,
            args.mqtt.clone(),
            Arc::clone(&state.mqtt_connected),
        );
        tokio::spawn(bridge.run(eventloop));
        info!("Device bridge started");
    }

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
