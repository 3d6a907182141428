mod config;
mod hvac;
mod mqtt;
mod status_led;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::config::Topics;
use crate::hvac::Capability;
use crate::hvac::client::HvacClient;
use crate::status_led::StatusLed;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match config::Config::load() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Starting mitsubishi-to-mqtt bridge (mqtt={}:{}, client_id={}, unit={})",
        config.mqtt_server, config.mqtt_port, config.client_id, config.serial_port,
    );
    info!(
        "Network '{}', room temperature reported every {}ms",
        config.ssid, config.room_temp_interval_ms,
    );

    // Channels
    let (mqtt_cmd_tx, mut mqtt_cmd_rx) = mpsc::channel::<mqtt::client::MqttMessage>(100);
    let (update_tx, update_rx) = mpsc::channel::<hvac::HvacUpdate>(200);
    let (connected_tx, mut connected_rx) = watch::channel(false);

    // Create MQTT client and spawn its event loop
    let mqtt_client = mqtt::client::MqttClient::new(&config);
    let mqtt_handle = tokio::spawn(async move {
        mqtt_client.run(mqtt_cmd_tx, update_rx).await;
    });

    // The serial session is blocking I/O, so it gets its own thread
    let (hvac_cmd_tx, hvac_cmd_rx) = mpsc::channel::<hvac::HvacCommand>(50);
    let hvac_client = HvacClient::new(&config);
    let hvac_handle = tokio::task::spawn_blocking(move || {
        hvac_client.run(update_tx, hvac_cmd_rx, connected_tx);
    });

    // Status LED follows the unit link
    let mut led = StatusLed::new(config.status_led_pin);
    let led_handle = tokio::spawn(async move {
        while connected_rx.changed().await.is_ok() {
            let lit = *connected_rx.borrow_and_update();
            led.set(lit);
        }
    });

    let topics = config.topics.clone();

    // Main loop: route MQTT commands to the unit + handle shutdown
    loop {
        tokio::select! {
            Some(msg) = mqtt_cmd_rx.recv() => {
                let Some(capability) = capability_for_topic(&topics, &msg.topic) else {
                    warn!("Publish on unexpected topic: {}", msg.topic);
                    continue;
                };
                match hvac::client::build_command(capability, &msg.payload) {
                    Some(cmd) => {
                        if hvac_cmd_tx.send(cmd).await.is_err() {
                            warn!("Command channel closed");
                        }
                    }
                    None => {
                        warn!(
                            "Could not build command: topic={}, value={}",
                            msg.topic, msg.payload
                        );
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down");
                break;
            }
            _ = async {
                let mut sigterm = tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate()
                ).expect("Failed to register SIGTERM handler");
                sigterm.recv().await;
            } => {
                info!("Received SIGTERM, shutting down");
                break;
            }
        }
    }

    // Cleanup: closing the command channel lets the serial thread finish
    drop(hvac_cmd_tx);
    mqtt_handle.abort();
    led_handle.abort();
    hvac_handle.abort();
    info!("mitsubishi-to-mqtt bridge stopped");
}

/// Map an incoming publish to the capability its topic addresses.
fn capability_for_topic(topics: &Topics, topic: &str) -> Option<Capability> {
    if topic == topics.power_set {
        Some(Capability::Power)
    } else if topic == topics.mode_set {
        Some(Capability::Mode)
    } else if topic == topics.temp_set {
        Some(Capability::Temp)
    } else if topic == topics.fan_set {
        Some(Capability::Fan)
    } else if topic == topics.vane_set {
        Some(Capability::Vane)
    } else if topic == topics.wide_vane_set {
        Some(Capability::WideVane)
    } else if topic == topics.debug_set {
        Some(Capability::Debug)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_topics_route_to_their_capability() {
        let topics = Topics::for_client("hvac_lr", "homeassistant");
        assert_eq!(
            capability_for_topic(&topics, "hvac_lr/power/set"),
            Some(Capability::Power)
        );
        assert_eq!(
            capability_for_topic(&topics, "hvac_lr/wideVane/set"),
            Some(Capability::WideVane)
        );
        assert_eq!(
            capability_for_topic(&topics, "hvac_lr/debug/set"),
            Some(Capability::Debug)
        );
        assert_eq!(capability_for_topic(&topics, "hvac_lr/state"), None);
        assert_eq!(capability_for_topic(&topics, "other/power/set"), None);
    }
}
