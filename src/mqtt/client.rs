use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::hvac::HvacUpdate;
use crate::hvac::protocol::{OperatingStatus, Settings};

use super::discovery;

pub struct MqttMessage {
    pub topic: String,
    pub payload: String,
}

pub struct MqttClient {
    client: AsyncClient,
    eventloop: EventLoop,
    config: Config,
}

impl MqttClient {
    pub fn new(config: &Config) -> Self {
        let mut mqttopts =
            MqttOptions::new(&config.client_id, &config.mqtt_server, config.mqtt_port);
        mqttopts.set_keep_alive(std::time::Duration::from_secs(30));

        if let (Some(user), Some(pass)) = (&config.mqtt_username, &config.mqtt_password) {
            mqttopts.set_credentials(user, pass);
        }

        // LWT: flag the unit unavailable when the bridge drops off.
        let lwt = rumqttc::LastWill::new(
            &config.topics.availability,
            "offline".as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
        );
        mqttopts.set_last_will(lwt);

        let (client, eventloop) = AsyncClient::new(mqttopts, 100);

        Self {
            client,
            eventloop,
            config: config.clone(),
        }
    }

    /// Run the MQTT event loop. Subscribes to the `/set` topics on connect,
    /// announces the climate entity to Home Assistant, forwards incoming
    /// publishes through `command_tx`, and publishes unit updates received
    /// from `update_rx` as a composite retained state document.
    pub async fn run(
        mut self,
        command_tx: mpsc::Sender<MqttMessage>,
        mut update_rx: mpsc::Receiver<HvacUpdate>,
    ) {
        let discovery_payload =
            match serde_json::to_string(&discovery::climate_config(&self.config)) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    error!("Failed to render discovery payload: {}", e);
                    None
                }
            };

        let mut state = BridgeState::default();
        let mut last_published: Option<String> = None;

        loop {
            tokio::select! {
                event = self.eventloop.poll() => {
                    match event {
                        Ok(event) => {
                            if let Event::Incoming(incoming) = &event {
                                match incoming {
                                    Incoming::ConnAck(_) => {
                                        info!("Connected to MQTT broker");
                                        Self::announce(
                                            &self.client,
                                            &self.config,
                                            discovery_payload.as_deref(),
                                        )
                                        .await;
                                    }
                                    Incoming::Publish(publish) => {
                                        let payload =
                                            String::from_utf8_lossy(&publish.payload).to_string();
                                        let msg = MqttMessage {
                                            topic: publish.topic.clone(),
                                            payload,
                                        };
                                        if command_tx.send(msg).await.is_err() {
                                            warn!("Command channel closed");
                                        }
                                    }
                                    _ => {}
                                }
                            }
                        }
                        Err(e) => {
                            error!("MQTT connection error: {}. Reconnecting...", e);
                            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        }
                    }
                }
                Some(update) = update_rx.recv() => {
                    match update {
                        HvacUpdate::Debug(line) => {
                            if let Err(e) = self
                                .client
                                .publish(&self.config.topics.debug, QoS::AtMostOnce, false, line)
                                .await
                            {
                                warn!("Failed to publish debug frame: {}", e);
                            }
                            continue;
                        }
                        HvacUpdate::Settings(settings) => state.settings = Some(settings),
                        HvacUpdate::RoomTemp(celsius) => state.room_temperature = Some(celsius),
                        HvacUpdate::Status(status) => state.status = Some(status),
                    }

                    let rendered = state.render();
                    if last_published.as_deref() != Some(rendered.as_str()) {
                        info!("Publishing {}: {}", self.config.topics.state, rendered);
                        if let Err(e) = self
                            .client
                            .publish(
                                &self.config.topics.state,
                                QoS::AtLeastOnce,
                                true,
                                rendered.clone(),
                            )
                            .await
                        {
                            warn!("Failed to publish state: {}", e);
                            continue;
                        }
                        last_published = Some(rendered);
                    }
                }
            }
        }
    }

    async fn announce(client: &AsyncClient, config: &Config, discovery_payload: Option<&str>) {
        if let Err(e) = client
            .publish(
                &config.topics.availability,
                QoS::AtLeastOnce,
                true,
                "online",
            )
            .await
        {
            error!("Failed to publish online status: {}", e);
        }

        if let Some(payload) = discovery_payload {
            if let Err(e) = client
                .publish(&config.topics.discovery, QoS::AtLeastOnce, true, payload)
                .await
            {
                error!("Failed to publish discovery config: {}", e);
            }
        }

        for topic in config.topics.command_topics() {
            if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce).await {
                error!("Failed to subscribe to {}: {}", topic, e);
            }
        }
    }
}

/// Last-known picture of the unit, merged from the driver's updates and
/// published as one retained JSON document.
#[derive(Default)]
struct BridgeState {
    settings: Option<Settings>,
    room_temperature: Option<f32>,
    status: Option<OperatingStatus>,
}

impl BridgeState {
    fn render(&self) -> String {
        let mut doc = serde_json::Map::new();
        if let Some(settings) = &self.settings {
            doc.insert("power".into(), settings.power.as_str().into());
            doc.insert("mode".into(), settings.mode.as_str().into());
            doc.insert("temperature".into(), settings.temperature.into());
            doc.insert("fan".into(), settings.fan.as_str().into());
            doc.insert("vane".into(), settings.vane.as_str().into());
            doc.insert("wideVane".into(), settings.wide_vane.as_str().into());
        }
        if let Some(celsius) = self.room_temperature {
            doc.insert("roomTemperature".into(), celsius.into());
        }
        if let Some(status) = &self.status {
            doc.insert("operating".into(), status.operating.into());
            doc.insert(
                "compressorFrequency".into(),
                status.compressor_frequency.into(),
            );
        }
        serde_json::Value::Object(doc).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hvac::protocol::{FanSpeed, Mode, Power, Vane, WideVane};

    #[test]
    fn state_document_uses_camel_case_keys() {
        let state = BridgeState {
            settings: Some(Settings {
                power: Power::On,
                mode: Mode::Heat,
                temperature: 21.0,
                fan: FanSpeed::Auto,
                vane: Vane::Swing,
                wide_vane: WideVane::Center,
            }),
            room_temperature: Some(19.5),
            status: Some(OperatingStatus {
                operating: true,
                compressor_frequency: 38,
            }),
        };

        let value: serde_json::Value = serde_json::from_str(&state.render()).unwrap();
        assert_eq!(value["power"], "ON");
        assert_eq!(value["mode"], "HEAT");
        assert_eq!(value["temperature"], 21.0);
        assert_eq!(value["wideVane"], "|");
        assert_eq!(value["roomTemperature"], 19.5);
        assert_eq!(value["operating"], true);
        assert_eq!(value["compressorFrequency"], 38);
    }

    #[test]
    fn partial_state_renders_only_known_fields() {
        let state = BridgeState {
            room_temperature: Some(22.0),
            ..Default::default()
        };
        let value: serde_json::Value = serde_json::from_str(&state.render()).unwrap();
        assert_eq!(value["roomTemperature"], 22.0);
        assert!(value.get("power").is_none());
    }
}
