//! Home Assistant MQTT discovery payload for the climate entity.

use serde::Serialize;

use crate::config::Config;
use crate::hvac::protocol::{MAX_TEMP, MIN_TEMP};

#[derive(Serialize)]
pub struct ClimateDiscovery {
    pub name: String,
    pub unique_id: String,
    pub availability_topic: String,
    pub payload_available: &'static str,
    pub payload_not_available: &'static str,
    pub power_command_topic: String,
    pub mode_command_topic: String,
    pub mode_state_topic: String,
    pub mode_state_template: &'static str,
    pub temperature_command_topic: String,
    pub temperature_state_topic: String,
    pub temperature_state_template: &'static str,
    pub current_temperature_topic: String,
    pub current_temperature_template: &'static str,
    pub fan_mode_command_topic: String,
    pub fan_mode_state_topic: String,
    pub fan_mode_state_template: &'static str,
    pub swing_mode_command_topic: String,
    pub swing_mode_state_topic: String,
    pub swing_mode_state_template: &'static str,
    pub modes: Vec<&'static str>,
    pub fan_modes: Vec<&'static str>,
    pub swing_modes: Vec<&'static str>,
    pub min_temp: f32,
    pub max_temp: f32,
    pub temp_step: f32,
    pub device: Device,
}

#[derive(Serialize)]
pub struct Device {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub sw_version: &'static str,
}

/// Everything HA needs to render a thermostat card for the unit. State
/// templates translate the composite state document; the unit's `FAN` mode
/// and `power` field fold into HA's `fan_only`/`off` vocabulary.
pub fn climate_config(config: &Config) -> ClimateDiscovery {
    let topics = &config.topics;
    ClimateDiscovery {
        name: config.client_id.clone(),
        unique_id: format!("{}_climate", config.client_id),
        availability_topic: topics.availability.clone(),
        payload_available: "online",
        payload_not_available: "offline",
        power_command_topic: topics.power_set.clone(),
        mode_command_topic: topics.mode_set.clone(),
        mode_state_topic: topics.state.clone(),
        mode_state_template: "{% if value_json.power == 'OFF' %}off\
            {% elif value_json.mode == 'FAN' %}fan_only\
            {% else %}{{ value_json.mode | lower }}{% endif %}",
        temperature_command_topic: topics.temp_set.clone(),
        temperature_state_topic: topics.state.clone(),
        temperature_state_template: "{{ value_json.temperature }}",
        current_temperature_topic: topics.state.clone(),
        current_temperature_template: "{{ value_json.roomTemperature }}",
        fan_mode_command_topic: topics.fan_set.clone(),
        fan_mode_state_topic: topics.state.clone(),
        fan_mode_state_template: "{{ value_json.fan }}",
        swing_mode_command_topic: topics.vane_set.clone(),
        swing_mode_state_topic: topics.state.clone(),
        swing_mode_state_template: "{{ value_json.vane }}",
        modes: vec!["off", "heat", "cool", "dry", "fan_only", "auto"],
        fan_modes: vec!["AUTO", "QUIET", "1", "2", "3", "4"],
        swing_modes: vec!["AUTO", "1", "2", "3", "4", "5", "SWING"],
        min_temp: MIN_TEMP,
        max_temp: MAX_TEMP,
        temp_step: 1.0,
        device: Device {
            identifiers: vec![config.client_id.clone()],
            name: config.client_id.clone(),
            manufacturer: "Mitsubishi Electric",
            model: "Heat pump (CN105)",
            sw_version: env!("CARGO_PKG_VERSION"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config::from_json(
            r#"{
                "ssid": "home",
                "mqtt_server": "10.0.0.2",
                "client_id": "hvac_lr"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn discovery_points_at_the_configured_topics() {
        let discovery = climate_config(&test_config());
        assert_eq!(discovery.mode_command_topic, "hvac_lr/mode/set");
        assert_eq!(discovery.mode_state_topic, "hvac_lr/state");
        assert_eq!(discovery.availability_topic, "hvac_lr/availability");
        assert_eq!(discovery.unique_id, "hvac_lr_climate");
    }

    #[test]
    fn discovery_serializes_with_ha_keys() {
        let json = serde_json::to_string(&climate_config(&test_config())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["temperature_command_topic"], "hvac_lr/temp/set");
        assert_eq!(value["min_temp"], 16.0);
        assert_eq!(value["max_temp"], 31.0);
        assert_eq!(value["device"]["identifiers"][0], "hvac_lr");
        assert!(
            value["modes"]
                .as_array()
                .unwrap()
                .contains(&serde_json::json!("fan_only"))
        );
    }
}
