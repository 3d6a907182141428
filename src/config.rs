use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Fully populated bridge configuration. Built once at startup, then handed
/// out by reference; nothing mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub ssid: String,
    pub password: String,
    pub mqtt_server: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    /// Must be unique among clients on the broker; also the topic prefix.
    pub client_id: String,
    pub topics: Topics,
    /// Serial device wired to the unit's CN105 connector.
    pub serial_port: String,
    pub status_led_pin: u8,
    pub room_temp_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topics {
    pub discovery: String,
    pub power_set: String,
    pub mode_set: String,
    pub temp_set: String,
    pub fan_set: String,
    pub vane_set: String,
    pub wide_vane_set: String,
    pub state: String,
    pub debug: String,
    pub debug_set: String,
    pub availability: String,
}

impl Topics {
    /// The default topic layout: `<client_id>/<capability>/set` command
    /// topics plus shared state/debug topics, and the Home Assistant
    /// discovery config topic under `<prefix>/climate/<client_id>`.
    pub fn for_client(client_id: &str, discovery_prefix: &str) -> Self {
        Self {
            discovery: format!("{discovery_prefix}/climate/{client_id}/config"),
            power_set: format!("{client_id}/power/set"),
            mode_set: format!("{client_id}/mode/set"),
            temp_set: format!("{client_id}/temp/set"),
            fan_set: format!("{client_id}/fan/set"),
            vane_set: format!("{client_id}/vane/set"),
            wide_vane_set: format!("{client_id}/wideVane/set"),
            state: format!("{client_id}/state"),
            debug: format!("{client_id}/debug"),
            debug_set: format!("{client_id}/debug/set"),
            availability: format!("{client_id}/availability"),
        }
    }

    /// Topics the bridge subscribes to on connect.
    pub fn command_topics(&self) -> [&str; 7] {
        [
            &self.power_set,
            &self.mode_set,
            &self.temp_set,
            &self.fan_set,
            &self.vane_set,
            &self.wide_vane_set,
            &self.debug_set,
        ]
    }

    fn all(&self) -> [(&'static str, &str); 11] {
        [
            ("discovery", &self.discovery),
            ("power_set", &self.power_set),
            ("mode_set", &self.mode_set),
            ("temp_set", &self.temp_set),
            ("fan_set", &self.fan_set),
            ("vane_set", &self.vane_set),
            ("wide_vane_set", &self.wide_vane_set),
            ("state", &self.state),
            ("debug", &self.debug),
            ("debug_set", &self.debug_set),
            ("availability", &self.availability),
        ]
    }
}

// Serde struct for parsing the config file: everything beyond the identity
// and connection fields is optional and falls back to the stock layout.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    ssid: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    mqtt_server: String,
    #[serde(default = "default_mqtt_port")]
    mqtt_port: u16,
    #[serde(default)]
    mqtt_username: Option<String>,
    #[serde(default)]
    mqtt_password: Option<String>,
    #[serde(default)]
    client_id: String,
    #[serde(default = "default_discovery_prefix")]
    discovery_prefix: String,
    #[serde(default)]
    topics: Option<RawTopics>,
    #[serde(default = "default_serial_port")]
    serial_port: String,
    #[serde(default = "default_status_led_pin")]
    status_led_pin: u8,
    #[serde(default = "default_room_temp_interval_ms")]
    room_temp_interval_ms: u64,
}

/// Per-topic overrides; anything left out keeps its derived default.
#[derive(Default, Deserialize)]
struct RawTopics {
    discovery: Option<String>,
    power_set: Option<String>,
    mode_set: Option<String>,
    temp_set: Option<String>,
    fan_set: Option<String>,
    vane_set: Option<String>,
    wide_vane_set: Option<String>,
    state: Option<String>,
    debug: Option<String>,
    debug_set: Option<String>,
    availability: Option<String>,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

fn default_serial_port() -> String {
    "/dev/ttyAMA0".to_string()
}

fn default_status_led_pin() -> u8 {
    13
}

fn default_room_temp_interval_ms() -> u64 {
    60_000
}

impl Config {
    /// Load from the file named by `CONFIG_FILE` (default `config.json`).
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_FILE")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "config.json".to_string());
        Self::from_file(&path)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            source: e,
        })?;

        let defaults = Topics::for_client(&raw.client_id, &raw.discovery_prefix);
        let overrides = raw.topics.unwrap_or_default();
        let topics = Topics {
            discovery: overrides.discovery.unwrap_or(defaults.discovery),
            power_set: overrides.power_set.unwrap_or(defaults.power_set),
            mode_set: overrides.mode_set.unwrap_or(defaults.mode_set),
            temp_set: overrides.temp_set.unwrap_or(defaults.temp_set),
            fan_set: overrides.fan_set.unwrap_or(defaults.fan_set),
            vane_set: overrides.vane_set.unwrap_or(defaults.vane_set),
            wide_vane_set: overrides.wide_vane_set.unwrap_or(defaults.wide_vane_set),
            state: overrides.state.unwrap_or(defaults.state),
            debug: overrides.debug.unwrap_or(defaults.debug),
            debug_set: overrides.debug_set.unwrap_or(defaults.debug_set),
            availability: overrides.availability.unwrap_or(defaults.availability),
        };

        let config = Self {
            ssid: raw.ssid,
            password: raw.password,
            mqtt_server: raw.mqtt_server,
            mqtt_port: raw.mqtt_port,
            mqtt_username: raw.mqtt_username.filter(|v| !v.is_empty()),
            mqtt_password: raw.mqtt_password.filter(|v| !v.is_empty()),
            client_id: raw.client_id,
            topics,
            serial_port: raw.serial_port,
            status_led_pin: raw.status_led_pin,
            room_temp_interval_ms: raw.room_temp_interval_ms,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ssid.is_empty() {
            return Err(ConfigError::Invalid("ssid must not be empty".into()));
        }
        if self.mqtt_server.is_empty() {
            return Err(ConfigError::Invalid("mqtt_server must not be empty".into()));
        }
        // mqtt_port is a u16, so only 0 can fall outside 1-65535.
        if self.mqtt_port == 0 {
            return Err(ConfigError::Invalid(
                "mqtt_port must be in the range 1-65535".into(),
            ));
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::Invalid("client_id must not be empty".into()));
        }
        if self.serial_port.is_empty() {
            return Err(ConfigError::Invalid("serial_port must not be empty".into()));
        }
        if self.room_temp_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "room_temp_interval_ms must be > 0".into(),
            ));
        }
        for (name, topic) in self.topics.all() {
            if topic.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "topic '{name}' must not be empty"
                )));
            }
        }
        Ok(())
    }
}
