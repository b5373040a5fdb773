use serde::Deserialize;
use std::env;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub topic_base: String,
    pub device_name: String,
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    /// Passed to the broker link as the keep-alive interval, matching how the
    /// console has always consumed `mqtt_connection_timeout`.
    pub connection_timeout_secs: u64,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
}

// Serde struct for parsing the console's JSON config file. Key names are the
// ones the deployed config files already use.
#[derive(Deserialize)]
struct RawConfig {
    mqtt_broker: String,
    #[serde(default)]
    mqtt_port: Option<u16>,
    #[serde(default)]
    mqtt_connection_timeout: Option<u64>,
    #[serde(default)]
    topic_base: Option<String>,
    device_name: String,
    #[serde(default)]
    mqtt_username: Option<String>,
    #[serde(default)]
    mqtt_password: Option<String>,
    #[serde(default)]
    mqtt_client_id: Option<String>,
}

fn env_required(key: &str) -> Result<String, String> {
    env::var(key).map_err(|_| format!("{key} environment variable is required"))
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

const DEFAULT_PORT: u16 = 1883;
const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 60;
const DEFAULT_TOPIC_BASE: &str = "instruments";
const DEFAULT_CLIENT_ID: &str = "keithley6517b-mqtt-console";

impl Config {
    /// Load configuration from `CONFIG_FILE` if set (or `console.json` if it
    /// exists), otherwise from individual environment variables.
    pub fn load() -> Result<Self, String> {
        if let Some(path) = env_optional("CONFIG_FILE") {
            return Self::from_file(&path);
        }
        if Path::new("console.json").exists() {
            return Self::from_file("console.json");
        }
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, String> {
        let config = Self {
            mqtt: MqttConfig {
                broker_host: env_required("MQTT_BROKER")?,
                broker_port: env_or_default("MQTT_PORT", DEFAULT_PORT),
                connection_timeout_secs: env_or_default(
                    "MQTT_CONNECTION_TIMEOUT_SECS",
                    DEFAULT_CONNECTION_TIMEOUT_SECS,
                ),
                username: env_optional("MQTT_USERNAME"),
                password: env_optional("MQTT_PASSWORD"),
                client_id: env_or_default("MQTT_CLIENT_ID", DEFAULT_CLIENT_ID.to_string()),
            },
            topic_base: env_or_default("TOPIC_BASE", DEFAULT_TOPIC_BASE.to_string()),
            device_name: env_required("DEVICE_NAME")?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("Failed to read {path}: {e}"))?;
        let config = Self::parse(&content).map_err(|e| format!("Failed to parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, String> {
        let raw: RawConfig = serde_json::from_str(content).map_err(|e| e.to_string())?;
        Ok(Self {
            mqtt: MqttConfig {
                broker_host: raw.mqtt_broker,
                broker_port: raw.mqtt_port.unwrap_or(DEFAULT_PORT),
                connection_timeout_secs: raw
                    .mqtt_connection_timeout
                    .unwrap_or(DEFAULT_CONNECTION_TIMEOUT_SECS),
                username: raw.mqtt_username.filter(|v| !v.is_empty()),
                password: raw.mqtt_password.filter(|v| !v.is_empty()),
                client_id: raw
                    .mqtt_client_id
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            },
            topic_base: raw.topic_base.unwrap_or_else(|| DEFAULT_TOPIC_BASE.to_string()),
            device_name: raw.device_name,
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.mqtt.broker_host.is_empty() {
            return Err("MQTT broker host must not be empty".into());
        }
        if self.mqtt.connection_timeout_secs == 0 {
            return Err("MQTT connection timeout must be > 0".into());
        }
        if self.topic_base.is_empty() || self.topic_base.contains([' ', '#', '+']) {
            return Err(format!("Invalid topic base: {:?}", self.topic_base));
        }
        if self.topic_base.starts_with('/') || self.topic_base.ends_with('/') {
            return Err("Topic base must not start or end with '/'".into());
        }
        if self.device_name.is_empty() || self.device_name.contains(['/', ' ', '#', '+']) {
            return Err(format!("Invalid device name: {:?}", self.device_name));
        }
        Ok(())
    }
}
