use crate::metering_p1::structs::{MissingValue, ParserOptions};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "D2M_CONFIG";
pub const SERIAL_PATH_ENV: &str = "P1_SERIAL_PATH";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("Unable to parse config file: {0}")]
    Parse(#[from] serde_yml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadFormat {
    Json,
    Influx,
}

fn mqtt_host_default() -> String { return "localhost".to_string() }
fn mqtt_port_default() -> u16 { return 1883 }
fn mqtt_client_name_default() -> String { return "dsmr2mqtt".to_string() }
fn mqtt_base_topic_default() -> String { return "dsmr".to_string() }
fn mqtt_format_default() -> PayloadFormat { return PayloadFormat::Json }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct MqttConfig {
    #[serde(default="mqtt_host_default")]
    pub host: String,
    #[serde(default="mqtt_port_default")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default="mqtt_client_name_default")]
    pub client_name: String,
    #[serde(default="mqtt_base_topic_default")]
    pub base_topic: String,
    #[serde(default="mqtt_format_default")]
    pub format: PayloadFormat,
}

fn meter_name_default() -> String { return "p1".to_string() }
fn meter_serial_path_default() -> String {
    return std::env::var(SERIAL_PATH_ENV).unwrap_or("/dev/ttyUSB0".to_string());
}
fn meter_read_timeout_default() -> u64 { return 20 }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct MeterConfig {
    #[serde(default="meter_name_default")]
    pub name: String,
    #[serde(default="meter_serial_path_default")]
    pub serial_path: String,
    /// Seconds to wait for a line before handing an empty one to the parser
    #[serde(default="meter_read_timeout_default")]
    pub read_timeout: u64,
    #[serde(default)]
    pub verify_checksum: bool,
    #[serde(default)]
    pub missing_value: MissingValue,
}

impl MeterConfig {
    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            missing_value: self.missing_value,
            verify_checksum: self.verify_checksum,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }
}

fn mqtt_default() -> MqttConfig {
    return MqttConfig {
        host: mqtt_host_default(),
        port: mqtt_port_default(),
        user: String::new(),
        pass: String::new(),
        client_name: mqtt_client_name_default(),
        base_topic: mqtt_base_topic_default(),
        format: mqtt_format_default(),
    }
}
fn meters_default() -> Vec<MeterConfig> {
    return vec![MeterConfig {
        name: meter_name_default(),
        serial_path: meter_serial_path_default(),
        read_timeout: meter_read_timeout_default(),
        verify_checksum: false,
        missing_value: MissingValue::default(),
    }]
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
    #[serde(default="mqtt_default")]
    pub mqtt: MqttConfig,
    #[serde(default="meters_default")]
    pub meters: Vec<MeterConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mqtt: mqtt_default(),
            meters: meters_default(),
        }
    }
}

impl Config {
    /// Loads `$D2M_CONFIG`, `config/dsmr2mqtt.yaml` or `dsmr2mqtt.yaml`, the
    /// first that exists. Without any of them the built in defaults are used.
    pub fn load() -> Result<Self, ConfigError> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            candidates.push(PathBuf::from(path));
        }
        candidates.push(PathBuf::from("config/dsmr2mqtt.yaml"));
        candidates.push(PathBuf::from("dsmr2mqtt.yaml"));

        match candidates.iter().find(|p| p.exists()) {
            Some(path) => Self::load_from(path),
            None => {
                info!("No config file found, using defaults");
                let config = Config::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.meters.is_empty() {
            return Err(ConfigError::Invalid("no meters configured".to_string()));
        }
        for (i, meter) in self.meters.iter().enumerate() {
            if self.meters[..i].iter().any(|m| m.name == meter.name) {
                return Err(ConfigError::Invalid(format!("duplicate meter name {}", meter.name)));
            }
            if meter.read_timeout == 0 {
                return Err(ConfigError::Invalid(format!("read_timeout of {} must be positive", meter.name)));
            }
        }
        Ok(())
    }
}
