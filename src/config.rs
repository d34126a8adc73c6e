// MIT License - Copyright (c) 2026 tapper-bridge contributors

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{Result, TapperError};

/// Transport selector, in the order stations list them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Mqtt,
    Http,
}

/// HTTP transport settings for one device.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Device endpoint, e.g. "http://10.0.0.149".
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// MQTT transport settings for one device.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_broker")]
    pub broker: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Broker connect timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: default_broker(),
            port: default_mqtt_port(),
            timeout_ms: default_timeout_ms(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    2000
}
fn default_broker() -> String {
    "localhost".to_string()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_keep_alive_secs() -> u64 {
    30
}
fn default_protocols() -> Vec<ProtocolKind> {
    vec![ProtocolKind::Mqtt, ProtocolKind::Http]
}

/// Per-station tapper configuration.
///
/// `protocols` is the fallback priority order; each listed protocol must have
/// its settings section present. `device_id` defaults to the station ID.
#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default = "default_protocols")]
    pub protocols: Vec<ProtocolKind>,
    #[serde(default)]
    pub http: Option<HttpConfig>,
    #[serde(default)]
    pub mqtt: Option<MqttConfig>,
}

impl StationConfig {
    /// Resolve the device ID, falling back to the station ID.
    pub fn device_id_or(&self, station_id: &str) -> String {
        self.device_id
            .clone()
            .unwrap_or_else(|| station_id.to_string())
    }

    /// Fail-fast validation. Called before any transport is built so that
    /// misconfiguration surfaces at load time, not mid-sequence.
    pub fn validate(&self, station_id: &str) -> Result<()> {
        if self.protocols.is_empty() {
            return Err(TapperError::Config(format!(
                "station '{station_id}': no protocols enabled"
            )));
        }
        for kind in &self.protocols {
            match kind {
                ProtocolKind::Http => {
                    let http = self.http.as_ref().ok_or_else(|| {
                        TapperError::Config(format!(
                            "station '{station_id}': http enabled but [http] section missing"
                        ))
                    })?;
                    if http.base_url.trim().is_empty() {
                        return Err(TapperError::Config(format!(
                            "station '{station_id}': missing 'base_url' in http config"
                        )));
                    }
                }
                ProtocolKind::Mqtt => {
                    if self.mqtt.is_none() {
                        return Err(TapperError::Config(format!(
                            "station '{station_id}': mqtt enabled but [mqtt] section missing"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Top-level configuration: a set of named test stations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stations: HashMap<String, StationConfig>,
}

impl Config {
    pub fn station(&self, station_id: &str) -> Result<&StationConfig> {
        self.stations.get(station_id).ok_or_else(|| {
            TapperError::Config(format!("unknown station '{station_id}'"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Config {
        toml::from_str(text).expect("config should parse")
    }

    #[test]
    fn test_defaults_applied() {
        let config = parse(
            r#"
            [stations.station1]
            [stations.station1.http]
            base_url = "http://10.0.0.149"
            [stations.station1.mqtt]
            "#,
        );
        let station = config.station("station1").unwrap();
        assert_eq!(
            station.protocols,
            vec![ProtocolKind::Mqtt, ProtocolKind::Http]
        );
        assert_eq!(station.http.as_ref().unwrap().timeout_ms, 2000);
        let mqtt = station.mqtt.as_ref().unwrap();
        assert_eq!(mqtt.broker, "localhost");
        assert_eq!(mqtt.port, 1883);
        assert_eq!(station.device_id_or("station1"), "station1");
        station.validate("station1").unwrap();
    }

    #[test]
    fn test_explicit_order_and_device_id() {
        let config = parse(
            r#"
            [stations.lab]
            device_id = "tapper-lab-02"
            protocols = ["http"]
            [stations.lab.http]
            base_url = "http://192.168.7.20"
            timeout_ms = 5000
            "#,
        );
        let station = config.station("lab").unwrap();
        assert_eq!(station.protocols, vec![ProtocolKind::Http]);
        assert_eq!(station.device_id_or("lab"), "tapper-lab-02");
        assert_eq!(station.http.as_ref().unwrap().timeout_ms, 5000);
        station.validate("lab").unwrap();
    }

    #[test]
    fn test_missing_section_rejected() {
        let config = parse(
            r#"
            [stations.s1]
            protocols = ["http"]
            "#,
        );
        let err = config.station("s1").unwrap().validate("s1").unwrap_err();
        assert!(matches!(err, TapperError::Config(_)));
        assert!(err.to_string().contains("[http] section missing"));
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let config = parse(
            r#"
            [stations.s1]
            protocols = ["http"]
            [stations.s1.http]
            base_url = ""
            "#,
        );
        let err = config.station("s1").unwrap().validate("s1").unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_no_protocols_rejected() {
        let config = parse(
            r#"
            [stations.s1]
            protocols = []
            "#,
        );
        let err = config.station("s1").unwrap().validate("s1").unwrap_err();
        assert!(err.to_string().contains("no protocols"));
    }

    #[test]
    fn test_unknown_station() {
        let config = Config::default();
        assert!(config.station("nope").is_err());
    }
}
