//! # Gateway Settings
//!
//! Settings come from a TOML file:
//!
//! ```toml
//! [mqtt]
//! name = "hoval-gw"
//! broker = "localhost"
//!
//! [can]
//! interface = "can0"
//!
//! [bridge]
//! poll_interval_secs = 60
//!
//! [[datapoints]]
//! name = "outside_temperature"
//! function_group = 0
//! function_number = 0
//! datapoint_id = 0
//! datatype = { type = "signed", bits = 16, factor = 10 }
//! unit = "°C"
//! periodic = true
//! ```
//!
//! Every `[mqtt]` and `[can]` key can be overridden from the environment
//! (`MQTT_BROKER`, `CAN_INTERFACE`, ...). A value is taken from the
//! environment first, then from the file, then from the built-in default.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::constants::{
    DEFAULT_CAN_INTERFACE, DEFAULT_MQTT_PORT, DEFAULT_MQTT_TOPIC, DEFAULT_PENDING_TIMEOUT_SECS,
    DEFAULT_POLL_INTERVAL_SECS,
};
use crate::datapoint::{Datapoint, DatapointRegistry};
use crate::error::{GatewayError, Result};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    #[serde(default)]
    mqtt: RawMqtt,
    #[serde(default)]
    can: RawCan,
    #[serde(default)]
    bridge: RawBridge,
    #[serde(default)]
    datapoints: Vec<Datapoint>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMqtt {
    enable: Option<bool>,
    name: Option<String>,
    topic: Option<String>,
    broker: Option<String>,
    username: Option<String>,
    password: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCan {
    interface: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawBridge {
    poll_interval_secs: Option<u64>,
    pending_timeout_secs: Option<u64>,
}

/// Looks up environment variables. Injected so resolution can be tested
/// without touching the process environment.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

struct Resolver<'a> {
    env: EnvLookup<'a>,
}

impl Resolver<'_> {
    fn missing(env: &str, key: &str) -> GatewayError {
        GatewayError::ConfigurationMissing {
            env: env.to_string(),
            key: key.to_string(),
        }
    }

    fn optional_string(&self, env: &str, file: Option<String>) -> Option<String> {
        (self.env)(env).or(file)
    }

    fn string(
        &self,
        env: &str,
        key: &str,
        file: Option<String>,
        default: Option<&str>,
    ) -> Result<String> {
        self.optional_string(env, file)
            .or_else(|| default.map(str::to_string))
            .ok_or_else(|| Self::missing(env, key))
    }

    fn parsed<T>(&self, env: &str, key: &str, file: Option<T>, default: Option<T>) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        if let Some(raw) = (self.env)(env) {
            return raw
                .trim()
                .parse()
                .map_err(|e| GatewayError::Settings(format!("{env}={raw:?}: {e}")));
        }
        file.or(default).ok_or_else(|| Self::missing(env, key))
    }

    fn flag(&self, env: &str, key: &str, file: Option<bool>, default: Option<bool>) -> Result<bool> {
        if let Some(raw) = (self.env)(env) {
            return parse_flag(&raw)
                .ok_or_else(|| GatewayError::Settings(format!("{env}={raw:?}: not a boolean")));
        }
        file.or(default).ok_or_else(|| Self::missing(env, key))
    }
}

/// Accepts `true/false/1/0`, case-insensitively.
fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Username and password for the broker.
#[derive(Clone)]
pub struct MqttCredentials {
    pub username: String,
    pub password: Zeroizing<String>,
}

impl fmt::Debug for MqttCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where and as whom to connect to the broker.
#[derive(Debug, Clone)]
pub struct MqttConnection {
    /// Client id presented to the broker.
    pub name: String,
    pub broker: String,
    pub port: u16,
    pub credentials: Option<MqttCredentials>,
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub enable: bool,
    /// Root of all published and subscribed topics.
    pub topic: String,
    /// Present exactly when `enable` is set.
    pub connection: Option<MqttConnection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanSettings {
    pub interface: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Cadence of the periodic GET requests.
    pub poll_interval: Duration,
    /// Idle time after which an incomplete reassembly is dropped. `None`
    /// keeps it until its session key is reused.
    pub pending_timeout: Option<Duration>,
}

/// Fully resolved gateway settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mqtt: MqttSettings,
    pub can: CanSettings,
    pub bridge: BridgeSettings,
    pub registry: DatapointRegistry,
}

impl Settings {
    /// Reads the settings file and resolves it against the process environment.
    pub fn load(path: &Path) -> Result<Settings> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Settings(format!("cannot read {}: {e}", path.display()))
        })?;
        let settings = Settings::from_toml(&text, &|name: &str| std::env::var(name).ok())?;
        info!(
            "Loaded {} datapoints from {}",
            settings.registry.len(),
            path.display()
        );
        Ok(settings)
    }

    /// Parses settings text, taking environment overrides from `env`.
    pub fn from_toml(text: &str, env: EnvLookup<'_>) -> Result<Settings> {
        let raw: RawSettings =
            toml::from_str(text).map_err(|e| GatewayError::Settings(e.to_string()))?;
        let resolver = Resolver { env };

        let mqtt = resolve_mqtt(&resolver, raw.mqtt)?;
        let can = CanSettings {
            interface: resolver.string(
                "CAN_INTERFACE",
                "can.interface",
                raw.can.interface,
                Some(DEFAULT_CAN_INTERFACE),
            )?,
        };
        let poll_secs = raw
            .bridge
            .poll_interval_secs
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        if poll_secs == 0 {
            return Err(GatewayError::Settings(
                "bridge.poll_interval_secs must be positive".into(),
            ));
        }
        let timeout_secs = raw
            .bridge
            .pending_timeout_secs
            .unwrap_or(DEFAULT_PENDING_TIMEOUT_SECS);
        let bridge = BridgeSettings {
            poll_interval: Duration::from_secs(poll_secs),
            pending_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        };
        let registry = DatapointRegistry::from_definitions(raw.datapoints)?;

        Ok(Settings {
            mqtt,
            can,
            bridge,
            registry,
        })
    }
}

fn resolve_mqtt(resolver: &Resolver<'_>, raw: RawMqtt) -> Result<MqttSettings> {
    let enable = resolver.flag("MQTT_ENABLE", "mqtt.enable", raw.enable, Some(true))?;
    let topic = resolver.string(
        "MQTT_TOPIC",
        "mqtt.topic",
        raw.topic,
        Some(DEFAULT_MQTT_TOPIC),
    )?;
    if !enable {
        debug!("MQTT disabled, readings are only logged");
        return Ok(MqttSettings {
            enable,
            topic,
            connection: None,
        });
    }

    let name = resolver.string("MQTT_NAME", "mqtt.name", raw.name, None)?;
    let broker = resolver.string("MQTT_BROKER", "mqtt.broker", raw.broker, None)?;
    let port = resolver.parsed("MQTT_PORT", "mqtt.port", raw.port, Some(DEFAULT_MQTT_PORT))?;
    let username = resolver.optional_string("MQTT_USERNAME", raw.username);
    let password = resolver
        .optional_string("MQTT_PASSWORD", raw.password)
        .map(Zeroizing::new);
    let credentials = match (username, password) {
        (Some(username), Some(password)) => Some(MqttCredentials { username, password }),
        (None, None) => None,
        (Some(_), None) => return Err(Resolver::missing("MQTT_PASSWORD", "mqtt.password")),
        (None, Some(_)) => return Err(Resolver::missing("MQTT_USERNAME", "mqtt.username")),
    };

    Ok(MqttSettings {
        enable,
        topic,
        connection: Some(MqttConnection {
            name,
            broker,
            port,
            credentials,
        }),
    })
}

/// Loads environment variables from `path`, or from `.env` in the working
/// directory when no path is given.
///
/// A missing default `.env` is not an error. Variables already present in the
/// environment are never overwritten.
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>> {
    match path {
        Some(path) => {
            dotenvy::from_path(path).map_err(|e| {
                GatewayError::Settings(format!("cannot load {}: {e}", path.display()))
            })?;
            debug!("Environment loaded from {}", path.display());
            Ok(Some(path.to_path_buf()))
        }
        None => match dotenvy::dotenv() {
            Ok(found) => {
                debug!("Environment loaded from {}", found.display());
                Ok(Some(found))
            }
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(GatewayError::Settings(format!("cannot load .env: {e}"))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("False"), Some(false));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("yes"), None);
    }

    #[test]
    fn test_defaults_when_mqtt_disabled() {
        let settings = Settings::from_toml("[mqtt]\nenable = false\n", &env_from(&[])).unwrap();
        assert!(!settings.mqtt.enable);
        assert_eq!(settings.mqtt.topic, "hoval-gw");
        assert!(settings.mqtt.connection.is_none());
        assert_eq!(settings.can.interface, "can0");
        assert_eq!(settings.bridge.poll_interval, Duration::from_secs(60));
        assert_eq!(settings.bridge.pending_timeout, Some(Duration::from_secs(10)));
        assert!(settings.registry.is_empty());
    }

    #[test]
    fn test_env_takes_precedence_over_file() {
        let text = "[mqtt]\nname = \"gw\"\nbroker = \"file-broker\"\nport = 1884\n[can]\ninterface = \"can1\"\n";
        let env = env_from(&[("MQTT_BROKER", "env-broker"), ("CAN_INTERFACE", "vcan0")]);
        let settings = Settings::from_toml(text, &env).unwrap();
        let connection = settings.mqtt.connection.unwrap();
        assert_eq!(connection.broker, "env-broker");
        assert_eq!(connection.port, 1884);
        assert_eq!(settings.can.interface, "vcan0");
    }

    #[test]
    fn test_missing_broker_is_reported() {
        let err = Settings::from_toml("[mqtt]\nname = \"gw\"\n", &env_from(&[])).unwrap_err();
        match err {
            GatewayError::ConfigurationMissing { env, key } => {
                assert_eq!(env, "MQTT_BROKER");
                assert_eq!(key, "mqtt.broker");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_env_can_disable_mqtt() {
        let env = env_from(&[("MQTT_ENABLE", "0")]);
        let settings = Settings::from_toml("", &env).unwrap();
        assert!(!settings.mqtt.enable);
    }

    #[test]
    fn test_password_without_username() {
        let env = env_from(&[
            ("MQTT_NAME", "gw"),
            ("MQTT_BROKER", "localhost"),
            ("MQTT_PASSWORD", "secret"),
        ]);
        assert!(matches!(
            Settings::from_toml("", &env),
            Err(GatewayError::ConfigurationMissing { .. })
        ));
    }

    #[test]
    fn test_credentials_are_redacted() {
        let env = env_from(&[
            ("MQTT_NAME", "gw"),
            ("MQTT_BROKER", "localhost"),
            ("MQTT_USERNAME", "heating"),
            ("MQTT_PASSWORD", "secret"),
        ]);
        let settings = Settings::from_toml("", &env).unwrap();
        let rendered = format!("{:?}", settings.mqtt);
        assert!(rendered.contains("heating"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_invalid_port_from_env() {
        let env = env_from(&[
            ("MQTT_NAME", "gw"),
            ("MQTT_BROKER", "localhost"),
            ("MQTT_PORT", "not-a-port"),
        ]);
        assert!(matches!(
            Settings::from_toml("", &env),
            Err(GatewayError::Settings(_))
        ));
    }

    #[test]
    fn test_zero_timeout_disables_eviction() {
        let text = "[mqtt]\nenable = false\n[bridge]\npending_timeout_secs = 0\n";
        let settings = Settings::from_toml(text, &env_from(&[])).unwrap();
        assert_eq!(settings.bridge.pending_timeout, None);
    }
}
