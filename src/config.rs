//! Configuration
//!
//! Loaded from a single TOML file. The path is taken from `--config`, else
//! `OCPP_CONFIG`, else `~/.config/ocpp-csms/config.toml`. A missing file yields
//! the defaults; every section and field is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ChargePoint, Location, UserTag};

pub const CONFIG_ENV_VAR: &str = "OCPP_CONFIG";
const APP_DIR: &str = "ocpp-csms";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ocpp: OcppConfig,
    pub load_balancer: LoadBalancerConfig,
    pub trigger: TriggerConfig,
    pub logging: LoggingConfig,
    pub locations: Vec<LocationSeed>,
    pub charge_points: Vec<ChargePointSeed>,
    pub user_tags: Vec<UserTagSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Grace period for connection tasks after the shutdown signal
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            shutdown_timeout_secs: 10,
        }
    }
}

/// What StartTransaction does when the connector already has an open transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyConnectorPolicy {
    /// Log an error and accept the new transaction anyway
    #[default]
    Accept,
    /// Answer `ConcurrentTx`
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcppConfig {
    /// Accepted WebSocket subprotocols; empty accepts any client
    pub subprotocols: Vec<String>,
    pub heartbeat_interval: u32,
    /// Create unknown charge points on BootNotification
    pub auto_register_charge_points: bool,
    /// Create unknown id tags on Authorize
    pub auto_register_tags: bool,
    pub busy_connector_policy: BusyConnectorPolicy,
}

impl Default for OcppConfig {
    fn default() -> Self {
        Self {
            subprotocols: vec!["ocpp1.6".to_string()],
            heartbeat_interval: 600,
            auto_register_charge_points: false,
            auto_register_tags: false,
            busy_connector_policy: BusyConnectorPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    pub enabled: bool,
    pub high_amps: i32,
    pub middle_amps: i32,
    pub floor_amps: i32,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            high_amps: 150,
            middle_amps: 100,
            floor_amps: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSeed {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub default_power_limit: i32,
    #[serde(default)]
    pub power_limit: i32,
    #[serde(default)]
    pub charge_points: Vec<String>,
}

impl LocationSeed {
    pub fn to_location(&self) -> Location {
        Location {
            id: self.id.clone(),
            name: self.name.clone(),
            default_power_limit: self.default_power_limit,
            power_limit: self.power_limit,
            charge_point_ids: self.charge_points.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargePointSeed {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub smart_charging: bool,
}

impl ChargePointSeed {
    pub fn to_charge_point(&self) -> ChargePoint {
        let mut cp = ChargePoint::new(&self.id);
        cp.enabled = self.enabled;
        cp.location_id = self.location_id.clone();
        cp.smart_charging = self.smart_charging;
        cp
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTagSeed {
    pub id_tag: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub note: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl UserTagSeed {
    pub fn to_user_tag(&self) -> UserTag {
        let mut tag = UserTag::new(&self.id_tag, &self.username);
        tag.note = self.note.clone();
        tag.enabled = self.enabled;
        tag
    }
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// `~/.config/ocpp-csms/config.toml`, if a config directory exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Resolve the config path from an explicit value, the environment or the
    /// platform default, in that order.
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
            .or_else(Self::default_path)
    }

    /// Load and validate. A path that does not exist yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ocpp.heartbeat_interval == 0 {
            return Err(ConfigError::Invalid(
                "ocpp.heartbeat_interval must be positive".into(),
            ));
        }
        if self.trigger.enabled && self.trigger.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "trigger.interval_secs must be positive".into(),
            ));
        }
        let lb = &self.load_balancer;
        if !(lb.high_amps > lb.middle_amps && lb.middle_amps > lb.floor_amps && lb.floor_amps > 0)
        {
            return Err(ConfigError::Invalid(format!(
                "load_balancer tiers must be strictly descending and positive, got {}/{}/{}",
                lb.high_amps, lb.middle_amps, lb.floor_amps
            )));
        }
        for cp in &self.charge_points {
            if let Some(location_id) = &cp.location_id {
                if !self.locations.iter().any(|l| &l.id == location_id) {
                    return Err(ConfigError::Invalid(format!(
                        "charge point {} references unknown location {}",
                        cp.id, location_id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.ocpp.subprotocols, vec!["ocpp1.6".to_string()]);
        assert_eq!(config.ocpp.heartbeat_interval, 600);
        assert_eq!(config.ocpp.busy_connector_policy, BusyConnectorPolicy::Accept);
        assert_eq!(config.trigger.interval_secs, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_partial_file() {
        let config: AppConfig = toml::from_str(
            r#"
            [ocpp]
            busy_connector_policy = "reject"
            subprotocols = []

            [logging]
            format = "json"

            [[locations]]
            id = "site-a"
            default_power_limit = 32
            charge_points = ["CP1"]

            [[charge_points]]
            id = "CP1"
            location_id = "site-a"
            smart_charging = true

            [[user_tags]]
            id_tag = "TAG-1"
            username = "alice"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.ocpp.busy_connector_policy, BusyConnectorPolicy::Reject);
        assert!(config.ocpp.subprotocols.is_empty());
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.locations[0].to_location().default_power_limit, 32);

        let cp = config.charge_points[0].to_charge_point();
        assert!(cp.enabled);
        assert!(cp.smart_charging);
        assert!(config.user_tags[0].to_user_tag().enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_location_reference() {
        let config: AppConfig = toml::from_str(
            r#"
            [[charge_points]]
            id = "CP1"
            location_id = "nowhere"
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_unordered_tiers() {
        let mut config = AppConfig::default();
        config.load_balancer.middle_amps = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = AppConfig::load(Some(Path::new("/nonexistent/ocpp-csms.toml"))).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
    }
}
