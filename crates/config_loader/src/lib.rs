//! # Config Loader
//!
//! Loads and validates the server's TOML configuration file into a
//! [`WhiskerConfig`]: the resource directory, which transport backends to
//! bind, log format and metrics port.

mod parser;
mod validator;

pub use parser::ConfigFormat;

use contracts::WhiskerError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level server configuration, loaded from a single TOML (or JSON) file.
#[derive(Debug, Clone, Serialize, Deserialize, ::validator::Validate)]
pub struct WhiskerConfig {
    /// Directory saved maps and observation logs are read from and written to.
    #[validate(length(min = 1))]
    pub resource_dir: String,

    pub transport: TransportConfig,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Port the Prometheus exporter listens on; omit to disable metrics.
    pub metrics_port: Option<u16>,

    /// Overrides [`concurrency::SensorTimeSync`]'s default drift ratio.
    #[validate(range(min = 0.0, max = 1.0))]
    pub drift_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportConfig {
    pub routing_broker: Option<RoutingBrokerConfig>,
    pub websocket: Option<WebsocketConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingBrokerConfig {
    pub bind_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsocketConfig {
    pub port: u16,
    /// When set, the websocket backend also serves static files from this
    /// directory (the browser-based console UI), gated on the `static-files`
    /// transport feature.
    pub static_root: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load_from_path(path: &Path) -> Result<WhiskerConfig, WhiskerError> {
        let format = Self::detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, format)
    }

    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<WhiskerConfig, WhiskerError> {
        let config = parser::parse(content, format)?;
        self::validator::validate(&config)?;
        Ok(config)
    }

    pub fn to_toml(config: &WhiskerConfig) -> Result<String, WhiskerError> {
        toml::to_string_pretty(config)
            .map_err(|e| WhiskerError::config("<toml>", format!("serialize error: {e}")))
    }

    fn detect_format(path: &Path) -> Result<ConfigFormat, WhiskerError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| WhiskerError::config("<path>", "cannot determine format from extension"))?;
        ConfigFormat::from_extension(ext)
            .ok_or_else(|| WhiskerError::config("<path>", format!("unsupported config format: .{ext}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
resource_dir = "/var/lib/whisker"

[transport.routing_broker]
bind_address = "0.0.0.0:7878"

metrics_port = 9000
"#;

    #[test]
    fn loads_and_validates_a_minimal_config() {
        let config = ConfigLoader::load_from_str(MINIMAL, ConfigFormat::Toml).unwrap();
        assert_eq!(config.resource_dir, "/var/lib/whisker");
        assert_eq!(config.metrics_port, Some(9000));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = ConfigLoader::load_from_str(MINIMAL, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&config).unwrap();
        let reparsed = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(config.resource_dir, reparsed.resource_dir);
    }

    #[test]
    fn rejects_config_missing_every_transport_backend() {
        let content = r#"
resource_dir = "/var/lib/whisker"
[transport]
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
    }
}
