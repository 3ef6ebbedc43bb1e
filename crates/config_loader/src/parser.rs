//! Parses a `WhiskerConfig` from TOML (primary) or JSON (optional) text.

use contracts::WhiskerError;

use crate::WhiskerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn parse_toml(content: &str) -> Result<WhiskerConfig, WhiskerError> {
    toml::from_str(content).map_err(|e| WhiskerError::config("<toml>", format!("parse error: {e}")))
}

pub fn parse_json(content: &str) -> Result<WhiskerConfig, WhiskerError> {
    serde_json::from_str(content)
        .map_err(|e| WhiskerError::config("<json>", format!("parse error: {e}")))
}

pub fn parse(content: &str, format: ConfigFormat) -> Result<WhiskerConfig, WhiskerError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_TOML: &str = r#"
resource_dir = "/var/lib/whisker"

[transport.routing_broker]
bind_address = "0.0.0.0:7878"
"#;

    #[test]
    fn parses_minimal_toml() {
        let config = parse_toml(MINIMAL_TOML).unwrap();
        assert_eq!(config.resource_dir, "/var/lib/whisker");
        assert_eq!(
            config.transport.routing_broker.unwrap().bind_address,
            "0.0.0.0:7878"
        );
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(parse_toml("not [[[ valid").is_err());
    }

    #[test]
    fn format_from_extension_is_case_insensitive() {
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
