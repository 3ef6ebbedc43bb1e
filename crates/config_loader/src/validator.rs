//! Structural validation (field ranges) plus cross-field rules the
//! `validator` derive can't express on its own.

use contracts::WhiskerError;
use validator::Validate;

use crate::WhiskerConfig;

pub fn validate(config: &WhiskerConfig) -> Result<(), WhiskerError> {
    config
        .validate()
        .map_err(|e| WhiskerError::config("<structure>", e.to_string()))?;

    validate_at_least_one_backend(config)?;
    Ok(())
}

fn validate_at_least_one_backend(config: &WhiskerConfig) -> Result<(), WhiskerError> {
    if config.transport.routing_broker.is_none() && config.transport.websocket.is_none() {
        return Err(WhiskerError::config(
            "transport",
            "at least one of transport.routing_broker or transport.websocket must be set",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RoutingBrokerConfig, TransportConfig};

    fn minimal_config() -> WhiskerConfig {
        WhiskerConfig {
            resource_dir: "/var/lib/whisker".into(),
            transport: TransportConfig {
                routing_broker: Some(RoutingBrokerConfig {
                    bind_address: "0.0.0.0:7878".into(),
                }),
                websocket: None,
            },
            log_format: Default::default(),
            metrics_port: Some(9000),
            drift_ratio: None,
        }
    }

    #[test]
    fn accepts_a_minimal_valid_config() {
        assert!(validate(&minimal_config()).is_ok());
    }

    #[test]
    fn rejects_config_with_no_transport_backend() {
        let mut config = minimal_config();
        config.transport.routing_broker = None;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("transport"));
    }

    #[test]
    fn rejects_empty_resource_dir() {
        let mut config = minimal_config();
        config.resource_dir = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_drift_ratio_out_of_range() {
        let mut config = minimal_config();
        config.drift_ratio = Some(1.5);
        assert!(validate(&config).is_err());
    }
}
