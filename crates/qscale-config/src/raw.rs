//! scaler.toml, as written by the operator.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
    pub broker: Option<RawBrokerConfig>,
    pub control_plane: Option<RawControlPlaneConfig>,
    #[serde(default)]
    pub services: Vec<RawServiceConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBrokerConfig {
    pub msg_vpn_name: Option<String>,
    pub polling_interval_secs: Option<i64>,
    pub active: Option<RawEndpointConfig>,
    pub standby: Option<RawEndpointConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEndpointConfig {
    pub semp_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawControlPlaneConfig {
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawServiceConfig {
    pub cluster: Option<String>,
    pub service: Option<String>,
    pub queue: Option<String>,
    pub min_replicas: Option<i64>,
    pub max_replicas: Option<i64>,
    pub message_count_target: Option<i64>,
    pub message_receive_rate_target: Option<i64>,
    pub message_spool_usage_target: Option<i64>,
    pub scale_out: Option<RawScalerOperation>,
    pub scale_in: Option<RawScalerOperation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawScalerOperation {
    pub max_scale_step: Option<i64>,
    pub cooldown_secs: Option<i64>,
    pub stabilization_window_secs: Option<i64>,
}

impl RawConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// `cluster/service` label for error messages; tolerates missing fields.
    pub(crate) fn designation(service: &RawServiceConfig) -> String {
        format!(
            "{}/{}",
            service.cluster.as_deref().unwrap_or("?"),
            service.service.as_deref().unwrap_or("?")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal() {
        let toml_str = r#"
[broker]
msg_vpn_name = "default"
polling_interval_secs = 10

[broker.active]
semp_url = "http://broker-a:8080"

[[services]]
cluster = "prod"
service = "orders"
queue = "q/orders"
min_replicas = 1
max_replicas = 10
message_count_target = 50
"#;
        let config = RawConfig::from_toml_str(toml_str).unwrap();
        let broker = config.broker.unwrap();
        assert_eq!(broker.msg_vpn_name.as_deref(), Some("default"));
        assert!(broker.standby.is_none());
        assert_eq!(config.services.len(), 1);
        assert!(config.services[0].scale_out.is_none());
    }

    #[test]
    fn parse_rejects_malformed_toml() {
        let err = RawConfig::from_toml_str("[broker\nmsg_vpn_name = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn from_file_reports_missing_path() {
        let err = RawConfig::from_file(Path::new("/nonexistent/scaler.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
