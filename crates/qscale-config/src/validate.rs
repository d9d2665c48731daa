//! Validation: [`RawConfig`] in, immutable [`ScalerConfig`] out.
//!
//! Omitted `scale_out` / `scale_in` blocks and omitted metric targets are
//! filled with zeros in the output value. Every problem found is collected
//! into a single [`ConfigError::Invalid`].

use std::collections::HashMap;
use std::time::Duration;

use qscale_state::{BrokerEndpoint, ServiceId, retention_window};
use tracing::error;

use crate::error::{ConfigError, ConfigResult};
use crate::raw::{
    RawBrokerConfig, RawConfig, RawControlPlaneConfig, RawEndpointConfig, RawScalerOperation,
    RawServiceConfig,
};

/// Upper bound on the number of managed services per scaler process.
pub const MAX_SERVICES: usize = 100;

/// Validated configuration for a scaler process.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalerConfig {
    pub broker: BrokerSettings,
    pub control_plane: Option<ControlPlaneSettings>,
    pub services: Vec<ServiceConfig>,
}

/// Metrics-source connection settings shared by all services.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerSettings {
    pub msg_vpn_name: String,
    pub polling_interval: Duration,
    pub active: BrokerEndpoint,
    pub standby: Option<BrokerEndpoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlPlaneSettings {
    pub base_url: String,
}

/// Scaling policy for one managed service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub id: ServiceId,
    pub queue: String,
    pub min_replicas: u32,
    pub max_replicas: u32,
    /// Desired backlog per replica; 0 disables the metric.
    pub message_count_target: u32,
    /// Desired receive rate per replica; 0 disables the metric.
    pub message_receive_rate_target: u32,
    /// Parsed and validated, but not used in decisions.
    pub message_spool_usage_target: u32,
    pub scale_out: ScalerOperation,
    pub scale_in: ScalerOperation,
}

impl ServiceConfig {
    /// How long this service's snapshots must be retained.
    pub fn retention(&self) -> Duration {
        retention_window(
            self.scale_out.stabilization_window,
            self.scale_in.stabilization_window,
        )
    }
}

/// Per-direction scaling behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScalerOperation {
    /// Largest replica change per decision; 0 means unlimited.
    pub max_scale_step: u32,
    pub cooldown: Duration,
    pub stabilization_window: Duration,
}

/// Validate a parsed configuration and produce the immutable result.
pub fn validate(raw: &RawConfig) -> ConfigResult<ScalerConfig> {
    let mut errors = Vec::new();

    let broker = validate_broker(raw.broker.as_ref(), &mut errors);
    let control_plane = raw
        .control_plane
        .as_ref()
        .and_then(|cp| validate_control_plane(cp, &mut errors));

    if raw.services.is_empty() {
        errors.push("at least one [[services]] entry is required".to_string());
    }
    if raw.services.len() > MAX_SERVICES {
        errors.push(format!(
            "too many services: {} (maximum is {MAX_SERVICES})",
            raw.services.len()
        ));
    }

    let services: Vec<ServiceConfig> = raw
        .services
        .iter()
        .filter_map(|s| validate_service(s, &mut errors))
        .collect();

    // Each queue and each cluster/service pair may be managed only once.
    for queue in duplicates(raw.services.iter().filter_map(|s| s.queue.clone())) {
        errors.push(format!("duplicate queue name '{queue}'"));
    }
    for service in duplicates(
        raw.services
            .iter()
            .filter(|s| s.cluster.is_some() && s.service.is_some())
            .map(RawConfig::designation),
    ) {
        errors.push(format!("duplicate service '{service}'"));
    }

    for e in &errors {
        error!(error = %e, "invalid configuration");
    }

    match broker {
        Some(broker) if errors.is_empty() => Ok(ScalerConfig {
            broker,
            control_plane,
            services,
        }),
        _ => Err(ConfigError::Invalid(errors)),
    }
}

fn validate_broker(
    raw: Option<&RawBrokerConfig>,
    errors: &mut Vec<String>,
) -> Option<BrokerSettings> {
    let Some(raw) = raw else {
        errors.push("[broker] section is required".to_string());
        return None;
    };

    let msg_vpn_name = non_empty(raw.msg_vpn_name.as_deref());
    if msg_vpn_name.is_none() {
        errors.push("broker.msg_vpn_name is required".to_string());
    }

    let polling_interval = match raw.polling_interval_secs {
        Some(secs) if secs > 0 => Some(Duration::from_secs(secs as u64)),
        Some(secs) => {
            errors.push(format!("broker.polling_interval_secs must be > 0, got {secs}"));
            None
        }
        None => {
            errors.push("broker.polling_interval_secs is required".to_string());
            None
        }
    };

    let active = match raw.active.as_ref() {
        Some(ep) => validate_endpoint("broker.active", ep, errors),
        None => {
            errors.push("[broker.active] endpoint is required".to_string());
            None
        }
    };
    let standby = raw
        .standby
        .as_ref()
        .and_then(|ep| validate_endpoint("broker.standby", ep, errors));

    Some(BrokerSettings {
        msg_vpn_name: msg_vpn_name?.to_string(),
        polling_interval: polling_interval?,
        active: active?,
        standby,
    })
}

fn validate_endpoint(
    label: &str,
    raw: &RawEndpointConfig,
    errors: &mut Vec<String>,
) -> Option<BrokerEndpoint> {
    let Some(url) = non_empty(raw.semp_url.as_deref()) else {
        errors.push(format!("{label}.semp_url is required"));
        return None;
    };
    if !has_supported_scheme(url) {
        errors.push(format!("{label}.semp_url must start with http:// or https://, got {url}"));
        return None;
    }
    Some(BrokerEndpoint {
        semp_url: url.trim_end_matches('/').to_string(),
        username: raw.username.clone(),
        password: raw.password.clone(),
    })
}

fn validate_control_plane(
    raw: &RawControlPlaneConfig,
    errors: &mut Vec<String>,
) -> Option<ControlPlaneSettings> {
    match non_empty(raw.base_url.as_deref()) {
        Some(url) if !has_supported_scheme(url) => {
            errors.push(format!(
                "control_plane.base_url must start with http:// or https://, got {url}"
            ));
            None
        }
        Some(url) => Some(ControlPlaneSettings {
            base_url: url.trim_end_matches('/').to_string(),
        }),
        None => {
            errors.push("control_plane.base_url is required".to_string());
            None
        }
    }
}

fn validate_service(raw: &RawServiceConfig, errors: &mut Vec<String>) -> Option<ServiceConfig> {
    let label = RawConfig::designation(raw);
    let before = errors.len();

    let cluster = required_str(&label, "cluster", raw.cluster.as_deref(), errors);
    let service = required_str(&label, "service", raw.service.as_deref(), errors);
    let queue = required_str(&label, "queue", raw.queue.as_deref(), errors);

    let min_replicas = required_count(&label, "min_replicas", raw.min_replicas, errors);
    let max_replicas = required_count(&label, "max_replicas", raw.max_replicas, errors);
    if let Some(min) = min_replicas
        && min < 1
    {
        errors.push(format!("service={label} min_replicas must be > 0"));
    }
    if let (Some(min), Some(max)) = (min_replicas, max_replicas)
        && max <= min
    {
        errors.push(format!("service={label} max_replicas must be > min_replicas"));
    }

    let count_target = optional_count(
        &label,
        "message_count_target",
        raw.message_count_target,
        errors,
    );
    let rate_target = optional_count(
        &label,
        "message_receive_rate_target",
        raw.message_receive_rate_target,
        errors,
    );
    let spool_target = optional_count(
        &label,
        "message_spool_usage_target",
        raw.message_spool_usage_target,
        errors,
    );
    if count_target == Some(0) && rate_target == Some(0) {
        errors.push(format!(
            "service={label} at least one of message_count_target, message_receive_rate_target must be > 0"
        ));
    }

    let scale_out = validate_operation(&label, "scale_out", raw.scale_out.as_ref(), errors);
    let scale_in = validate_operation(&label, "scale_in", raw.scale_in.as_ref(), errors);

    if errors.len() > before {
        return None;
    }

    Some(ServiceConfig {
        id: ServiceId::new(cluster?, service?),
        queue: queue?.to_string(),
        min_replicas: min_replicas?,
        max_replicas: max_replicas?,
        message_count_target: count_target?,
        message_receive_rate_target: rate_target?,
        message_spool_usage_target: spool_target?,
        scale_out: scale_out?,
        scale_in: scale_in?,
    })
}

fn validate_operation(
    label: &str,
    which: &str,
    raw: Option<&RawScalerOperation>,
    errors: &mut Vec<String>,
) -> Option<ScalerOperation> {
    let Some(raw) = raw else {
        return Some(ScalerOperation::default());
    };
    let step = raw.max_scale_step.unwrap_or(0);
    let cooldown = raw.cooldown_secs.unwrap_or(0);
    let window = raw.stabilization_window_secs.unwrap_or(0);
    if step < 0 || cooldown < 0 || window < 0 || step > i64::from(u32::MAX) {
        errors.push(format!(
            "service={label} {which}: max_scale_step, cooldown_secs, stabilization_window_secs must be >= 0"
        ));
        return None;
    }
    Some(ScalerOperation {
        max_scale_step: step as u32,
        cooldown: Duration::from_secs(cooldown as u64),
        stabilization_window: Duration::from_secs(window as u64),
    })
}

fn required_str<'a>(
    label: &str,
    field: &str,
    value: Option<&'a str>,
    errors: &mut Vec<String>,
) -> Option<&'a str> {
    let value = non_empty(value);
    if value.is_none() {
        errors.push(format!("service={label} {field} is required"));
    }
    value
}

fn required_count(
    label: &str,
    field: &str,
    value: Option<i64>,
    errors: &mut Vec<String>,
) -> Option<u32> {
    match value {
        Some(v) => to_count(label, field, v, errors),
        None => {
            errors.push(format!("service={label} {field} is required"));
            None
        }
    }
}

fn optional_count(
    label: &str,
    field: &str,
    value: Option<i64>,
    errors: &mut Vec<String>,
) -> Option<u32> {
    to_count(label, field, value.unwrap_or(0), errors)
}

fn to_count(label: &str, field: &str, value: i64, errors: &mut Vec<String>) -> Option<u32> {
    match u32::try_from(value) {
        Ok(v) => Some(v),
        Err(_) => {
            errors.push(format!("service={label} {field} must be between 0 and {}", u32::MAX));
            None
        }
    }
}

fn has_supported_scheme(url: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .any(|scheme| url.strip_prefix(scheme).is_some_and(|rest| !rest.is_empty()))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Values appearing more than once, each reported once, in first-seen order.
fn duplicates(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut order = Vec::new();
    for v in values {
        let count = seen.entry(v.clone()).or_insert(0);
        *count += 1;
        if *count == 2 {
            order.push(v);
        }
    }
    order
}
