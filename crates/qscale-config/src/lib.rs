//! qscale-config — scaler configuration.
//!
//! `scaler.toml` is deserialized into a [`RawConfig`] that mirrors the file
//! (everything the operator may omit is optional), then [`validate`] turns
//! it into an immutable, fully-populated [`ScalerConfig`]. Validation never
//! patches the raw value in place and reports every problem at once.

pub mod error;
pub mod raw;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use raw::RawConfig;
pub use validate::{
    BrokerSettings, ControlPlaneSettings, MAX_SERVICES, ScalerConfig, ScalerOperation,
    ServiceConfig, validate,
};

use std::path::Path;

/// Read, parse and validate a configuration file.
pub fn load(path: &Path) -> ConfigResult<ScalerConfig> {
    let raw = RawConfig::from_file(path)?;
    validate(&raw)
}
