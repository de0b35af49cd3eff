//! # Lane Configuration
//!
//! The ordered list of simulation-lane descriptors consumed once at
//! startup. Loaded from TOML by an external configuration layer or
//! built programmatically; either way, validation is fatal: exactly one
//! lane must be named "Main" and names must be unique.
//!
//! ```toml
//! [[lane]]
//! name = "Main"
//! frequency_hz = 100
//! sync = true
//!
//! [[lane]]
//! name = "Physics"
//! frequency_hz = 50
//! sync = true
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use strata_core::DEFAULT_LANE;

use crate::error::ConfigError;

/// Descriptor for one simulation lane.
///
/// `frequency_hz` may be changed at runtime through the tick manager;
/// `name` and `sync` are fixed for the lane's lifetime. A frequency of
/// zero means "tick once after startup, then idle".
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LaneConfig {
    /// Lane name; tick-phase callbacks are routed by this.
    pub name: String,
    /// Target tick rate in Hz. A ceiling, not a guarantee.
    #[serde(default)]
    pub frequency_hz: u32,
    /// Whether the lane rendezvous with the render thread each cycle.
    #[serde(default)]
    pub sync: bool,
}

impl LaneConfig {
    /// Creates a lane descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, frequency_hz: u32, sync: bool) -> Self {
        Self {
            name: name.into(),
            frequency_hz,
            sync,
        }
    }
}

/// The startup configuration for the tick runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RuntimeConfig {
    /// Ordered lane descriptors; exactly one must be named "Main".
    #[serde(default, rename = "lane")]
    pub lanes: Vec<LaneConfig>,
}

impl RuntimeConfig {
    /// Creates a configuration with a single "Main" lane.
    #[must_use]
    pub fn main_lane(frequency_hz: u32, sync: bool) -> Self {
        Self {
            lanes: vec![LaneConfig::new(DEFAULT_LANE, frequency_hz, sync)],
        }
    }

    /// Appends a lane descriptor.
    #[must_use]
    pub fn with_lane(mut self, name: impl Into<String>, frequency_hz: u32, sync: bool) -> Self {
        self.lanes.push(LaneConfig::new(name, frequency_hz, sync));
        self
    }

    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Parse failures and validation failures; see [`ConfigError`].
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// IO, parse and validation failures; see [`ConfigError`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks the invariants the barrier's participant set depends on.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingMainLane`] or [`ConfigError::DuplicateLane`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for lane in &self.lanes {
            if !seen.insert(lane.name.as_str()) {
                return Err(ConfigError::DuplicateLane(lane.name.clone()));
            }
        }
        if !seen.contains(DEFAULT_LANE) {
            return Err(ConfigError::MissingMainLane);
        }
        Ok(())
    }
}
