//! Sampler configuration
//!
//! Settings pushed into the sampling engine before the first start of a
//! session. They are fixed afterwards; see `Session::configure`.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use threadscope_common::DEFAULT_INTERVAL_US;

use crate::domain::ControlError;

/// How the sampler execution context is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    /// Dedicated background OS thread
    #[default]
    Thread,
    /// Cooperative task inside the host's existing tokio runtime
    Stealth,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Sampling interval in microseconds
    pub interval_us: u64,
    /// Measure on-CPU time instead of wall time
    pub cpu: bool,
    /// Unwind native frames alongside managed ones
    pub native: bool,
    /// Dump stacks on demand instead of sampling continuously
    #[serde(rename = "where")]
    pub where_mode: bool,
    pub mode: SamplingMode,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_us: DEFAULT_INTERVAL_US,
            cpu: false,
            native: false,
            where_mode: false,
            mode: SamplingMode::Thread,
        }
    }
}

impl SamplerConfig {
    /// Parse a JSON config; absent fields take their defaults.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or the result is invalid.
    pub fn from_json(json: &str) -> Result<Self, ControlError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ControlError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns [`ControlError::InvalidConfig`] for a zero interval.
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.interval_us == 0 {
            return Err(ControlError::InvalidConfig("interval must be positive".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_micros(self.interval_us)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_us = interval.as_micros() as u64;
        self
    }

    #[must_use]
    pub fn with_cpu(mut self, cpu: bool) -> Self {
        self.cpu = cpu;
        self
    }

    #[must_use]
    pub fn with_native(mut self, native: bool) -> Self {
        self.native = native;
        self
    }

    #[must_use]
    pub fn with_where(mut self, where_mode: bool) -> Self {
        self.where_mode = where_mode;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: SamplingMode) -> Self {
        self.mode = mode;
        self
    }
}
