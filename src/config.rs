//! Processor settings as provisioned by the host.

use std::fs;
use std::path::Path;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use snmp_rates_core::{CalculationMode, RateBase, RateConfig, RateError};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse processor settings: {0}")]
    Parse(String),
    #[error("Failed to read processor settings: {0}")]
    Io(String),
    #[error("Invalid processor settings: {0}")]
    Invalid(RateError),
}

impl From<RateError> for ConfigError {
    fn from(error: RateError) -> Self {
        Self::Invalid(error)
    }
}

/// Settings shared by every rate a processor computes.
///
/// Every field is optional in the JSON form.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessorSettings {
    /// SNMP group whose execution deltas are used
    pub group_id: u32,
    pub min_delta_ms: i64,
    pub max_delta_ms: i64,
    pub rate_base: RateBase,
    pub calculation_mode: CalculationMode,
    /// Value reported whenever no rate can be computed
    pub faulty_return: f64,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            group_id: 100,
            min_delta_ms: 5_000,
            max_delta_ms: 600_000,
            rate_base: RateBase::Second,
            calculation_mode: CalculationMode::Fast,
            faulty_return: -1.0,
        }
    }
}

impl ProcessorSettings {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Validated engine configuration
    pub fn rate_config(&self) -> Result<RateConfig, ConfigError> {
        let min_delta = millis(self.min_delta_ms, "minDeltaMs is out of range")?;
        let max_delta = millis(self.max_delta_ms, "maxDeltaMs is out of range")?;
        Ok(RateConfig::new(min_delta, max_delta, self.rate_base)?)
    }
}

fn millis(ms: i64, reason: &'static str) -> Result<TimeDelta, ConfigError> {
    TimeDelta::try_milliseconds(ms).ok_or(ConfigError::Invalid(
        RateError::InvalidConfiguration { reason },
    ))
}
