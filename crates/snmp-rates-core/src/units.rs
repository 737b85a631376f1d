//! Rate normalization units

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::time::total_seconds;

/// Number of bits in one octet
pub const BITS_PER_OCTET: f64 = 8.0;

/// Time unit a computed rate is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RateBase {
    /// Increase per second
    #[default]
    Second,
    /// Increase per minute
    Minute,
    /// Increase per hour
    Hour,
    /// Increase per day
    Day,
}

impl RateBase {
    /// Length of one unit in seconds
    pub const fn unit_secs(self) -> f64 {
        match self {
            Self::Second => 1.0,
            Self::Minute => 60.0,
            Self::Hour => 3_600.0,
            Self::Day => 86_400.0,
        }
    }

    /// Express `elapsed` in this unit
    pub fn units_in(self, elapsed: TimeDelta) -> f64 {
        total_seconds(elapsed) / self.unit_secs()
    }

    /// Normalize a counter increase observed over `elapsed`
    pub fn rate(self, increase: f64, elapsed: TimeDelta) -> f64 {
        increase / self.units_in(elapsed)
    }
}

/// Convert an octet rate to a bit rate.
///
/// Only strictly positive rates are scaled so that a negative faulty-return
/// sentinel reaches the caller untouched.
pub fn octets_to_bits(octet_rate: f64) -> f64 {
    if octet_rate > 0.0 {
        octet_rate * BITS_PER_OCTET
    } else {
        octet_rate
    }
}
