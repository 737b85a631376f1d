//! Saturating conversion of polled values to unsigned counters.
//!
//! Hosts typically store polled counters as `f64`. A counter close to the top
//! of its range can come back rounded past the maximum, so converting it back
//! must never fail.

use core::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Smallest `f64` that no longer fits in a `u64` (2^64).
const U64_OVERFLOW: f64 = 18_446_744_073_709_551_616.0;

/// Smallest `f64` that rounds (half to even) past `u32::MAX`.
const U32_OVERFLOW: f64 = 4_294_967_295.5;

/// Convert to `u32`, rounding half to even.
///
/// NaN and anything outside the `u32` range (including values rounding below
/// zero) returns `u32::MAX`.
pub fn to_u32(value: f64) -> u32 {
    if value >= U32_OVERFLOW {
        return u32::MAX;
    }

    match round_half_even(value) {
        Some(rounded) => rounded as u32,
        None => u32::MAX,
    }
}

/// Convert to `u64`, rounding half to even.
///
/// NaN and anything outside the `u64` range (including values rounding below
/// zero) returns `u64::MAX`.
pub fn to_u64(value: f64) -> u64 {
    round_half_even(value).unwrap_or(u64::MAX)
}

/// Round a non-negative value to the nearest integer, ties to even.
///
/// Returns `None` when the result is not representable as `u64`.
fn round_half_even(value: f64) -> Option<u64> {
    if value.is_nan() || value < -0.5 || value >= U64_OVERFLOW {
        return None;
    }
    if value <= 0.5 {
        return Some(0);
    }

    // `as` truncates toward zero. Above 2^53 every f64 is already integral,
    // so the fraction below is exact wherever it can be non-zero.
    let truncated = value as u64;
    let fraction = value - truncated as f64;

    let rounded = if fraction > 0.5 {
        truncated + 1
    } else if fraction == 0.5 {
        truncated + (truncated & 1)
    } else {
        truncated
    };

    Some(rounded)
}

/// Unsigned counter width the rate engine can work with.
///
/// Increases are computed with modular subtraction, so a counter that wrapped
/// once between two samples still yields the correct small positive delta.
pub trait CounterValue: Copy + Debug + PartialEq + Serialize + DeserializeOwned {
    /// Largest representable counter value
    const MAX: Self;

    /// Increase from `older` to `self`, modulo the counter width.
    fn increase_since(self, older: Self) -> f64;

    /// Convert a polled `f64` value, saturating on overflow.
    fn from_f64_saturating(value: f64) -> Self;
}

impl CounterValue for u32 {
    const MAX: Self = u32::MAX;

    fn increase_since(self, older: Self) -> f64 {
        self.wrapping_sub(older) as f64
    }

    fn from_f64_saturating(value: f64) -> Self {
        to_u32(value)
    }
}

impl CounterValue for u64 {
    const MAX: Self = u64::MAX;

    fn increase_since(self, older: Self) -> f64 {
        self.wrapping_sub(older) as f64
    }

    fn from_f64_saturating(value: f64) -> Self {
        to_u64(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_u32_rounds_to_nearest() {
        assert_eq!(to_u32(0.0), 0);
        assert_eq!(to_u32(41.7), 42);
        assert_eq!(to_u32(41.2), 41);
        assert_eq!(to_u32(1_000_000.0), 1_000_000);
    }

    #[test]
    fn test_to_u32_ties_to_even() {
        assert_eq!(to_u32(0.5), 0);
        assert_eq!(to_u32(1.5), 2);
        assert_eq!(to_u32(2.5), 2);
        assert_eq!(to_u32(3.5), 4);
    }

    #[test]
    fn test_to_u32_clamps_overflow() {
        assert_eq!(to_u32(4_294_967_295.0), u32::MAX);
        assert_eq!(to_u32(4_294_967_295.4), u32::MAX);
        assert_eq!(to_u32(4_294_967_295.5), u32::MAX);
        assert_eq!(to_u32(4_294_967_296.0), u32::MAX);
        assert_eq!(to_u32(1e20), u32::MAX);
        assert_eq!(to_u32(f64::INFINITY), u32::MAX);
    }

    #[test]
    fn test_to_u32_out_of_range_below_zero() {
        assert_eq!(to_u32(-0.4), 0);
        assert_eq!(to_u32(-0.5), 0);
        assert_eq!(to_u32(-1.0), u32::MAX);
        assert_eq!(to_u32(f64::NAN), u32::MAX);
    }

    #[test]
    fn test_to_u64_rounds_and_clamps() {
        assert_eq!(to_u64(2.5), 2);
        assert_eq!(to_u64(7.5), 8);
        assert_eq!(to_u64(4_294_967_296.0), 4_294_967_296);
        // u64::MAX is not representable; the nearest f64 is 2^64.
        assert_eq!(to_u64(u64::MAX as f64), u64::MAX);
        assert_eq!(to_u64(9_007_199_254_740_993.0), 9_007_199_254_740_992);
        assert_eq!(to_u64(-3.0), u64::MAX);
    }

    #[test]
    fn test_increase_wraps_around() {
        assert_eq!(9u32.increase_since(u32::MAX - 10), 20.0);
        assert_eq!(9u64.increase_since(u64::MAX - 10), 20.0);
        assert_eq!(50u32.increase_since(5), 45.0);
    }

    #[test]
    fn test_from_f64_saturating_per_width() {
        assert_eq!(u32::from_f64_saturating(5e9), u32::MAX);
        assert_eq!(u64::from_f64_saturating(5e9), 5_000_000_000);
    }
}
