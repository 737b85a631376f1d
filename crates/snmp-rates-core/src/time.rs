//! Time representations a sample can carry.
//!
//! Two clocks are supported with the same algorithmic shape:
//!
//! - [`Span`]: the elapsed time since the previous sample (what an SNMP
//!   poller reports per group execution)
//! - [`DateTime<Utc>`]: an absolute timestamp taken when the counter was read
//!
//! Both answer "how much time passed between two buffered samples", which is
//! all the baseline scan needs.

use core::fmt::Debug;

use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Clock carried by every buffered sample.
pub trait SampleTime: Copy + Debug + PartialEq + Serialize + DeserializeOwned {
    /// Elapsed time between `previous` and `self`.
    fn elapsed_since(&self, previous: &Self) -> TimeDelta;

    /// Whether `gap` (elapsed since the newest buffered sample) makes the
    /// sequence discontinuous, in which case the buffer restarts.
    fn breaks_sequence(gap: TimeDelta, max_delta: TimeDelta) -> bool {
        gap > max_delta
    }

    /// Whether this sample claims time ran backwards.
    fn is_regression(&self) -> bool {
        false
    }
}

/// Elapsed time since the previous sample.
///
/// Signed: a host clock that regressed still produces a representable (but
/// rejected) span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Span(#[serde(with = "nanos")] TimeDelta);

impl Span {
    /// Span of a first poll with no previous reading.
    pub const ZERO: Span = Span(TimeDelta::zero());

    /// Wrap a span reported by the poller. Negative spans are accepted.
    pub const fn new(delta: TimeDelta) -> Self {
        Self(delta)
    }

    /// The wrapped span, possibly negative
    pub const fn delta(self) -> TimeDelta {
        self.0
    }
}

impl From<TimeDelta> for Span {
    fn from(delta: TimeDelta) -> Self {
        Self(delta)
    }
}

impl SampleTime for Span {
    fn elapsed_since(&self, _previous: &Self) -> TimeDelta {
        self.0
    }

    fn is_regression(&self) -> bool {
        self.0 < TimeDelta::zero()
    }
}

impl SampleTime for DateTime<Utc> {
    fn elapsed_since(&self, previous: &Self) -> TimeDelta {
        *self - *previous
    }

    // A timestamp that does not move forward means the device clock jumped.
    fn breaks_sequence(gap: TimeDelta, max_delta: TimeDelta) -> bool {
        gap <= TimeDelta::zero() || gap > max_delta
    }
}

/// Total length of `delta` in (fractional) seconds.
pub fn total_seconds(delta: TimeDelta) -> f64 {
    // subsec_nanos carries the same sign as num_seconds
    delta.num_seconds() as f64 + delta.subsec_nanos() as f64 / 1_000_000_000.0
}

/// Sum two spans, `None` on overflow.
pub(crate) fn checked_sum(lhs: TimeDelta, rhs: TimeDelta) -> Option<TimeDelta> {
    lhs.checked_add(&rhs)
}

/// Convert a millisecond count reported by a host. Negative counts are the
/// host's "not known yet" marker.
pub fn from_reported_millis(millis: i64) -> Option<TimeDelta> {
    if millis < 0 {
        return None;
    }
    TimeDelta::try_milliseconds(millis)
}

/// Serde helpers storing a [`TimeDelta`] as whole nanoseconds.
pub mod nanos {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer, ser::Error};

    pub fn serialize<S>(delta: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match delta.num_nanoseconds() {
            Some(nanos) => serializer.serialize_i64(nanos),
            None => Err(S::Error::custom("time span exceeds the nanosecond range")),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<TimeDelta, D::Error>
    where
        D: Deserializer<'de>,
    {
        i64::deserialize(deserializer).map(TimeDelta::nanoseconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_span_elapsed_ignores_previous() {
        let previous = Span::new(TimeDelta::seconds(30));
        let span = Span::new(TimeDelta::seconds(10));
        assert_eq!(span.elapsed_since(&previous), TimeDelta::seconds(10));
    }

    #[test]
    fn test_timestamp_elapsed_is_difference() {
        assert_eq!(at(70).elapsed_since(&at(10)), TimeDelta::seconds(60));
    }

    #[test]
    fn test_span_breaks_only_past_max() {
        let max = TimeDelta::minutes(10);
        assert!(!Span::breaks_sequence(TimeDelta::minutes(10), max));
        assert!(Span::breaks_sequence(TimeDelta::minutes(11), max));
        assert!(!Span::breaks_sequence(TimeDelta::zero(), max));
    }

    #[test]
    fn test_timestamp_breaks_when_not_moving_forward() {
        let max = TimeDelta::minutes(10);
        assert!(<DateTime<Utc> as SampleTime>::breaks_sequence(TimeDelta::zero(), max));
        assert!(<DateTime<Utc> as SampleTime>::breaks_sequence(TimeDelta::seconds(-1), max));
        assert!(<DateTime<Utc> as SampleTime>::breaks_sequence(TimeDelta::minutes(11), max));
        assert!(!<DateTime<Utc> as SampleTime>::breaks_sequence(TimeDelta::seconds(1), max));
    }

    #[test]
    fn test_negative_span_is_regression() {
        assert!(Span::new(TimeDelta::seconds(-10)).is_regression());
        assert!(!Span::ZERO.is_regression());
        assert!(!at(0).is_regression());
    }

    #[test]
    fn test_total_seconds_keeps_fraction_and_sign() {
        assert_eq!(total_seconds(TimeDelta::milliseconds(1500)), 1.5);
        assert_eq!(total_seconds(TimeDelta::milliseconds(-1500)), -1.5);
        assert_eq!(total_seconds(TimeDelta::seconds(100)), 100.0);
    }

    #[test]
    fn test_reported_millis_sentinel() {
        assert_eq!(from_reported_millis(-1), None);
        assert_eq!(from_reported_millis(0), Some(TimeDelta::zero()));
        assert_eq!(from_reported_millis(10_000), Some(TimeDelta::seconds(10)));
    }

    #[test]
    fn test_span_serializes_as_nanoseconds() {
        let span = Span::new(TimeDelta::milliseconds(1500));
        let json = serde_json::to_string(&span).unwrap();
        assert_eq!(json, "1500000000");
        let restored: Span = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, span);
    }
}
