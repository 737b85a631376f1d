//! Elapsed-time source for polled SNMP groups.
//!
//! The poller knows how long it has been since a group was last executed,
//! either as a single value for the whole group ([`CalculationMode::Fast`])
//! or per table row ([`CalculationMode::Accurate`]). [`DeltaSource`] wraps
//! that collaborator, loads its answer once per cycle and hands out the
//! delta for each row.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use chrono::TimeDelta;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RateError;
use crate::time::from_reported_millis;

/// How the poller tracks elapsed time for a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CalculationMode {
    /// One delta shared by every row of the group
    #[default]
    Fast = 1,
    /// A delta per row key
    Accurate = 2,
}

impl TryFrom<i64> for CalculationMode {
    type Error = RateError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Fast),
            2 => Ok(Self::Accurate),
            other => Err(RateError::UnsupportedCalculationMode(other)),
        }
    }
}

/// Raw answer of the poller when asked for group deltas.
///
/// Millisecond values are as reported; negative values mean "not known yet".
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaReport {
    /// Single delta for the whole group
    Scalar(i64),
    /// `(row key, delta)` pairs
    PerKey(Vec<(String, i64)>),
    /// The poller could not answer
    Unavailable,
}

impl DeltaReport {
    /// Interpret a loosely typed poller response.
    ///
    /// A number is a scalar, an array of `[key, ms]` pairs is a per-key
    /// report (malformed pairs are logged and skipped), `null` is
    /// unavailable. Any other shape is logged and treated as unavailable.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Unavailable,
            Value::Number(_) => match millis(value) {
                Some(ms) => Self::Scalar(ms),
                None => {
                    error!("Delta value {} is not an integer millisecond count", value);
                    Self::Unavailable
                }
            },
            Value::Array(entries) => {
                let pairs = entries
                    .iter()
                    .enumerate()
                    .filter_map(|(index, entry)| {
                        let pair = key_and_millis(entry);
                        if pair.is_none() {
                            error!("Unexpected format for delta entry {}: {}", index, entry);
                        }
                        pair
                    })
                    .collect();
                Self::PerKey(pairs)
            }
            other => {
                error!("Unexpected delta response format: {}", other);
                Self::Unavailable
            }
        }
    }
}

fn millis(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|ms| ms.is_finite()).map(|ms| ms as i64))
}

fn key_and_millis(entry: &Value) -> Option<(String, i64)> {
    let [key, ms] = entry.as_array()?.as_slice() else {
        return None;
    };

    let key = match key {
        Value::String(key) => key.clone(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };

    Some((key, millis(ms)?))
}

/// The poller-side collaborator that measures group execution intervals.
pub trait DeltaProvider {
    /// Deltas of the last execution of `group_id`
    fn fetch_deltas(&mut self, group_id: u32, mode: CalculationMode) -> DeltaReport;

    /// Enable or disable per-row delta tracking for `group_id`
    fn set_row_tracking(&mut self, group_id: u32, enabled: bool);
}

impl<P: DeltaProvider + ?Sized> DeltaProvider for &mut P {
    fn fetch_deltas(&mut self, group_id: u32, mode: CalculationMode) -> DeltaReport {
        (**self).fetch_deltas(group_id, mode)
    }

    fn set_row_tracking(&mut self, group_id: u32, enabled: bool) {
        (**self).set_row_tracking(group_id, enabled)
    }
}

#[derive(Debug, Default)]
struct LoadedDeltas {
    scalar: Option<TimeDelta>,
    per_key: BTreeMap<String, Option<TimeDelta>>,
}

/// Per-cycle view of the deltas of one polled group.
///
/// The provider is queried at most once until the mode changes.
#[derive(Debug)]
pub struct DeltaSource<P> {
    provider: P,
    group_id: u32,
    mode: CalculationMode,
    loaded: Option<LoadedDeltas>,
}

impl<P: DeltaProvider> DeltaSource<P> {
    pub fn new(provider: P, group_id: u32, mode: CalculationMode) -> Self {
        Self {
            provider,
            group_id,
            mode,
            loaded: None,
        }
    }

    /// Build from the host's raw calculation-method value (1 or 2)
    pub fn from_method(provider: P, group_id: u32, method: i64) -> Result<Self, RateError> {
        Ok(Self::new(provider, group_id, CalculationMode::try_from(method)?))
    }

    pub fn mode(&self) -> CalculationMode {
        self.mode
    }

    pub fn group_id(&self) -> u32 {
        self.group_id
    }

    /// Elapsed time for `row_key`, or `None` when it is not known.
    ///
    /// In accurate mode a row the poller has no entry for (it appeared
    /// between two polls) falls back to the group-level delta, if any.
    pub fn get_delta(&mut self, row_key: Option<&str>) -> Option<TimeDelta> {
        let mode = self.mode;
        let group_id = self.group_id;
        let loaded = self
            .loaded
            .get_or_insert_with(|| load(&mut self.provider, group_id, mode));

        let delta = match (mode, row_key) {
            (CalculationMode::Accurate, Some(key)) => match loaded.per_key.get(key) {
                Some(delta) => *delta,
                None => loaded.scalar,
            },
            _ => loaded.scalar,
        };

        if delta.is_none() {
            debug!("Delta of group {} unavailable for row {:?}", group_id, row_key);
        }
        delta
    }

    /// Tell the poller whether rows should be tracked individually and
    /// switch to `mode`. Cached deltas are dropped.
    pub fn set_tracking_mode(&mut self, mode: CalculationMode) {
        info!("Group {} delta tracking set to {:?}", self.group_id, mode);
        self.provider
            .set_row_tracking(self.group_id, mode == CalculationMode::Accurate);
        self.mode = mode;
        self.loaded = None;
    }

    pub fn into_inner(self) -> P {
        self.provider
    }
}

fn load<P: DeltaProvider>(provider: &mut P, group_id: u32, mode: CalculationMode) -> LoadedDeltas {
    let mut loaded = LoadedDeltas::default();

    match (mode, provider.fetch_deltas(group_id, mode)) {
        (_, DeltaReport::Scalar(ms)) => loaded.scalar = from_reported_millis(ms),
        (CalculationMode::Accurate, DeltaReport::PerKey(pairs)) => {
            loaded.per_key = pairs
                .into_iter()
                .map(|(key, ms)| (key, from_reported_millis(ms)))
                .collect();
        }
        (CalculationMode::Fast, DeltaReport::PerKey(_)) => {
            error!("Group {} returned per-row deltas while in fast mode", group_id);
        }
        (_, DeltaReport::Unavailable) => {
            debug!("Group {} has no delta available", group_id);
        }
    }

    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use serde_json::json;

    struct MockProvider {
        report: DeltaReport,
        fetches: usize,
        tracking: Vec<(u32, bool)>,
    }

    impl MockProvider {
        fn new(report: DeltaReport) -> Self {
            Self {
                report,
                fetches: 0,
                tracking: Vec::new(),
            }
        }
    }

    impl DeltaProvider for MockProvider {
        fn fetch_deltas(&mut self, _group_id: u32, _mode: CalculationMode) -> DeltaReport {
            self.fetches += 1;
            self.report.clone()
        }

        fn set_row_tracking(&mut self, group_id: u32, enabled: bool) {
            self.tracking.push((group_id, enabled));
        }
    }

    fn per_key(pairs: &[(&str, i64)]) -> DeltaReport {
        DeltaReport::PerKey(pairs.iter().map(|(k, ms)| (k.to_string(), *ms)).collect())
    }

    #[test]
    fn test_mode_from_host_value() {
        assert_eq!(CalculationMode::try_from(1i64), Ok(CalculationMode::Fast));
        assert_eq!(CalculationMode::try_from(2i64), Ok(CalculationMode::Accurate));
        assert_eq!(
            CalculationMode::try_from(3i64),
            Err(RateError::UnsupportedCalculationMode(3))
        );
    }

    #[test]
    fn test_from_method_rejects_unknown_value() {
        let mut mock = MockProvider::new(DeltaReport::Unavailable);
        assert!(DeltaSource::from_method(&mut mock, 1, 0).is_err());
        assert!(DeltaSource::from_method(&mut mock, 1, 2).is_ok());
    }

    #[test]
    fn test_fast_mode_scalar() {
        let mut mock = MockProvider::new(DeltaReport::Scalar(10_000));
        let mut source = DeltaSource::new(&mut mock, 100, CalculationMode::Fast);

        assert_eq!(source.get_delta(None), Some(TimeDelta::seconds(10)));
        assert_eq!(source.get_delta(Some("1")), Some(TimeDelta::seconds(10)));
        assert_eq!(mock.fetches, 1);
    }

    #[test]
    fn test_accurate_mode_per_key() {
        let mut mock = MockProvider::new(per_key(&[("1", 10_000), ("2", 12_500), ("3", -1)]));
        let mut source = DeltaSource::new(&mut mock, 100, CalculationMode::Accurate);

        assert_eq!(source.get_delta(Some("1")), Some(TimeDelta::seconds(10)));
        assert_eq!(source.get_delta(Some("2")), Some(TimeDelta::milliseconds(12_500)));
        assert_eq!(source.get_delta(Some("3")), None);
        // Row appeared after the last poll, no group-level delta to fall back to
        assert_eq!(source.get_delta(Some("4")), None);
        assert_eq!(mock.fetches, 1);
    }

    #[test]
    fn test_accurate_mode_scalar_fallback() {
        let mut mock = MockProvider::new(DeltaReport::Scalar(5_000));
        let mut source = DeltaSource::new(&mut mock, 100, CalculationMode::Accurate);

        assert_eq!(source.get_delta(Some("7")), Some(TimeDelta::seconds(5)));
        assert_eq!(source.get_delta(None), Some(TimeDelta::seconds(5)));
    }

    #[test]
    fn test_negative_scalar_is_unknown() {
        let mut mock = MockProvider::new(DeltaReport::Scalar(-1));
        let mut source = DeltaSource::new(&mut mock, 100, CalculationMode::Fast);
        assert_eq!(source.get_delta(None), None);
    }

    #[test]
    fn test_fast_mode_rejects_per_key() {
        let mut mock = MockProvider::new(per_key(&[("1", 10_000)]));
        let mut source = DeltaSource::new(&mut mock, 100, CalculationMode::Fast);

        assert_eq!(source.get_delta(Some("1")), None);
        assert_eq!(source.get_delta(None), None);
    }

    #[test]
    fn test_unavailable_report() {
        let mut mock = MockProvider::new(DeltaReport::Unavailable);
        let mut source = DeltaSource::new(&mut mock, 100, CalculationMode::Accurate);
        assert_eq!(source.get_delta(Some("1")), None);
    }

    #[test]
    fn test_set_tracking_mode_notifies_and_reloads() {
        let mut mock = MockProvider::new(DeltaReport::Scalar(1_000));
        let mut source = DeltaSource::new(&mut mock, 42, CalculationMode::Fast);

        source.get_delta(None);
        source.set_tracking_mode(CalculationMode::Accurate);
        assert_eq!(source.mode(), CalculationMode::Accurate);
        source.get_delta(Some("1"));
        source.set_tracking_mode(CalculationMode::Fast);

        assert_eq!(mock.tracking, vec![(42, true), (42, false)]);
        assert_eq!(mock.fetches, 2);
    }

    #[test]
    fn test_report_from_value() {
        assert_eq!(DeltaReport::from_value(&json!(10000)), DeltaReport::Scalar(10_000));
        assert_eq!(DeltaReport::from_value(&json!(-1)), DeltaReport::Scalar(-1));
        assert_eq!(DeltaReport::from_value(&Value::Null), DeltaReport::Unavailable);
        assert_eq!(
            DeltaReport::from_value(&json!([["1", 1000], [2, 2000]])),
            per_key(&[("1", 1_000), ("2", 2_000)])
        );
    }

    #[test]
    fn test_report_from_value_skips_malformed_entries() {
        let value = json!([["1", 1000], ["2"], "3", ["4", "soon"], ["5", 5000]]);
        assert_eq!(
            DeltaReport::from_value(&value),
            per_key(&[("1", 1_000), ("5", 5_000)])
        );
    }

    #[test]
    fn test_report_from_value_rejects_other_shapes() {
        assert_eq!(DeltaReport::from_value(&json!("10000")), DeltaReport::Unavailable);
        assert_eq!(DeltaReport::from_value(&json!({"delta": 1})), DeltaReport::Unavailable);
    }
}
