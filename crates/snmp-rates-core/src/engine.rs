//! Rate engine
//!
//! Turns a stream of raw counter samples into a normalized rate. Every call
//! appends the incoming sample to the history, and the rate is measured
//! against the newest buffered sample that lies at least `min_delta` in the
//! past. Counter increases use modular subtraction so a single wrap between
//! baseline and new sample still gives the right answer.

use alloc::string::{String, ToString};

use chrono::{DateTime, TimeDelta, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::buffer::{BaselineScan, Sample, SampleBuffer};
use crate::convert::CounterValue;
use crate::error::{RateError, RateResult};
use crate::time::{SampleTime, Span, nanos};
use crate::units::RateBase;

/// Validated engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateConfig {
    min_delta: TimeDelta,
    max_delta: TimeDelta,
    rate_base: RateBase,
}

impl RateConfig {
    /// Build a configuration.
    ///
    /// Both deltas must be non-negative and `max_delta` must be strictly
    /// greater than `min_delta`.
    pub fn new(
        min_delta: TimeDelta,
        max_delta: TimeDelta,
        rate_base: RateBase,
    ) -> RateResult<Self> {
        if min_delta < TimeDelta::zero() {
            return Err(RateError::InvalidConfiguration {
                reason: "minDelta must not be negative",
            });
        }
        if max_delta < TimeDelta::zero() {
            return Err(RateError::InvalidConfiguration {
                reason: "maxDelta must not be negative",
            });
        }
        if max_delta <= min_delta {
            return Err(RateError::InvalidConfiguration {
                reason: "maxDelta must be greater than minDelta",
            });
        }

        Ok(Self {
            min_delta,
            max_delta,
            rate_base,
        })
    }

    /// Shortest window a rate may be measured over
    pub const fn min_delta(&self) -> TimeDelta {
        self.min_delta
    }

    /// Longest gap between samples before the history restarts
    pub const fn max_delta(&self) -> TimeDelta {
        self.max_delta
    }

    pub const fn rate_base(&self) -> RateBase {
        self.rate_base
    }
}

impl Default for RateConfig {
    /// 5 second minimum window, 10 minute maximum gap, per-second rates
    fn default() -> Self {
        Self {
            min_delta: TimeDelta::seconds(5),
            max_delta: TimeDelta::minutes(10),
            rate_base: RateBase::Second,
        }
    }
}

/// Result of feeding one sample to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateOutcome {
    /// Rate measured against a baseline
    Rate(f64),
    /// No buffered sample lies far enough in the past yet
    NoBaseline,
    /// Time ran backwards between the sample and a baseline candidate
    ClockRegression,
}

impl RateOutcome {
    /// Collapse to a plain value, substituting `faulty` for every non-rate
    /// outcome.
    pub fn or_faulty(self, faulty: f64) -> f64 {
        match self {
            Self::Rate(rate) => rate,
            Self::NoBaseline | Self::ClockRegression => faulty,
        }
    }

    pub fn rate(self) -> Option<f64> {
        match self {
            Self::Rate(rate) => Some(rate),
            _ => None,
        }
    }
}

/// Rate calculator over counters of width `C` sampled on clock `T`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "C: CounterValue, T: SampleTime"))]
pub struct RateEngine<C, T> {
    rate_base: RateBase,
    #[serde(with = "nanos")]
    min_delta: TimeDelta,
    #[serde(with = "nanos")]
    max_delta: TimeDelta,
    samples: SampleBuffer<C, T>,
}

/// 32-bit counters, relative sample spans
pub type Rate32OnSpans = RateEngine<u32, Span>;
/// 64-bit counters, relative sample spans
pub type Rate64OnSpans = RateEngine<u64, Span>;
/// 32-bit counters, absolute sample timestamps
pub type Rate32OnTimestamps = RateEngine<u32, DateTime<Utc>>;
/// 64-bit counters, absolute sample timestamps
pub type Rate64OnTimestamps = RateEngine<u64, DateTime<Utc>>;

impl<C: CounterValue, T: SampleTime> RateEngine<C, T> {
    /// Create an engine with an empty history
    pub fn new(config: RateConfig) -> Self {
        Self {
            rate_base: config.rate_base,
            min_delta: config.min_delta,
            max_delta: config.max_delta,
            samples: SampleBuffer::new(),
        }
    }

    pub fn config(&self) -> RateConfig {
        RateConfig {
            min_delta: self.min_delta,
            max_delta: self.max_delta,
            rate_base: self.rate_base,
        }
    }

    /// Buffered history, oldest first
    pub fn samples(&self) -> &SampleBuffer<C, T> {
        &self.samples
    }

    /// Forget all history while keeping the configuration
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// Feed one sample and report what could be measured.
    ///
    /// The sample is always appended so it can serve as a later baseline.
    pub fn evaluate(&mut self, sample: Sample<C, T>) -> RateOutcome {
        self.samples.reset_if_discontinuous(&sample, self.max_delta);

        if sample.time.is_regression() {
            debug!("Sample clock went backwards: {:?}", sample.time);
            self.samples.push(sample);
            return RateOutcome::ClockRegression;
        }

        let outcome = match self.samples.find_baseline(&sample, self.min_delta) {
            BaselineScan::Found {
                index,
                elapsed,
                counter,
            } => {
                let increase = sample.counter.increase_since(counter);
                self.samples.prune_before(index);
                RateOutcome::Rate(self.rate_base.rate(increase, elapsed))
            }
            BaselineScan::Regressed { index } => {
                debug!("Buffered sample {} lies after the new sample", index);
                RateOutcome::ClockRegression
            }
            BaselineScan::NotFound => {
                debug!(
                    "No baseline at least {}ms old among {} samples",
                    self.min_delta.num_milliseconds(),
                    self.samples.len()
                );
                RateOutcome::NoBaseline
            }
        };

        self.samples.push(sample);
        outcome
    }

    /// Feed one sample, returning `faulty` when no rate could be measured
    pub fn calculate(&mut self, sample: Sample<C, T>, faulty: f64) -> f64 {
        self.evaluate(sample).or_faulty(faulty)
    }

    /// Serialize configuration and history
    pub fn to_json(&self) -> RateResult<String> {
        serde_json::to_string(self).map_err(|e| RateError::Serialization(e.to_string()))
    }

    /// Restore an engine from [`RateEngine::to_json`] output.
    ///
    /// A blank blob yields a fresh engine built from `config`. Otherwise the
    /// blob is restored as-is, configuration included.
    pub fn from_json(blob: &str, config: RateConfig) -> RateResult<Self> {
        if blob.trim().is_empty() {
            return Ok(Self::new(config));
        }

        let engine: Self =
            serde_json::from_str(blob).map_err(|e| RateError::CorruptState(e.to_string()))?;
        engine.check_restored()?;
        Ok(engine)
    }

    /// Reject restored state whose configuration could never have been built
    pub(crate) fn check_restored(&self) -> RateResult<()> {
        RateConfig::new(self.min_delta, self.max_delta, self.rate_base)
            .map(|_| ())
            .map_err(|e| RateError::CorruptState(e.to_string()))
    }
}

impl<C: CounterValue> RateEngine<C, Span> {
    /// Feed a counter read `elapsed` after the previous one
    pub fn calculate_span(&mut self, counter: C, elapsed: TimeDelta, faulty: f64) -> f64 {
        self.calculate(Sample::new(counter, Span::new(elapsed)), faulty)
    }
}

impl<C: CounterValue> RateEngine<C, DateTime<Utc>> {
    /// Feed a counter read at `time`
    pub fn calculate_at(&mut self, counter: C, time: DateTime<Utc>, faulty: f64) -> f64 {
        self.calculate(Sample::new(counter, time), faulty)
    }
}
