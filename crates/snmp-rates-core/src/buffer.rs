//! Ordered sample history used to pick rate baselines.

use alloc::collections::VecDeque;

use chrono::TimeDelta;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::convert::CounterValue;
use crate::time::{SampleTime, checked_sum};

/// A counter reading together with the clock it was taken at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "C: CounterValue, T: SampleTime"))]
pub struct Sample<C, T> {
    /// Raw counter value
    pub counter: C,
    /// Span since the previous reading, or absolute timestamp
    pub time: T,
}

impl<C, T> Sample<C, T> {
    pub const fn new(counter: C, time: T) -> Self {
        Self { counter, time }
    }
}

/// Result of looking for a rate baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BaselineScan<C> {
    /// Newest sample at least `min_delta` old
    Found {
        index: usize,
        elapsed: TimeDelta,
        counter: C,
    },
    /// Every buffered sample is too recent
    NotFound,
    /// Elapsed time to the candidate at `index` is negative
    Regressed { index: usize },
}

/// Sample history, oldest first.
///
/// Samples are kept in non-decreasing time order. The buffer stays small on
/// its own: after every successful calculation everything older than the
/// chosen baseline is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
#[serde(bound(deserialize = "C: CounterValue, T: SampleTime"))]
pub struct SampleBuffer<C, T> {
    samples: VecDeque<Sample<C, T>>,
}

impl<C, T> Default for SampleBuffer<C, T> {
    fn default() -> Self {
        Self {
            samples: VecDeque::new(),
        }
    }
}

impl<C: CounterValue, T: SampleTime> SampleBuffer<C, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Most recently appended sample
    pub fn newest(&self) -> Option<&Sample<C, T>> {
        self.samples.back()
    }

    pub fn get(&self, index: usize) -> Option<&Sample<C, T>> {
        self.samples.get(index)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Sample<C, T>> {
        self.samples.iter()
    }

    /// Drop all history
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Append a sample as the newest entry
    pub fn push(&mut self, sample: Sample<C, T>) {
        self.samples.push_back(sample);
    }

    /// Clear the buffer when `incoming` cannot continue the current sequence
    /// (long outage, clock jump, device reboot).
    ///
    /// Returns whether the history was dropped.
    pub fn reset_if_discontinuous(
        &mut self,
        incoming: &Sample<C, T>,
        max_delta: TimeDelta,
    ) -> bool {
        let Some(newest) = self.newest() else {
            return false;
        };

        let gap = incoming.time.elapsed_since(&newest.time);
        if !T::breaks_sequence(gap, max_delta) {
            return false;
        }

        debug!(
            "Sequence broken ({}ms since newest sample), dropping {} samples",
            gap.num_milliseconds(),
            self.samples.len()
        );
        self.samples.clear();
        true
    }

    /// Find the newest buffered sample that lies at least `min_delta` before
    /// `incoming`.
    ///
    /// Walks from newest to oldest accumulating elapsed time. The scan stops
    /// as soon as any candidate would lie in the future of `incoming`, which
    /// only happens when a regressed clock is still buffered.
    pub fn find_baseline(
        &self,
        incoming: &Sample<C, T>,
        min_delta: TimeDelta,
    ) -> BaselineScan<C> {
        let mut later = &incoming.time;
        let mut elapsed = TimeDelta::zero();

        for (index, candidate) in self.samples.iter().enumerate().rev() {
            let Some(total) = checked_sum(elapsed, later.elapsed_since(&candidate.time)) else {
                return BaselineScan::NotFound;
            };
            elapsed = total;

            if elapsed < TimeDelta::zero() {
                return BaselineScan::Regressed { index };
            }
            if elapsed >= min_delta && elapsed > TimeDelta::zero() {
                return BaselineScan::Found {
                    index,
                    elapsed,
                    counter: candidate.counter,
                };
            }

            later = &candidate.time;
        }

        BaselineScan::NotFound
    }

    /// Discard every sample older than `index`, keeping the one at `index`.
    pub fn prune_before(&mut self, index: usize) {
        let count = index.min(self.samples.len());
        self.samples.drain(..count);
    }
}
