//! Persisted rate helper for SNMP polled counters.
//!
//! Wraps a span-based [`RateEngine`] together with the elapsed time of polls
//! that timed out before a counter value arrived. The whole thing round-trips
//! through a JSON blob the host stores between poll cycles.

use alloc::string::{String, ToString};

use chrono::TimeDelta;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::buffer::Sample;
use crate::convert::CounterValue;
use crate::delta::{DeltaProvider, DeltaSource};
use crate::engine::{RateConfig, RateEngine};
use crate::error::{RateError, RateResult};
use crate::time::{Span, nanos};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "C: CounterValue"))]
pub struct RateFacade<C> {
    #[serde(rename = "bufferedCarryOver", with = "nanos")]
    buffered_carry_over: TimeDelta,
    #[serde(flatten)]
    engine: RateEngine<C, Span>,
}

/// Rate helper for 32-bit counters (`Counter32`)
pub type SnmpRate32 = RateFacade<u32>;
/// Rate helper for 64-bit counters (`Counter64`)
pub type SnmpRate64 = RateFacade<u64>;

impl<C: CounterValue> RateFacade<C> {
    pub fn new(config: RateConfig) -> Self {
        Self {
            buffered_carry_over: TimeDelta::zero(),
            engine: RateEngine::new(config),
        }
    }

    /// Restore from a blob produced by [`RateFacade::to_json`].
    ///
    /// Blank input gives a fresh helper built from `config`.
    pub fn from_json(blob: &str, config: RateConfig) -> RateResult<Self> {
        if blob.trim().is_empty() {
            return Ok(Self::new(config));
        }

        let facade: Self =
            serde_json::from_str(blob).map_err(|e| RateError::CorruptState(e.to_string()))?;
        facade.engine.check_restored()?;
        Ok(facade)
    }

    pub fn to_json(&self) -> RateResult<String> {
        serde_json::to_string(self).map_err(|e| RateError::Serialization(e.to_string()))
    }

    /// Compute the rate of `counter` using the delta the poller reports for
    /// `row_key`.
    ///
    /// When the delta is unknown nothing changes and `faulty` is returned.
    /// Otherwise the carried-over time is added to the delta and cleared,
    /// whatever the engine makes of the sample.
    pub fn calculate<P: DeltaProvider>(
        &mut self,
        source: &mut DeltaSource<P>,
        counter: C,
        row_key: Option<&str>,
        faulty: f64,
    ) -> f64 {
        let Some(delta) = source.get_delta(row_key) else {
            return faulty;
        };

        let carried = core::mem::replace(&mut self.buffered_carry_over, TimeDelta::zero());
        match carried.checked_add(&delta) {
            Some(elapsed) => self
                .engine
                .calculate(Sample::new(counter, Span::new(elapsed)), faulty),
            None => {
                debug!("Elapsed time overflowed, restarting rate history");
                self.engine.reset();
                faulty
            }
        }
    }

    /// Carry the delta of a timed-out poll over to the next calculation.
    pub fn buffer_delta<P: DeltaProvider>(
        &mut self,
        source: &mut DeltaSource<P>,
        row_key: Option<&str>,
    ) {
        let Some(delta) = source.get_delta(row_key) else {
            return;
        };

        match self.buffered_carry_over.checked_add(&delta) {
            Some(total) => self.buffered_carry_over = total,
            None => debug!("Carried-over time overflowed, keeping previous value"),
        }
    }

    /// Elapsed time waiting to be added to the next calculation
    pub fn carry_over(&self) -> TimeDelta {
        self.buffered_carry_over
    }

    pub fn engine(&self) -> &RateEngine<C, Span> {
        &self.engine
    }
}
