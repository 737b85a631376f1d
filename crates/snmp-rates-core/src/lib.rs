//! Host-independent core library for snmp-rates
//!
//! This crate contains the counter rate engine: safe conversion of polled
//! values, the sample buffer, the baseline/wraparound rate algorithm, the
//! elapsed-time source abstraction and the persisted rate facade.
//!
//! It is `#![no_std]` with `extern crate alloc` so it builds for embedded
//! pollers as well as desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod buffer;
pub mod convert;
pub mod delta;
pub mod engine;
pub mod error;
pub mod facade;
pub mod time;
pub mod units;

pub use buffer::{BaselineScan, Sample, SampleBuffer};
pub use convert::{CounterValue, to_u32, to_u64};
pub use delta::{CalculationMode, DeltaProvider, DeltaReport, DeltaSource};
pub use engine::{
    Rate32OnSpans, Rate32OnTimestamps, Rate64OnSpans, Rate64OnTimestamps, RateConfig, RateEngine,
    RateOutcome,
};
pub use error::{RateError, RateResult};
pub use facade::{RateFacade, SnmpRate32, SnmpRate64};
pub use time::{SampleTime, Span};
pub use units::{BITS_PER_OCTET, RateBase, octets_to_bits};
