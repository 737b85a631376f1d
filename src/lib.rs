//! Host-side glue for SNMP counter rates.
//!
//! Loads processor settings, restores the per-counter rate state the host
//! keeps between poll cycles, and runs the rate engine from
//! [`snmp_rates_core`] for standalone counters and stream tables.

pub mod config;
pub mod counter;
pub mod state;
pub mod streams;

pub use config::{ConfigError, ProcessorSettings};
pub use counter::{CounterProcessor, CounterReading, CounterUpdate};
pub use streams::{StoredRow, StreamRow, StreamUpdate, StreamsProcessor, TimeoutUpdate};
