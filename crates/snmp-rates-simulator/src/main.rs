//! Poll-cycle simulator for snmp-rates.
//!
//! Replays a synthetic SNMP agent exposing a stream table through
//! [`StreamsProcessor`] and logs the computed bit rates next to the rates the
//! streams were configured with. The run is deterministic and covers:
//!
//! | Event                      | When                          |
//! |----------------------------|-------------------------------|
//! | 32-bit counter wrap        | first stream, early cycles    |
//! | Poll timeout               | every [`TIMEOUT_EVERY`] cycle |
//! | Fast to Accurate tracking  | [`ACCURATE_FROM_CYCLE`]       |
//! | New table row              | [`NEW_STREAM_CYCLE`]          |
//! | SNMP agent restart         | [`RESTART_CYCLE`]             |
//!
//! Usage: `snmp-rates-simulator [settings.json]`. Set `RUST_LOG=debug` to see
//! every engine decision.

use std::collections::BTreeMap;

use env_logger::{Builder, Env};
use log::{info, warn};

use snmp_rates::{ConfigError, ProcessorSettings, StoredRow, StreamRow, StreamsProcessor};
use snmp_rates_core::{CalculationMode, DeltaProvider, DeltaReport};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Number of poll cycles to run.
const CYCLES: u32 = 120;

/// Nominal poll interval of the stream table.
const POLL_INTERVAL_MS: i64 = 10_000;

/// Amplitude of the poll interval jitter.
const POLL_JITTER_MS: f64 = 750.0;

/// Every n-th poll times out.
const TIMEOUT_EVERY: u32 = 13;

const ACCURATE_FROM_CYCLE: u32 = 60;
const NEW_STREAM_CYCLE: u32 = 75;
const RESTART_CYCLE: u32 = 95;

/// Log every row once per this many cycles (faulty rates are always logged).
const REPORT_EVERY: u32 = 10;

/// Group used when no settings file is given.
const STREAMS_GROUP_ID: u32 = 1000;

/// Streams present from the start: key, bit rate, initial octet counter.
const INITIAL_STREAMS: [(&str, f64, u64); 2] = [
    // Wraps the 32-bit counter within the first few polls
    ("1", 8_000_000.0, u32::MAX as u64 - 20_000_000),
    ("2", 1_536_000.0, 0),
];

/// Stream appearing in the table at [`NEW_STREAM_CYCLE`].
const LATE_STREAM: (&str, f64, u64) = ("3", 64_000.0, 1_000_000);

// ---------------------------------------------------------------------------
// Mock SNMP agent
// ---------------------------------------------------------------------------

struct SimStream {
    key: String,
    bit_rate: f64,
    /// Octets sent since the agent started, before truncation to 32 bits
    octets: u64,
    /// Whether the poller has seen this row before
    tracked: bool,
}

impl SimStream {
    fn new((key, bit_rate, octets): (&str, f64, u64)) -> Self {
        Self {
            key: key.to_string(),
            bit_rate,
            octets,
            tracked: false,
        }
    }

    /// Value of the `Counter32` as the host stores it
    fn counter(&self) -> f64 {
        (self.octets & u64::from(u32::MAX)) as f64
    }
}

/// Agent plus the poller-side delta bookkeeping for the stream group.
struct MockAgent {
    group_id: u32,
    streams: Vec<SimStream>,
    row_tracking: bool,
    group_delta_ms: i64,
    row_deltas: Vec<(String, i64)>,
}

impl MockAgent {
    fn new(group_id: u32) -> Self {
        Self {
            group_id,
            streams: INITIAL_STREAMS.into_iter().map(SimStream::new).collect(),
            row_tracking: false,
            group_delta_ms: -1,
            row_deltas: Vec::new(),
        }
    }

    fn add_stream(&mut self, stream: (&str, f64, u64)) {
        self.streams.push(SimStream::new(stream));
    }

    /// Counters start over from zero and the poller forgets every row.
    fn restart(&mut self) {
        for stream in &mut self.streams {
            stream.octets = 0;
            stream.tracked = false;
        }
    }

    /// Let `interval_ms` pass and execute the group once.
    fn advance(&mut self, interval_ms: i64) {
        let secs = interval_ms as f64 / 1_000.0;
        self.group_delta_ms = interval_ms;
        self.row_deltas.clear();

        for (index, stream) in self.streams.iter_mut().enumerate() {
            stream.octets += (stream.bit_rate / 8.0 * secs) as u64;

            // Rows are walked one after another, so later rows are read a bit later
            if stream.tracked {
                self.row_deltas
                    .push((stream.key.clone(), interval_ms + index as i64 * 15));
            }
            stream.tracked = true;
        }
    }

    fn rows(&self, rate_data: &BTreeMap<String, String>) -> Vec<StreamRow> {
        self.streams
            .iter()
            .map(|stream| StreamRow {
                key: stream.key.clone(),
                octets: stream.counter(),
                rate_data: rate_data.get(&stream.key).cloned().unwrap_or_default(),
            })
            .collect()
    }

    fn stored_rows(&self, rate_data: &BTreeMap<String, String>) -> Vec<StoredRow> {
        self.streams
            .iter()
            .map(|stream| StoredRow {
                key: stream.key.clone(),
                rate_data: rate_data.get(&stream.key).cloned().unwrap_or_default(),
            })
            .collect()
    }

    fn configured_rate(&self, key: &str) -> f64 {
        self.streams
            .iter()
            .find(|stream| stream.key == key)
            .map_or(0.0, |stream| stream.bit_rate)
    }
}

impl DeltaProvider for MockAgent {
    fn fetch_deltas(&mut self, group_id: u32, mode: CalculationMode) -> DeltaReport {
        if group_id != self.group_id {
            return DeltaReport::Unavailable;
        }

        match (mode, self.row_tracking) {
            (CalculationMode::Accurate, true) => DeltaReport::PerKey(self.row_deltas.clone()),
            _ => DeltaReport::Scalar(self.group_delta_ms),
        }
    }

    fn set_row_tracking(&mut self, group_id: u32, enabled: bool) {
        if group_id == self.group_id {
            self.row_tracking = enabled;
        }
    }
}

/// Poll interval of `cycle`, wobbling around [`POLL_INTERVAL_MS`].
fn jittered_interval(cycle: u32) -> i64 {
    POLL_INTERVAL_MS + (POLL_JITTER_MS * (f64::from(cycle) * 1.3).sin()) as i64
}

fn load_settings() -> Result<ProcessorSettings, ConfigError> {
    match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading processor settings from {}", path);
            ProcessorSettings::from_file(path)
        }
        None => Ok(ProcessorSettings {
            group_id: STREAMS_GROUP_ID,
            ..ProcessorSettings::default()
        }),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<(), ConfigError> {
    Builder::from_env(Env::default().default_filter_or("info")).init();
    info!("Starting snmp-rates simulator");

    let settings = load_settings()?;
    info!(
        "Group {}, {:?} calculation, {} cycles of ~{} ms",
        settings.group_id, settings.calculation_mode, CYCLES, POLL_INTERVAL_MS
    );

    let mut processor = StreamsProcessor::<u32>::new(settings)?;
    let mut agent = MockAgent::new(processor.settings().group_id);
    let mut rate_data: BTreeMap<String, String> = BTreeMap::new();
    let mut restart_flag = false;
    let mut faulty_rates = 0usize;

    for cycle in 1..=CYCLES {
        if cycle == ACCURATE_FROM_CYCLE {
            processor.set_calculation_mode(&mut agent, CalculationMode::Accurate);
        }
        if cycle == NEW_STREAM_CYCLE {
            info!("Cycle {}: stream {} added to the table", cycle, LATE_STREAM.0);
            agent.add_stream(LATE_STREAM);
        }
        if cycle == RESTART_CYCLE {
            warn!("Cycle {}: SNMP agent restarted", cycle);
            agent.restart();
            restart_flag = true;
        }

        let interval_ms = jittered_interval(cycle);
        agent.advance(interval_ms);

        if cycle % TIMEOUT_EVERY == 0 {
            let stored = agent.stored_rows(&rate_data);
            let mut source = processor.delta_source(&mut agent);
            for update in processor.process_timeout(&mut source, &stored) {
                rate_data.insert(update.key, update.rate_data);
            }
            info!("Cycle {}: poll timed out, {} ms carried over", cycle, interval_ms);
            continue;
        }

        let rows = agent.rows(&rate_data);
        let mut source = processor.delta_source(&mut agent);
        let updates = processor.process(&mut source, &rows, restart_flag);
        restart_flag = false;

        for update in updates {
            let faulty = update.bit_rate < 0.0;
            if faulty {
                faulty_rates += 1;
            }
            if faulty || cycle % REPORT_EVERY == 0 {
                info!(
                    "Cycle {} stream {}: {:.0} bps (configured {:.0} bps)",
                    cycle,
                    update.key,
                    update.bit_rate,
                    agent.configured_rate(&update.key)
                );
            }
            rate_data.insert(update.key, update.rate_data);
        }
    }

    info!(
        "Simulation finished: {} cycles, {} faulty rates",
        CYCLES, faulty_rates
    );
    Ok(())
}
