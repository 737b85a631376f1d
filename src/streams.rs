//! Bit rates of a polled stream table.
//!
//! Each row carries its own octet counter and its own rate state. Rows are
//! processed independently: one row with unreadable state never affects the
//! others.

use std::marker::PhantomData;

use log::{debug, info};

use snmp_rates_core::{
    CalculationMode, CounterValue, DeltaProvider, DeltaSource, RateConfig, octets_to_bits,
};

use crate::config::{ConfigError, ProcessorSettings};
use crate::state;

/// One table row as polled this cycle
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRow {
    /// Primary key of the row
    pub key: String,
    /// Octet counter as stored by the host
    pub octets: f64,
    /// Rate state stored last cycle
    pub rate_data: String,
}

/// Stored state of a row whose poll timed out
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub key: String,
    pub rate_data: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamUpdate {
    pub key: String,
    pub bit_rate: f64,
    pub rate_data: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutUpdate {
    pub key: String,
    pub rate_data: String,
}

pub struct StreamsProcessor<C> {
    settings: ProcessorSettings,
    config: RateConfig,
    _counter: PhantomData<C>,
}

impl<C: CounterValue> StreamsProcessor<C> {
    pub fn new(settings: ProcessorSettings) -> Result<Self, ConfigError> {
        let config = settings.rate_config()?;
        Ok(Self {
            settings,
            config,
            _counter: PhantomData,
        })
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    /// Delta source for the stream group, to be created once per cycle
    pub fn delta_source<P: DeltaProvider>(&self, provider: P) -> DeltaSource<P> {
        DeltaSource::new(provider, self.settings.group_id, self.settings.calculation_mode)
    }

    /// Switch between group-level and per-row delta tracking.
    pub fn set_calculation_mode<P: DeltaProvider>(&mut self, provider: P, mode: CalculationMode) {
        if mode == self.settings.calculation_mode {
            return;
        }

        info!(
            "Stream rates switching from {:?} to {:?} calculation",
            self.settings.calculation_mode, mode
        );
        self.delta_source(provider).set_tracking_mode(mode);
        self.settings.calculation_mode = mode;
    }

    /// Compute the bit rate of every row.
    ///
    /// With `agent_restarted` set, all stored state is ignored; the caller
    /// must reset its restart flag afterwards.
    pub fn process<P: DeltaProvider>(
        &self,
        source: &mut DeltaSource<P>,
        rows: &[StreamRow],
        agent_restarted: bool,
    ) -> Vec<StreamUpdate> {
        if agent_restarted {
            info!("SNMP agent restarted, resetting {} stream rates", rows.len());
        }

        rows.iter()
            .map(|row| {
                let mut facade = state::restore::<C>(&row.rate_data, self.config, agent_restarted);
                let octets = C::from_f64_saturating(row.octets);
                let octet_rate =
                    facade.calculate(source, octets, Some(&row.key), self.settings.faulty_return);
                let bit_rate = octets_to_bits(octet_rate);

                debug!("Stream {} bit rate {}", row.key, bit_rate);

                StreamUpdate {
                    key: row.key.clone(),
                    bit_rate,
                    rate_data: state::persist(&facade),
                }
            })
            .collect()
    }

    /// The table poll timed out: carry each row's delta over.
    pub fn process_timeout<P: DeltaProvider>(
        &self,
        source: &mut DeltaSource<P>,
        rows: &[StoredRow],
    ) -> Vec<TimeoutUpdate> {
        rows.iter()
            .map(|row| {
                let mut facade = state::restore::<C>(&row.rate_data, self.config, false);
                facade.buffer_delta(source, Some(&row.key));

                TimeoutUpdate {
                    key: row.key.clone(),
                    rate_data: state::persist(&facade),
                }
            })
            .collect()
    }
}
