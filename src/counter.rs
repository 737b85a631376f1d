//! Rate of a single standalone counter (e.g. a scalar `Counter32` OID).

use std::marker::PhantomData;

use log::debug;

use snmp_rates_core::{CounterValue, DeltaProvider, DeltaSource, RateConfig};

use crate::config::{ConfigError, ProcessorSettings};
use crate::state;

/// What the host read for the counter this cycle.
#[derive(Debug, Clone, Copy)]
pub struct CounterReading<'a> {
    /// Polled value as stored by the host
    pub raw: f64,
    /// Rate state stored last cycle
    pub rate_data: &'a str,
    /// Whether the host flagged an SNMP agent restart
    pub agent_restarted: bool,
}

/// Values to write back to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterUpdate {
    pub rate: f64,
    pub rate_data: String,
    /// The restart flag was consumed and must be reset by the host
    pub clear_restart_flag: bool,
}

pub struct CounterProcessor<C> {
    settings: ProcessorSettings,
    config: RateConfig,
    _counter: PhantomData<C>,
}

impl<C: CounterValue> CounterProcessor<C> {
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

    /// Delta source for this processor's group, to be created once per cycle
    pub fn delta_source<P: DeltaProvider>(&self, provider: P) -> DeltaSource<P> {
        DeltaSource::new(provider, self.settings.group_id, self.settings.calculation_mode)
    }

    /// Compute the rate for a freshly polled value.
    pub fn process<P: DeltaProvider>(
        &self,
        source: &mut DeltaSource<P>,
        reading: CounterReading<'_>,
    ) -> CounterUpdate {
        let mut facade =
            state::restore::<C>(reading.rate_data, self.config, reading.agent_restarted);
        let counter = C::from_f64_saturating(reading.raw);
        let rate = facade.calculate(source, counter, None, self.settings.faulty_return);

        debug!("Group {} counter {:?} rate {}", self.settings.group_id, counter, rate);

        CounterUpdate {
            rate,
            rate_data: state::persist(&facade),
            clear_restart_flag: reading.agent_restarted,
        }
    }

    /// The poll timed out: keep the elapsed time for the next calculation
    /// and return the updated rate state.
    pub fn process_timeout<P: DeltaProvider>(
        &self,
        source: &mut DeltaSource<P>,
        rate_data: &str,
    ) -> String {
        let mut facade = state::restore::<C>(rate_data, self.config, false);
        facade.buffer_delta(source, None);
        state::persist(&facade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedAgent;

    fn processor() -> CounterProcessor<u32> {
        CounterProcessor::new(ProcessorSettings::default()).unwrap()
    }

    fn poll(
        processor: &CounterProcessor<u32>,
        ms: i64,
        raw: f64,
        rate_data: &str,
    ) -> CounterUpdate {
        let mut source = processor.delta_source(ScriptedAgent::scalar(ms));
        processor.process(
            &mut source,
            CounterReading {
                raw,
                rate_data,
                agent_restarted: false,
            },
        )
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let settings = ProcessorSettings {
            max_delta_ms: 1_000,
            ..ProcessorSettings::default()
        };
        assert!(CounterProcessor::<u32>::new(settings).is_err());
    }

    #[test]
    fn test_rate_across_cycles() {
        let processor = processor();

        let first = poll(&processor, 10_000, 100.0, "");
        assert_eq!(first.rate, -1.0);
        assert!(!first.clear_restart_flag);

        let second = poll(&processor, 10_000, 600.0, &first.rate_data);
        assert_eq!(second.rate, 50.0);
    }

    #[test]
    fn test_counter_wrap_between_polls() {
        let processor = processor();

        let first = poll(&processor, 10_000, 4_294_967_285.0, "");
        let second = poll(&processor, 100_000, 9.0, &first.rate_data);
        assert_eq!(second.rate, 0.2);
    }

    #[test]
    fn test_timeouts_extend_next_window() {
        let processor = processor();
        let first = poll(&processor, 10_000, 5.0, "");

        let mut rate_data = first.rate_data;
        for _ in 0..4 {
            let mut source = processor.delta_source(ScriptedAgent::scalar(5_000));
            rate_data = processor.process_timeout(&mut source, &rate_data);
        }

        let next = poll(&processor, 100_000, 50.0, &rate_data);
        assert_eq!(next.rate, 45.0 / 120.0);
    }

    #[test]
    fn test_agent_restart_starts_over() {
        let processor = processor();
        let first = poll(&processor, 10_000, 1_000.0, "");

        let mut source = processor.delta_source(ScriptedAgent::scalar(10_000));
        let update = processor.process(
            &mut source,
            CounterReading {
                raw: 3.0,
                rate_data: &first.rate_data,
                agent_restarted: true,
            },
        );

        assert_eq!(update.rate, -1.0);
        assert!(update.clear_restart_flag);

        let next = poll(&processor, 10_000, 53.0, &update.rate_data);
        assert_eq!(next.rate, 5.0);
    }

    #[test]
    fn test_corrupt_state_is_replaced() {
        let processor = processor();
        let update = poll(&processor, 10_000, 10.0, "not json");
        assert_eq!(update.rate, -1.0);
        assert!(update.rate_data.contains("\"samples\""));
    }
}
