//! Rate state kept by the host between poll cycles.
//!
//! The host stores one opaque blob per counter. A cycle never fails because
//! of that blob: anything unreadable is replaced by fresh state.

use log::{error, warn};

use snmp_rates_core::{CounterValue, RateConfig, RateFacade};

/// Load the rate helper for one counter.
///
/// After an agent restart the old history belongs to counters that no longer
/// exist, so it is discarded along with blank or corrupt blobs.
pub fn restore<C: CounterValue>(
    blob: &str,
    config: RateConfig,
    agent_restarted: bool,
) -> RateFacade<C> {
    if agent_restarted {
        return RateFacade::new(config);
    }

    match RateFacade::from_json(blob, config) {
        Ok(facade) => facade,
        Err(e) => {
            warn!("Discarding stored rate state: {}", e);
            RateFacade::new(config)
        }
    }
}

/// Serialize the rate helper for storage. Falls back to an empty blob, which
/// restores as fresh state next cycle.
pub fn persist<C: CounterValue>(facade: &RateFacade<C>) -> String {
    facade.to_json().unwrap_or_else(|e| {
        error!("Failed to store rate state: {}", e);
        String::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use snmp_rates_core::{CalculationMode, DeltaProvider, DeltaReport, DeltaSource, SnmpRate32};

    struct Scalar(i64);

    impl DeltaProvider for Scalar {
        fn fetch_deltas(&mut self, _group_id: u32, _mode: CalculationMode) -> DeltaReport {
            DeltaReport::Scalar(self.0)
        }

        fn set_row_tracking(&mut self, _group_id: u32, _enabled: bool) {}
    }

    fn used_state() -> String {
        let mut facade = SnmpRate32::new(RateConfig::default());
        let mut source = DeltaSource::new(Scalar(10_000), 1, CalculationMode::Fast);
        facade.calculate(&mut source, 10, None, -1.0);
        persist(&facade)
    }

    #[test]
    fn test_restore_existing_state() {
        let blob = used_state();
        let facade: SnmpRate32 = restore(&blob, RateConfig::default(), false);
        assert_eq!(facade.engine().samples().len(), 1);
        assert_eq!(persist(&facade), blob);
    }

    #[test]
    fn test_agent_restart_discards_state() {
        let facade: SnmpRate32 = restore(&used_state(), RateConfig::default(), true);
        assert!(facade.engine().samples().is_empty());
    }

    #[test]
    fn test_blank_and_corrupt_blobs_are_fresh() {
        let config =
            RateConfig::new(TimeDelta::seconds(1), TimeDelta::seconds(30), Default::default())
                .unwrap();

        let blank: SnmpRate32 = restore("", config, false);
        assert_eq!(blank, SnmpRate32::new(config));

        let corrupt: SnmpRate32 = restore("{\"samples\": 12", config, false);
        assert_eq!(corrupt, SnmpRate32::new(config));
    }
}
