//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "playback"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Prometheus instrumentation for playback runs."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fmt;

use anyhow::Result;
use gridsafe_common::metrics::SharedRegistry;
use prometheus::{IntCounterVec, Opts};

use crate::classify::Outcome;

/// Metrics published by the playback engine.
#[derive(Clone)]
pub struct PlaybackMetrics {
    registry: SharedRegistry,
    records_total: IntCounterVec,
    actuator_commands_total: IntCounterVec,
    loads_total: IntCounterVec,
}

impl PlaybackMetrics {
    /// Register the playback metric family against the provided registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let records_total = IntCounterVec::new(
            Opts::new(
                "gridsafe_playback_records_total",
                "Records classified during playback, by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(records_total.clone()))?;

        let actuator_commands_total = IntCounterVec::new(
            Opts::new(
                "gridsafe_playback_actuator_commands_total",
                "Actuator commands dispatched, by command and result",
            ),
            &["command", "result"],
        )?;
        registry.register(Box::new(actuator_commands_total.clone()))?;

        let loads_total = IntCounterVec::new(
            Opts::new(
                "gridsafe_playback_loads_total",
                "Record sequence load attempts, by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(loads_total.clone()))?;

        Ok(Self {
            registry,
            records_total,
            actuator_commands_total,
            loads_total,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_outcome(&self, outcome: Outcome) {
        self.records_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn record_actuator_command(&self, command: &str, delivered: bool) {
        self.actuator_commands_total
            .with_label_values(&[command, result_label(delivered)])
            .inc();
    }

    pub fn record_load(&self, succeeded: bool) {
        self.loads_total
            .with_label_values(&[result_label(succeeded)])
            .inc();
    }

    /// Current count for an outcome; mostly useful in tests.
    pub fn outcome_count(&self, outcome: Outcome) -> u64 {
        self.records_total
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    pub fn actuator_command_count(&self, command: &str, delivered: bool) -> u64 {
        self.actuator_commands_total
            .with_label_values(&[command, result_label(delivered)])
            .get()
    }
}

impl fmt::Debug for PlaybackMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackMetrics").finish_non_exhaustive()
    }
}

fn result_label(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "failed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsafe_common::metrics::new_registry;

    #[test]
    fn registers_playback_families() {
        let registry = new_registry();
        let metrics = PlaybackMetrics::new(registry.clone()).unwrap();
        metrics.record_outcome(Outcome::Missed);
        metrics.record_actuator_command("set_color", false);
        metrics.record_load(true);
        assert_eq!(metrics.outcome_count(Outcome::Missed), 1);
        assert_eq!(metrics.actuator_command_count("set_color", false), 1);

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"gridsafe_playback_records_total".to_string()));
        assert!(names.contains(&"gridsafe_playback_actuator_commands_total".to_string()));
        assert!(names.contains(&"gridsafe_playback_loads_total".to_string()));
    }

    #[test]
    fn double_registration_fails() {
        let registry = new_registry();
        PlaybackMetrics::new(registry.clone()).unwrap();
        assert!(PlaybackMetrics::new(registry).is_err());
    }
}
