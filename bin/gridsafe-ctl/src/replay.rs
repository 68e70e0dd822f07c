//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Headless replay of scored scenario files."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use gridsafe_net::HttpActuatorClient;
use gridsafe_sim::{
    load_scenario, ActuationDispatcher, ActuatorClient, NullActuator, PlaybackScheduler,
    PlaybackSnapshot, PlaybackState, Zone, DEFAULT_LABEL_COLUMN,
};
use tokio::runtime::Runtime;

/// Options for `replay`.
#[derive(Debug, Args)]
pub struct ReplayOptions {
    /// Scored scenario file (`.json` or `.csv`).
    #[arg(long, value_name = "FILE")]
    pub scenario: PathBuf,
    /// Ground-truth column used when rows carry no `actual` field.
    #[arg(long, default_value = DEFAULT_LABEL_COLUMN)]
    pub label_column: String,
    /// Speed multiplier in `[1, 100]`.
    #[arg(long, default_value_t = 1.0)]
    pub speed: f64,
    /// Actuator zone to drive.
    #[arg(long, default_value = "all", value_parser = parse_zone)]
    pub zone: Zone,
    /// Status-light service base URL; commands are discarded when omitted.
    #[arg(long, value_name = "URL")]
    pub actuator: Option<String>,
    /// Actuator request timeout in seconds.
    #[arg(long, default_value_t = 2)]
    pub actuator_timeout: u64,
    /// Print the full log feed as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
}

/// Replay the scenario to completion, or until ctrl-c.
pub fn run(options: ReplayOptions) -> Result<()> {
    let sequence = load_scenario(&options.scenario, &options.label_column)
        .with_context(|| format!("unable to load scenario {}", options.scenario.display()))?;

    let client: Arc<dyn ActuatorClient> = match &options.actuator {
        Some(endpoint) => Arc::new(HttpActuatorClient::new(
            endpoint,
            Duration::from_secs(options.actuator_timeout),
        )?),
        None => Arc::new(NullActuator),
    };

    let runtime = Runtime::new()?;
    let snapshot = runtime.block_on(async {
        let scheduler = PlaybackScheduler::new(ActuationDispatcher::new(client), None);
        scheduler.set_zone(options.zone.clone());
        scheduler.set_speed(options.speed)?;
        scheduler.load(sequence)?;

        let mut states = scheduler.subscribe();
        scheduler.play();
        tokio::select! {
            finished = states.wait_for(|state| *state == PlaybackState::Stopped) => {
                finished.context("playback scheduler dropped")?;
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted; stopping playback");
            }
        }
        let snapshot = scheduler.snapshot();
        scheduler.stop();
        // Give the final actuator commands a moment to leave.
        tokio::time::sleep(Duration::from_millis(100)).await;
        anyhow::Ok(snapshot)
    })?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("{}", render_summary(&snapshot));
    }
    Ok(())
}

fn parse_zone(raw: &str) -> Result<Zone, String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("zone must not be empty".to_owned());
    }
    Ok(Zone::new(name))
}

fn render_summary(snapshot: &PlaybackSnapshot) -> String {
    let stats = &snapshot.stats;
    let mut lines = vec![
        format!(
            "Processed: {}/{}",
            stats.total_processed, snapshot.length
        ),
        format!("Safe: {}", stats.safe_count),
        format!("Flagged: {}", stats.flagged_count),
        format!("Missed: {}", stats.missed_count),
        format!("Accuracy: {:.1}%", snapshot.accuracy),
    ];
    for entry in snapshot.log.iter().take(10) {
        lines.push(format!(
            "  {} [{}] #{} pred={} actual={} {}",
            entry.display_time,
            entry.category,
            entry.record_index,
            entry.predicted,
            entry.actual,
            entry.telemetry_summary
        ));
    }
    lines.join("\n")
}
