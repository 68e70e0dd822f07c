//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the playback daemon."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use gridsafe_common::config::AppConfig;
use gridsafe_common::logging::init_tracing;
use gridsafe_common::metrics::{new_registry, SharedRegistry};
use gridsafe_net::{ControlApiBuilder, HttpActuatorClient, HttpSequenceLoader};
use gridsafe_sim::{
    load_scenario, ActuationDispatcher, FileSequenceLoader, PlaybackMetrics, PlaybackScheduler,
    RecordSequence, SequenceLoader,
};
use tokio::signal;
use tracing::{info, warn};

const SERVICE_NAME: &str = "gridsafe-playd";
const SHUTDOWN_DRAIN: Duration = Duration::from_millis(250);

#[derive(Debug, Parser)]
#[command(author, version, about = "GridSafe simulation playback daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "ADDR", help = "Override the control API listen address")]
    listen: Option<SocketAddr>,

    #[arg(long, value_name = "FILE", help = "Scenario file loaded at startup")]
    scenario: Option<PathBuf>,

    #[arg(long, help = "Start playing the preloaded scenario immediately")]
    autoplay: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/gridsafe.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(listen) = cli.listen {
        config.api.listen = listen;
    }
    if let Some(scenario) = cli.scenario {
        config.playback.scenario_file = Some(scenario);
    }
    init_tracing(SERVICE_NAME, &config.logging)?;
    info!(config_path = %loaded.source.display(), "configuration loaded");

    run_daemon(config, cli.autoplay).await
}

async fn run_daemon(config: AppConfig, autoplay: bool) -> Result<()> {
    let registry: Option<SharedRegistry> = config.metrics.enabled.then(new_registry);
    let metrics = registry
        .clone()
        .map(PlaybackMetrics::new)
        .transpose()
        .context("failed to register playback metrics")?;

    let actuator = HttpActuatorClient::from_config(&config.actuator)?;
    info!(endpoint = %actuator.endpoint(), "actuator client ready");
    let dispatcher = ActuationDispatcher::new(Arc::new(actuator)).with_metrics(metrics.clone());
    let scheduler = PlaybackScheduler::from_config(&config.playback, dispatcher, metrics)?;

    let loader: Arc<dyn SequenceLoader> = match &config.loader.scenario_root {
        Some(root) => {
            info!(root = %root.display(), "serving loads from scenario files");
            Arc::new(FileSequenceLoader::new(root.clone()))
        }
        None => Arc::new(HttpSequenceLoader::from_config(&config.loader)?),
    };

    if let Some(path) = &config.playback.scenario_file {
        match preload_scenario(path, &config.loader.label_column).await {
            Ok(sequence) => {
                info!(scenario = %path.display(), records = sequence.len(), "scenario preloaded");
                scheduler.load(sequence)?;
                if autoplay {
                    scheduler.play();
                }
            }
            Err(err) => warn!(scenario = %path.display(), error = %err, "scenario preload failed"),
        }
    }

    let api = if config.api.enabled {
        let mut builder = ControlApiBuilder::new(config.api.listen, scheduler.clone(), loader)
            .with_default_label_column(config.loader.label_column.clone());
        if let Some(registry) = &registry {
            builder = builder.with_metrics_registry(registry.clone());
        }
        Some(builder.spawn().await?)
    } else {
        info!("control api disabled by configuration");
        None
    };

    info!(zone = %scheduler.zone(), speed = %scheduler.speed(), "daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    shutdown_playback(&scheduler).await;

    if let Some(api) = api {
        api.shutdown().await?;
    }
    Ok(())
}

/// Read the startup scenario off the async worker threads.
async fn preload_scenario(path: &Path, label_column: &str) -> Result<RecordSequence> {
    let path = path.to_path_buf();
    let label_column = label_column.to_owned();
    let sequence = tokio::task::spawn_blocking(move || load_scenario(&path, &label_column))
        .await
        .context("scenario preload task failed")??;
    Ok(sequence)
}

/// Stop playback and give the final power-off time to leave before the runtime exits.
async fn shutdown_playback(scheduler: &PlaybackScheduler) {
    scheduler.stop();
    tokio::time::sleep(SHUTDOWN_DRAIN).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gridsafe_sim::{ActuatorClient, ActuatorError, Rgb, Zone};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingActuator {
        offs: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ActuatorClient for RecordingActuator {
        async fn set_color(&self, _zone: &Zone, _color: Rgb) -> Result<(), ActuatorError> {
            Ok(())
        }

        async fn power_off(&self, zone: &Zone) -> Result<(), ActuatorError> {
            self.offs.lock().unwrap().push(zone.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn preload_reads_scenario_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scenario.csv");
        std::fs::write(
            &path,
            "timestamp,voltage,current,predicted,label\n2024-01-01 00:00:00,230.0,4.0,0,0\n",
        )
        .unwrap();
        let sequence = preload_scenario(&path, "label").await.unwrap();
        assert_eq!(sequence.len(), 1);
        assert!(preload_scenario(&dir.path().join("missing.json"), "label")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn shutdown_delivers_final_power_off() {
        let actuator = Arc::new(RecordingActuator::default());
        let scheduler =
            PlaybackScheduler::new(ActuationDispatcher::new(actuator.clone()), None);
        scheduler.set_zone(Zone::new("suburbs"));
        shutdown_playback(&scheduler).await;
        assert_eq!(*actuator.offs.lock().unwrap(), vec!["suburbs".to_string()]);
    }
}
