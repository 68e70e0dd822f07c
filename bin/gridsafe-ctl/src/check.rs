//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Configuration validation command."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use gridsafe_common::config::AppConfig;

/// Options for `check-config`.
#[derive(Debug, Args)]
pub struct CheckOptions {
    /// Configuration file to validate; `GRIDSAFE_CONFIG` and the default location apply otherwise.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Load and validate the configuration, printing the effective settings.
pub fn run(options: CheckOptions) -> Result<()> {
    let mut candidates = Vec::new();
    if let Some(path) = &options.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/gridsafe.toml"));
    let loaded = AppConfig::load_with_source(&candidates)?;
    println!("{}", summary(&loaded.config, &loaded.source));
    Ok(())
}

fn summary(config: &AppConfig, source: &std::path::Path) -> String {
    format!(
        "Config: {}\nZone: {}\nSpeed: {}x\nActuator: {} (timeout {}s)\nLoader: {} (label `{}`)\nControl API: {}",
        source.display(),
        config.playback.zone,
        config.playback.speed,
        config.actuator.endpoint,
        config.actuator.request_timeout.as_secs(),
        config.loader.endpoint,
        config.loader.label_column,
        if config.api.enabled {
            config.api.listen.to_string()
        } else {
            "disabled".to_owned()
        }
    )
}
