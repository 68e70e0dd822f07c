//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "playback"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Best-effort actuation of the status-light grid."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Actuation seam between the playback engine and the status-light service.
//!
//! [`ActuatorClient`] implementations report failures, but the
//! [`ActuationDispatcher`] that the scheduler talks to only exposes methods
//! returning `()`: every command is launched on the runtime and its result is
//! discarded after being counted. A slow or unreachable actuator can therefore
//! never hold up a playback tick.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::Handle;

use crate::classify::Outcome;
use crate::metrics::PlaybackMetrics;

const ACTUATOR_TARGET: &str = "gridsafe::playback::actuator";

/// Target area for actuator commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Zone {
    /// Reserved zone addressing the whole grid.
    All,
    Named(String),
}

impl Zone {
    /// Wire value of [`Zone::All`].
    pub const ALL: &'static str = "all";

    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.eq_ignore_ascii_case(Self::ALL) {
            Zone::All
        } else {
            Zone::Named(trimmed.to_owned())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Zone::All => Self::ALL,
            Zone::Named(name) => name,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Zone {
    fn from(value: String) -> Self {
        Zone::new(value)
    }
}

impl From<&str> for Zone {
    fn from(value: &str) -> Self {
        Zone::new(value)
    }
}

impl From<Zone> for String {
    fn from(zone: Zone) -> Self {
        zone.as_str().to_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Light color shown for an outcome.
pub fn outcome_color(outcome: Outcome) -> Rgb {
    match outcome {
        Outcome::Missed => Rgb::new(255, 0, 0),
        Outcome::Caught => Rgb::new(255, 50, 0),
        Outcome::FalsePositive => Rgb::new(255, 200, 0),
        Outcome::Safe => Rgb::new(0, 255, 0),
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActuatorError {
    #[error("actuator unreachable: {0}")]
    Transport(String),
    #[error("actuator rejected command with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Transport to the status-light service.
#[async_trait]
pub trait ActuatorClient: Send + Sync + 'static {
    async fn set_color(&self, zone: &Zone, color: Rgb) -> Result<(), ActuatorError>;

    async fn power_off(&self, zone: &Zone) -> Result<(), ActuatorError>;
}

/// Client that accepts and drops every command.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullActuator;

#[async_trait]
impl ActuatorClient for NullActuator {
    async fn set_color(&self, _zone: &Zone, _color: Rgb) -> Result<(), ActuatorError> {
        Ok(())
    }

    async fn power_off(&self, _zone: &Zone) -> Result<(), ActuatorError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    SetColor(Rgb),
    PowerOff,
}

impl Command {
    fn as_str(&self) -> &'static str {
        match self {
            Command::SetColor(_) => "set_color",
            Command::PowerOff => "power_off",
        }
    }
}

/// Fire-and-forget front for an [`ActuatorClient`].
#[derive(Clone)]
pub struct ActuationDispatcher {
    client: Arc<dyn ActuatorClient>,
    metrics: Option<PlaybackMetrics>,
}

impl ActuationDispatcher {
    pub fn new(client: Arc<dyn ActuatorClient>) -> Self {
        Self {
            client,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<PlaybackMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn set_color(&self, zone: &Zone, color: Rgb) {
        self.launch(zone, Command::SetColor(color));
    }

    pub fn power_off(&self, zone: &Zone) {
        self.launch(zone, Command::PowerOff);
    }

    fn launch(&self, zone: &Zone, command: Command) {
        let Ok(runtime) = Handle::try_current() else {
            tracing::debug!(
                target: ACTUATOR_TARGET,
                command = command.as_str(),
                zone = %zone,
                "no runtime available; actuator command dropped"
            );
            return;
        };
        let client = self.client.clone();
        let metrics = self.metrics.clone();
        let zone = zone.clone();
        runtime.spawn(async move {
            let result = match command {
                Command::SetColor(color) => client.set_color(&zone, color).await,
                Command::PowerOff => client.power_off(&zone).await,
            };
            if let Some(metrics) = &metrics {
                metrics.record_actuator_command(command.as_str(), result.is_ok());
            }
            if let Err(err) = result {
                tracing::debug!(
                    target: ACTUATOR_TARGET,
                    command = command.as_str(),
                    zone = %zone,
                    error = %err,
                    "actuator command dropped"
                );
            }
        });
    }
}

impl fmt::Debug for ActuationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActuationDispatcher")
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}
