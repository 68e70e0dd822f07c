//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Structured logging context for playback lifecycle events."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Structured logging helpers shared by the GridSafe playback crates.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Initialize a baseline tracing subscriber for tools and tests.
///
/// Daemons should prefer `gridsafe_common::logging::init_tracing`, which adds
/// file output and format selection.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer())
        .try_init();
}

/// Playback context attached to events emitted through the `gs_*` macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Actuator zone the session drives.
    pub zone: Option<&'a str>,
    /// Model identifier the sequence was scored with.
    pub model: Option<&'a str>,
    /// Dataset identifier or scenario path.
    pub dataset: Option<&'a str>,
    /// Replay cursor at the time of the event.
    pub cursor: Option<u64>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the actuator zone.
    pub fn with_zone(mut self, zone: &'a str) -> Self {
        self.zone = Some(zone);
        self
    }

    /// Attach the model identifier.
    pub fn with_model(mut self, model: &'a str) -> Self {
        self.model = Some(model);
        self
    }

    /// Attach the dataset identifier.
    pub fn with_dataset(mut self, dataset: &'a str) -> Self {
        self.dataset = Some(dataset);
        self
    }

    /// Attach the replay cursor.
    pub fn with_cursor(mut self, cursor: u64) -> Self {
        self.cursor = Some(cursor);
        self
    }
}

/// Outcome attached to playback lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEventOutcome {
    /// The operation completed.
    Success,
    /// The operation failed and the session was left unchanged.
    Fault,
}

impl PlaybackEventOutcome {
    /// Label recorded in the `outcome` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackEventOutcome::Success => "success",
            PlaybackEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a playback lifecycle event (`playback.load`, `playback.stop`, ...).
///
/// Successes are logged at `INFO`, faults at `WARN`.
pub fn log_playback_event(
    context: Option<&LogContext<'_>>,
    event: &str,
    message: &str,
    outcome: PlaybackEventOutcome,
) {
    let fallback = LogContext::default();
    let ctx = context.unwrap_or(&fallback);
    match outcome {
        PlaybackEventOutcome::Success => tracing::info!(
            event,
            outcome = outcome.as_str(),
            zone = ctx.zone.unwrap_or(""),
            model = ctx.model.unwrap_or(""),
            dataset = ctx.dataset.unwrap_or(""),
            cursor = ctx.cursor.unwrap_or_default(),
            message = %message
        ),
        PlaybackEventOutcome::Fault => tracing::warn!(
            event,
            outcome = outcome.as_str(),
            zone = ctx.zone.unwrap_or(""),
            model = ctx.model.unwrap_or(""),
            dataset = ctx.dataset.unwrap_or(""),
            cursor = ctx.cursor.unwrap_or_default(),
            message = %message
        ),
    }
}
