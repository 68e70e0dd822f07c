//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "01-bootstrap"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Playback engine module exports and shared types."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Simulation playback for scored intrusion-detection telemetry.
//!
//! A [`PlaybackScheduler`] replays a [`RecordSequence`] with the original
//! inter-event pacing, classifies each record into an [`Outcome`], keeps
//! [`PlaybackStats`] and a bounded [`LogFeed`], and drives the status-light
//! grid through an [`ActuationDispatcher`].

pub mod actuator;
pub mod classify;
pub mod error;
pub mod feed;
pub mod loader;
pub mod metrics;
pub mod record;
pub mod replay;
pub mod scheduler;
pub mod stats;

pub use actuator::{
    outcome_color, ActuationDispatcher, ActuatorClient, ActuatorError, NullActuator, Rgb, Zone,
};
pub use classify::{classify, Outcome};
pub use error::{PlaybackError, RecordError};
pub use feed::{LogCategory, LogEntry, LogFeed, LOG_FEED_CAPACITY};
pub use loader::{LoadError, LoadRequest, SequenceLoader, DEFAULT_LABEL_COLUMN};
pub use metrics::PlaybackMetrics;
pub use record::{Record, RecordSequence};
pub use replay::{load_scenario, FileSequenceLoader};
pub use scheduler::{
    playback_delay, raw_delay_ms, PlaybackScheduler, PlaybackSnapshot, PlaybackState,
    SpeedMultiplier,
};
pub use stats::PlaybackStats;
