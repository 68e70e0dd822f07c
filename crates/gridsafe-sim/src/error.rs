//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "playback"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Error types raised by the playback engine."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PlaybackError {
    #[error("cannot load an empty record sequence")]
    EmptySequence,
    #[error("speed multiplier {0} is outside the supported range [1, 100]")]
    InvalidSpeed(f64),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record is missing the `{0}` field")]
    MissingField(String),
    #[error("field `{field}` does not hold an integer class code: {value}")]
    InvalidClassCode { field: String, value: String },
}
