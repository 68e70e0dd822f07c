//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "playback"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Outcome classification of predictions against ground truth."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Classification of a single prediction against its ground-truth label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// No attack present and none flagged.
    Safe,
    /// Attack present and flagged.
    Caught,
    /// Attack present but predicted safe.
    Missed,
    /// No attack present but flagged.
    FalsePositive,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::Safe,
        Outcome::Caught,
        Outcome::Missed,
        Outcome::FalsePositive,
    ];

    /// Static label for metrics and status payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Safe => "safe",
            Outcome::Caught => "caught",
            Outcome::Missed => "missed",
            Outcome::FalsePositive => "false_positive",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the outcome of a record. Only `predicted` and `actual` are consulted.
pub fn classify(record: &Record) -> Outcome {
    match (record.is_attack(), record.is_attack_predicted()) {
        (true, true) => Outcome::Caught,
        (true, false) => Outcome::Missed,
        (false, true) => Outcome::FalsePositive,
        (false, false) => Outcome::Safe,
    }
}
