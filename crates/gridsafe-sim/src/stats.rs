//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "playback"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Running counters derived from the replayed outcome stream."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use crate::classify::Outcome;
use crate::record::Record;

/// Counters accumulated over one playback run.
///
/// `safe_count` buckets every record *predicted* safe, so missed attacks are
/// counted there as well and `safe_count + flagged_count == total_processed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackStats {
    pub safe_count: u64,
    pub flagged_count: u64,
    pub correct_count: u64,
    pub missed_count: u64,
    pub total_processed: u64,
}

impl PlaybackStats {
    pub fn update(&mut self, record: &Record, outcome: Outcome) {
        self.total_processed += 1;
        if record.is_correct() {
            self.correct_count += 1;
        }
        if outcome == Outcome::Missed {
            self.missed_count += 1;
        }
        if record.is_attack_predicted() {
            self.flagged_count += 1;
        } else {
            self.safe_count += 1;
        }
    }

    /// Percentage of exact predictions; `100.0` before anything was processed.
    pub fn accuracy(&self) -> f64 {
        if self.total_processed == 0 {
            return 100.0;
        }
        self.correct_count as f64 / self.total_processed as f64 * 100.0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
