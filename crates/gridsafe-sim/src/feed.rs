//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "playback"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Bounded most-recent-first live log of classified records."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::fmt;

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::classify::Outcome;
use crate::record::Record;

/// Maximum number of entries retained by the [`LogFeed`].
pub const LOG_FEED_CAPACITY: usize = 50;

/// Operator-facing label attached to a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogCategory {
    #[serde(rename = "OK")]
    Ok,
    /// False data injection (attack class 1).
    #[serde(rename = "FDI")]
    Fdi,
    /// Denial of service (any other attack class).
    #[serde(rename = "DoS")]
    Dos,
    #[serde(rename = "MISSED")]
    Missed,
}

impl LogCategory {
    pub fn from_outcome(record: &Record, outcome: Outcome) -> Self {
        match outcome {
            Outcome::Missed => LogCategory::Missed,
            _ if record.predicted == 1 => LogCategory::Fdi,
            _ if record.is_attack_predicted() => LogCategory::Dos,
            _ => LogCategory::Ok,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Ok => "OK",
            LogCategory::Fdi => "FDI",
            LogCategory::Dos => "DoS",
            LogCategory::Missed => "MISSED",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable view of one classified record as shown in the live feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    /// Position of the source record within the loaded sequence.
    pub record_index: usize,
    pub display_time: String,
    pub category: LogCategory,
    pub outcome: Outcome,
    pub predicted: i64,
    pub actual: i64,
    pub is_correct: bool,
    pub is_missed: bool,
    pub telemetry_summary: String,
}

impl LogEntry {
    pub fn from_record(id: u64, record_index: usize, record: &Record, outcome: Outcome) -> Self {
        let display_time = match record.timestamp {
            Some(timestamp) => timestamp.format("%H:%M:%S").to_string(),
            None => Local::now().format("%H:%M:%S").to_string(),
        };
        Self {
            id,
            record_index,
            display_time,
            category: LogCategory::from_outcome(record, outcome),
            outcome,
            predicted: record.predicted,
            actual: record.actual,
            is_correct: record.is_correct(),
            is_missed: outcome == Outcome::Missed,
            telemetry_summary: format!("V:{:.1} C:{:.1}", record.voltage(), record.current()),
        }
    }
}

/// Newest-first log holding at most [`LOG_FEED_CAPACITY`] entries.
#[derive(Debug, Clone, Default)]
pub struct LogFeed {
    entries: VecDeque<LogEntry>,
}

impl LogFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend an entry, silently dropping the oldest beyond capacity.
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(LOG_FEED_CAPACITY);
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use chrono::{TimeZone, Utc};

    fn entry(id: u64) -> LogEntry {
        let record = Record::new(None, 0, 0);
        LogEntry::from_record(id, id as usize, &record, classify(&record))
    }

    #[test]
    fn keeps_last_fifty_newest_first() {
        let mut feed = LogFeed::new();
        for id in 0..60 {
            feed.push(entry(id));
        }
        assert_eq!(feed.len(), LOG_FEED_CAPACITY);
        let ids: Vec<u64> = feed.entries().map(|entry| entry.id).collect();
        let expected: Vec<u64> = (10..60).rev().collect();
        assert_eq!(ids, expected);
        assert_eq!(feed.latest().map(|entry| entry.id), Some(59));
    }

    #[test]
    fn categories_follow_dashboard_labels() {
        let cases = [
            ((0, 0), LogCategory::Ok),
            ((1, 1), LogCategory::Fdi),
            ((1, 0), LogCategory::Fdi),
            ((2, 2), LogCategory::Dos),
            ((0, 1), LogCategory::Missed),
        ];
        for ((predicted, actual), expected) in cases {
            let record = Record::new(None, predicted, actual);
            assert_eq!(
                LogCategory::from_outcome(&record, classify(&record)),
                expected
            );
        }
    }

    #[test]
    fn entry_formats_time_and_telemetry() {
        let record = Record::new(Some(Utc.with_ymd_and_hms(2024, 5, 1, 17, 4, 9).unwrap()), 0, 3)
            .with_telemetry("voltage", 229.96)
            .with_telemetry("current", 4.04);
        let entry = LogEntry::from_record(7, 3, &record, classify(&record));
        assert_eq!(entry.display_time, "17:04:09");
        assert_eq!(entry.telemetry_summary, "V:230.0 C:4.0");
        assert!(entry.is_missed);
        assert!(!entry.is_correct);
        assert_eq!(entry.category, LogCategory::Missed);
    }

    #[test]
    fn missing_telemetry_is_summarised_as_zero() {
        let record = Record::new(None, 0, 0);
        let entry = LogEntry::from_record(1, 0, &record, classify(&record));
        assert_eq!(entry.telemetry_summary, "V:0.0 C:0.0");
    }
}
