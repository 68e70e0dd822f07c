//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "playback"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Scored telemetry records and the immutable replay sequence."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::RecordError;

/// Column carrying the model prediction.
pub const PREDICTED_FIELD: &str = "predicted";
/// Column carrying the ground-truth class.
pub const ACTUAL_FIELD: &str = "actual";
/// Column carrying the sample timestamp.
pub const TIMESTAMP_FIELD: &str = "timestamp";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// One scored telemetry sample replayed by the playback scheduler.
///
/// Class codes use `0` for "no attack"; any other value names an attack class.
/// Telemetry columns are kept verbatim and only consulted for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "class_code")]
    pub predicted: i64,
    #[serde(deserialize_with = "class_code")]
    pub actual: i64,
    #[serde(flatten)]
    pub telemetry: IndexMap<String, Value>,
}

impl Record {
    pub fn new(timestamp: Option<DateTime<Utc>>, predicted: i64, actual: i64) -> Self {
        Self {
            timestamp,
            predicted,
            actual,
            telemetry: IndexMap::new(),
        }
    }

    /// Attach a numeric telemetry column.
    pub fn with_telemetry(mut self, field: impl Into<String>, value: f64) -> Self {
        self.telemetry.insert(field.into(), Value::from(value));
        self
    }

    /// Build a record from a loosely typed row as produced by CSV or JSON scenario files.
    ///
    /// `actual` falls back to `label_column` when the row carries no explicit ground truth.
    pub fn from_fields(
        mut fields: IndexMap<String, Value>,
        label_column: &str,
    ) -> Result<Self, RecordError> {
        let timestamp = fields
            .shift_remove(TIMESTAMP_FIELD)
            .and_then(|value| timestamp_from_value(&value));
        let predicted = fields
            .shift_remove(PREDICTED_FIELD)
            .ok_or_else(|| RecordError::MissingField(PREDICTED_FIELD.to_owned()))
            .and_then(|value| class_code_from_value(PREDICTED_FIELD, &value))?;
        let actual = match fields.shift_remove(ACTUAL_FIELD) {
            Some(value) => class_code_from_value(ACTUAL_FIELD, &value)?,
            None => {
                let value = fields
                    .get(label_column)
                    .ok_or_else(|| RecordError::MissingField(ACTUAL_FIELD.to_owned()))?;
                class_code_from_value(label_column, value)?
            }
        };
        Ok(Self {
            timestamp,
            predicted,
            actual,
            telemetry: fields,
        })
    }

    /// Numeric value of a telemetry column, if present and numeric.
    pub fn telemetry_value(&self, field: &str) -> Option<f64> {
        match self.telemetry.get(field)? {
            Value::Number(number) => number.as_f64(),
            Value::String(raw) => raw.trim().parse().ok(),
            _ => None,
        }
    }

    /// Voltage reading, `0.0` when the column is missing.
    pub fn voltage(&self) -> f64 {
        self.telemetry_value("voltage").unwrap_or_default()
    }

    /// Current reading, `0.0` when the column is missing.
    pub fn current(&self) -> f64 {
        self.telemetry_value("current").unwrap_or_default()
    }

    pub fn is_attack_predicted(&self) -> bool {
        self.predicted != 0
    }

    pub fn is_attack(&self) -> bool {
        self.actual != 0
    }

    pub fn is_correct(&self) -> bool {
        self.predicted == self.actual
    }
}

/// Immutable, cheaply cloneable ordered list of records.
///
/// Ordering is taken as delivered; the sequence is never re-sorted.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSequence {
    records: Arc<[Record]>,
}

impl RecordSequence {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: records.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }
}

impl From<Vec<Record>> for RecordSequence {
    fn from(records: Vec<Record>) -> Self {
        Self::new(records)
    }
}

impl Deref for RecordSequence {
    type Target = [Record];

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

/// Parse the timestamp formats emitted by the scoring back-end.
///
/// Naive timestamps are interpreted as UTC. Placeholders such as `NaT` or `nan`
/// yield `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty()
        || ["nan", "nat", "none", "null"]
            .iter()
            .any(|placeholder| raw.eq_ignore_ascii_case(placeholder))
    {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => parse_timestamp(raw),
        // Bare numbers are epoch milliseconds.
        Value::Number(number) => number
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

fn class_code_from_value(field: &str, value: &Value) -> Result<i64, RecordError> {
    let code = match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite() && float.fract() == 0.0)
                .map(|float| float as i64)
        }),
        Value::String(raw) => {
            let raw = raw.trim();
            raw.parse::<i64>().ok().or_else(|| {
                raw.parse::<f64>()
                    .ok()
                    .filter(|float| float.is_finite() && float.fract() == 0.0)
                    .map(|float| float as i64)
            })
        }
        Value::Bool(flag) => Some(i64::from(*flag)),
        _ => None,
    };
    code.ok_or_else(|| RecordError::InvalidClassCode {
        field: field.to_owned(),
        value: value.to_string(),
    })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(timestamp_from_value))
}

fn class_code<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    class_code_from_value("class code", &value).map_err(D::Error::custom)
}
