//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "playback"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Scenario file readers producing record sequences."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::borrow::Cow;
use std::fs;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use csv::ReaderBuilder;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::loader::{LoadError, LoadRequest, SequenceLoader};
use crate::record::{Record, RecordSequence};

type Row = IndexMap<String, Value>;

/// JSON scenario payloads: either a bare row array or the scoring service envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScenarioDocument {
    Rows(Vec<Row>),
    Envelope {
        #[serde(default)]
        status: Option<String>,
        data: Vec<Row>,
    },
}

/// Read a scored scenario from a `.json` or `.csv` file.
pub fn load_scenario(path: &Path, label_column: &str) -> Result<RecordSequence, LoadError> {
    let rows = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => read_json(path)?,
        Some("csv") => read_csv(path)?,
        _ => {
            return Err(LoadError::Malformed(format!(
                "unsupported scenario format: {}",
                path.display()
            )))
        }
    };
    records_from_rows(rows, label_column)
}

/// Convert loosely typed rows into a sequence, preserving order.
pub fn records_from_rows(rows: Vec<Row>, label_column: &str) -> Result<RecordSequence, LoadError> {
    let records = rows
        .into_iter()
        .enumerate()
        .map(|(index, row)| {
            Record::from_fields(row, label_column)
                .map_err(|err| LoadError::Malformed(format!("row {index}: {err}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if records.is_empty() {
        return Err(LoadError::Empty);
    }
    Ok(RecordSequence::new(records))
}

/// Replace bare `NaN`, `Infinity` and `-Infinity` literals outside strings with `null`.
///
/// The scoring service serialises blank cells as `NaN`, which strict JSON rejects.
pub fn null_non_finite(body: &str) -> Cow<'_, str> {
    const TOKENS: [&str; 3] = ["-Infinity", "Infinity", "NaN"];
    let bytes = body.as_bytes();
    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut index = 0;
    while index < bytes.len() {
        let byte = bytes[index];
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            index += 1;
            continue;
        }
        if byte == b'"' {
            in_string = true;
            index += 1;
            continue;
        }
        if let Some(token) = TOKENS
            .iter()
            .find(|token| bytes[index..].starts_with(token.as_bytes()))
        {
            let buffer = out.get_or_insert_with(|| String::with_capacity(body.len()));
            buffer.push_str(&body[copied..index]);
            buffer.push_str("null");
            index += token.len();
            copied = index;
            continue;
        }
        index += 1;
    }
    match out {
        Some(mut buffer) => {
            buffer.push_str(&body[copied..]);
            Cow::Owned(buffer)
        }
        None => Cow::Borrowed(body),
    }
}

fn read_json(path: &Path) -> Result<Vec<Row>, LoadError> {
    let contents = fs::read_to_string(path)?;
    let document: ScenarioDocument = serde_json::from_str(&null_non_finite(&contents))
        .map_err(|err| LoadError::Malformed(format!("{}: {err}", path.display())))?;
    match document {
        ScenarioDocument::Rows(rows) => Ok(rows),
        ScenarioDocument::Envelope { status, data } => match status.as_deref() {
            None | Some("success") => Ok(data),
            Some(other) => Err(LoadError::Malformed(format!(
                "{}: unexpected status `{other}`",
                path.display()
            ))),
        },
    }
}

fn read_csv(path: &Path) -> Result<Vec<Row>, LoadError> {
    let file = fs::File::open(path)?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
    let headers = reader
        .headers()
        .map_err(|err| LoadError::Malformed(format!("{}: {err}", path.display())))?
        .clone();
    let mut rows = Vec::new();
    for result in reader.records() {
        let raw = result.map_err(|err| LoadError::Malformed(format!("{}: {err}", path.display())))?;
        let row = headers
            .iter()
            .zip(raw.iter())
            .map(|(header, cell)| (header.trim().to_owned(), csv_cell(cell)))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

fn csv_cell(cell: &str) -> Value {
    let cell = cell.trim();
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(integer) = cell.parse::<i64>() {
        return Value::from(integer);
    }
    match cell.parse::<f64>() {
        Ok(float) if float.is_finite() => Value::from(float),
        _ => Value::String(cell.to_owned()),
    }
}

/// [`SequenceLoader`] reading pre-scored scenario files below a root directory.
///
/// The request's `dataset` is the file path relative to the root; `model` is
/// ignored since the scenario already carries predictions.
#[derive(Debug, Clone)]
pub struct FileSequenceLoader {
    root: PathBuf,
}

impl FileSequenceLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, dataset: &str) -> Result<PathBuf, LoadError> {
        let relative = Path::new(dataset);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
        if dataset.trim().is_empty() || escapes {
            return Err(LoadError::Rejected {
                status: 400,
                message: format!("dataset path `{dataset}` is not below the scenario root"),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl SequenceLoader for FileSequenceLoader {
    async fn load(&self, request: &LoadRequest) -> Result<RecordSequence, LoadError> {
        let path = self.resolve(&request.dataset)?;
        let label_column = request.label_column.clone();
        tokio::task::spawn_blocking(move || load_scenario(&path, &label_column))
            .await
            .map_err(|err| LoadError::Unreachable(format!("scenario reader failed: {err}")))?
    }
}
