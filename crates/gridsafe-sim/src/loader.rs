//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "playback"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Seam for fetching scored record sequences."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::io;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::RecordSequence;

/// Ground-truth column used when a request does not name one.
pub const DEFAULT_LABEL_COLUMN: &str = "label";

/// Parameters identifying the scored dataset to replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub model: String,
    pub dataset: String,
    #[serde(default = "default_label_column")]
    pub label_column: String,
}

impl LoadRequest {
    pub fn new(model: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            dataset: dataset.into(),
            label_column: DEFAULT_LABEL_COLUMN.to_owned(),
        }
    }

    pub fn with_label_column(mut self, label_column: impl Into<String>) -> Self {
        self.label_column = label_column.into();
        self
    }
}

fn default_label_column() -> String {
    DEFAULT_LABEL_COLUMN.to_owned()
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("record source unreachable: {0}")]
    Unreachable(String),
    #[error("record source rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed record payload: {0}")]
    Malformed(String),
    #[error("record source returned no records")]
    Empty,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Source of scored record sequences.
#[async_trait]
pub trait SequenceLoader: Send + Sync {
    async fn load(&self, request: &LoadRequest) -> Result<RecordSequence, LoadError>;
}
