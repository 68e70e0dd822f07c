//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "HTTP client fetching scored record sequences."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use gridsafe_common::LoaderConfig;
use gridsafe_sim::replay::{null_non_finite, records_from_rows};
use gridsafe_sim::{LoadError, LoadRequest, RecordSequence, SequenceLoader};
use indexmap::IndexMap;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::{error_message, normalise_endpoint};

#[derive(Debug, Deserialize)]
struct SimulateResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: Option<Vec<IndexMap<String, Value>>>,
    #[serde(default)]
    error: Option<String>,
}

/// [`SequenceLoader`] backed by the scoring service's `POST /simulate` endpoint.
#[derive(Debug, Clone)]
pub struct HttpSequenceLoader {
    client: Client,
    endpoint: String,
}

impl HttpSequenceLoader {
    /// Create a loader with the given per-request timeout.
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self> {
        let endpoint = normalise_endpoint(endpoint)?;
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build loader http client")?;
        Ok(Self { client, endpoint })
    }

    /// Create a loader from the `[loader]` configuration section.
    pub fn from_config(config: &LoaderConfig) -> Result<Self> {
        Self::new(&config.endpoint, config.request_timeout)
    }
}

#[async_trait]
impl SequenceLoader for HttpSequenceLoader {
    async fn load(&self, request: &LoadRequest) -> Result<RecordSequence, LoadError> {
        let url = format!("{}/simulate", self.endpoint);
        debug!(%url, model = %request.model, dataset = %request.dataset, "requesting scored sequence");
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "model_path": request.model,
                "dataset": request.dataset,
                "label_col": request.label_column,
            }))
            .send()
            .await
            .map_err(|err| LoadError::Unreachable(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| LoadError::Unreachable(err.to_string()))?;
        if !status.is_success() {
            return Err(LoadError::Rejected {
                status: status.as_u16(),
                message: error_message(body),
            });
        }

        let payload: SimulateResponse = serde_json::from_str(&null_non_finite(&body))
            .map_err(|err| LoadError::Malformed(err.to_string()))?;
        if let Some(error) = payload.error {
            return Err(LoadError::Rejected {
                status: status.as_u16(),
                message: error,
            });
        }
        match payload.status.as_deref() {
            None | Some("success") => {}
            Some(other) => {
                return Err(LoadError::Malformed(format!("unexpected status `{other}`")))
            }
        }
        let rows = payload
            .data
            .ok_or_else(|| LoadError::Malformed("response carries no `data` field".into()))?;
        records_from_rows(rows, &request.label_column)
    }
}
