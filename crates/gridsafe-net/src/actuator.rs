//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "HTTP client for the status-light actuator service."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use gridsafe_common::ActuatorConfig;
use gridsafe_sim::{ActuatorClient, ActuatorError, Rgb, Zone};
use reqwest::Client;
use serde_json::json;

use crate::{error_message, normalise_endpoint};

/// [`ActuatorClient`] speaking the status-light service's JSON protocol.
///
/// `POST /set-color` takes `{section, r, g, b}`; `POST /off` takes `{section}`.
#[derive(Debug, Clone)]
pub struct HttpActuatorClient {
    client: Client,
    endpoint: String,
}

impl HttpActuatorClient {
    /// Create a client with the given per-request timeout.
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self> {
        let endpoint = normalise_endpoint(endpoint)?;
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build actuator http client")?;
        Ok(Self { client, endpoint })
    }

    /// Create a client from the `[actuator]` configuration section.
    pub fn from_config(config: &ActuatorConfig) -> Result<Self> {
        Self::new(&config.endpoint, config.request_timeout)
    }

    /// Base URL commands are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<(), ActuatorError> {
        let response = self
            .client
            .post(format!("{}/{path}", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|err| ActuatorError::Transport(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ActuatorError::Rejected {
            status: status.as_u16(),
            message: error_message(body),
        })
    }
}

#[async_trait]
impl ActuatorClient for HttpActuatorClient {
    async fn set_color(&self, zone: &Zone, color: Rgb) -> Result<(), ActuatorError> {
        self.post(
            "set-color",
            json!({
                "section": zone.as_str(),
                "r": color.r,
                "g": color.g,
                "b": color.b,
            }),
        )
        .await
    }

    async fn power_off(&self, zone: &Zone) -> Result<(), ActuatorError> {
        self.post("off", json!({ "section": zone.as_str() })).await
    }
}
