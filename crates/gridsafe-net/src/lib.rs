//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Network adapters for the playback engine."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! HTTP collaborators of the playback engine: the status-light actuator, the
//! scoring back-end that produces record sequences, and the operator control API.

pub mod actuator;
pub mod loader;
pub mod rest;

pub use actuator::HttpActuatorClient;
pub use loader::HttpSequenceLoader;
pub use rest::{ControlApiBuilder, ControlApiHandle, ControlError};

use url::Url;

/// Validate `endpoint` and return it without a trailing slash.
fn normalise_endpoint(endpoint: &str) -> anyhow::Result<String> {
    let url = Url::parse(endpoint)
        .map_err(|err| anyhow::anyhow!("invalid endpoint `{endpoint}`: {err}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("endpoint `{endpoint}` must use http or https");
    }
    Ok(endpoint.trim_end_matches('/').to_owned())
}

/// Prefer the `error` field of a JSON error body, falling back to the raw text.
fn error_message(body: String) -> String {
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| value.get("error").and_then(|e| e.as_str()).map(str::to_owned))
        .unwrap_or(body)
}
