//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Operator control API for the playback scheduler."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use gridsafe_common::metrics::{encode_text, SharedRegistry, TEXT_CONTENT_TYPE};
use gridsafe_sim::{
    LoadError, LoadRequest, PlaybackError, PlaybackScheduler, PlaybackSnapshot, SequenceLoader,
    Zone, DEFAULT_LABEL_COLUMN,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Body of `POST /playback/load`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadBody {
    /// Model identifier forwarded to the loader.
    pub model: String,
    /// Dataset identifier forwarded to the loader.
    pub dataset: String,
    /// Ground-truth column; the API default applies when absent.
    #[serde(default)]
    pub label_column: Option<String>,
}

/// Body of `POST /playback/load` responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadedBody {
    /// Number of records ready for playback.
    pub loaded: usize,
}

/// Body of `POST /playback/speed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SpeedBody {
    /// Requested multiplier in `[1, 100]`.
    pub multiplier: f64,
}

/// Body of `POST /playback/zone`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZoneBody {
    /// Target zone; `all` addresses every zone.
    pub zone: String,
}

/// Failures surfaced to API callers.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The request was well formed but carried an unacceptable value.
    #[error("{0}")]
    InvalidRequest(String),
    /// The sequence loader failed; the session is unchanged.
    #[error("load failed: {0}")]
    LoadFailed(#[from] LoadError),
}

impl From<PlaybackError> for ControlError {
    fn from(err: PlaybackError) -> Self {
        ControlError::InvalidRequest(err.to_string())
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = match &self {
            ControlError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ControlError::LoadFailed(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

struct ControlState {
    scheduler: PlaybackScheduler,
    loader: Arc<dyn SequenceLoader>,
    label_column: String,
    metrics: Option<SharedRegistry>,
}

/// Builder used to configure and spawn the control API server.
#[derive(Clone)]
pub struct ControlApiBuilder {
    listen: SocketAddr,
    scheduler: PlaybackScheduler,
    loader: Arc<dyn SequenceLoader>,
    label_column: String,
    metrics: Option<SharedRegistry>,
}

impl ControlApiBuilder {
    /// Construct a new builder from mandatory components.
    pub fn new(
        listen: SocketAddr,
        scheduler: PlaybackScheduler,
        loader: Arc<dyn SequenceLoader>,
    ) -> Self {
        Self {
            listen,
            scheduler,
            loader,
            label_column: DEFAULT_LABEL_COLUMN.to_owned(),
            metrics: None,
        }
    }

    /// Label column used when a load request does not name one.
    pub fn with_default_label_column(mut self, label_column: impl Into<String>) -> Self {
        self.label_column = label_column.into();
        self
    }

    /// Attach a Prometheus registry exposed at `/metrics`.
    pub fn with_metrics_registry(mut self, registry: SharedRegistry) -> Self {
        self.metrics = Some(registry);
        self
    }

    fn router(self) -> Router {
        let state = ControlState {
            scheduler: self.scheduler,
            loader: self.loader,
            label_column: self.label_column,
            metrics: self.metrics,
        };
        Router::new()
            .route("/playback", get(get_playback))
            .route("/playback/load", post(post_load))
            .route("/playback/play", post(post_play))
            .route("/playback/stop", post(post_stop))
            .route("/playback/speed", post(post_speed))
            .route("/playback/zone", post(post_zone))
            .route("/metrics", get(get_metrics))
            .with_state(Arc::new(state))
    }

    /// Spawn the server and return a handle that can be awaited for shutdown.
    pub async fn spawn(self) -> anyhow::Result<ControlApiHandle> {
        let listener = TcpListener::bind(self.listen).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "control api listening");

        let router = self.router();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        let task = tokio::spawn(async move {
            if let Err(err) = server.await {
                warn!(error = %err, "control api server exited with error");
            }
        });

        Ok(ControlApiHandle {
            address: local_addr,
            task,
            shutdown: shutdown_tx,
        })
    }
}

/// Handle returned from [`ControlApiBuilder::spawn`].
pub struct ControlApiHandle {
    address: SocketAddr,
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl ControlApiHandle {
    /// Socket address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Request graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        self.task.await.map_err(|join| anyhow::anyhow!(join))
    }
}

async fn get_playback(State(state): State<Arc<ControlState>>) -> Json<PlaybackSnapshot> {
    Json(state.scheduler.snapshot())
}

async fn post_load(
    State(state): State<Arc<ControlState>>,
    Json(body): Json<LoadBody>,
) -> Result<Json<LoadedBody>, ControlError> {
    let label_column = body
        .label_column
        .filter(|column| !column.trim().is_empty())
        .unwrap_or_else(|| state.label_column.clone());
    let request = LoadRequest::new(body.model, body.dataset).with_label_column(label_column);
    let loaded = state
        .scheduler
        .load_from(state.loader.as_ref(), &request)
        .await?;
    Ok(Json(LoadedBody { loaded }))
}

async fn post_play(State(state): State<Arc<ControlState>>) -> impl IntoResponse {
    state.scheduler.play();
    (StatusCode::ACCEPTED, Json(state.scheduler.snapshot()))
}

async fn post_stop(State(state): State<Arc<ControlState>>) -> impl IntoResponse {
    state.scheduler.stop();
    (StatusCode::ACCEPTED, Json(state.scheduler.snapshot()))
}

async fn post_speed(
    State(state): State<Arc<ControlState>>,
    Json(body): Json<SpeedBody>,
) -> Result<Json<PlaybackSnapshot>, ControlError> {
    state.scheduler.set_speed(body.multiplier)?;
    Ok(Json(state.scheduler.snapshot()))
}

async fn post_zone(
    State(state): State<Arc<ControlState>>,
    Json(body): Json<ZoneBody>,
) -> Result<Json<PlaybackSnapshot>, ControlError> {
    if body.zone.trim().is_empty() {
        return Err(ControlError::InvalidRequest(
            "zone must not be empty".into(),
        ));
    }
    state.scheduler.set_zone(Zone::new(body.zone));
    Ok(Json(state.scheduler.snapshot()))
}

async fn get_metrics(State(state): State<Arc<ControlState>>) -> Response {
    let Some(registry) = &state.metrics else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics registry unavailable",
        )
            .into_response();
    };
    match encode_text(registry) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsafe_common::metrics::new_registry;
    use gridsafe_sim::{
        ActuationDispatcher, FileSequenceLoader, NullActuator, PlaybackMetrics, PlaybackState,
    };
    use reqwest::Client;
    use serde_json::Value;
    use tempfile::TempDir;
    use tokio::time::{sleep, Duration};

    const SCENARIO: &str = r#"[
        {"timestamp": "2024-01-01T00:00:00Z", "voltage": 230.0, "predicted": 0, "actual": 0},
        {"timestamp": "2024-01-01T00:00:02Z", "voltage": 180.0, "predicted": 1, "actual": 1},
        {"timestamp": "2024-01-01T00:00:02.500Z", "voltage": 231.0, "predicted": 0, "actual": 2}
    ]"#;

    async fn spawn_api() -> (ControlApiHandle, PlaybackScheduler, TempDir) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("scenario.json"), SCENARIO).unwrap();

        let registry = new_registry();
        let metrics = PlaybackMetrics::new(registry.clone()).unwrap();
        let dispatcher =
            ActuationDispatcher::new(Arc::new(NullActuator)).with_metrics(Some(metrics.clone()));
        let scheduler = PlaybackScheduler::new(dispatcher, Some(metrics));
        let handle = ControlApiBuilder::new(
            "127.0.0.1:0".parse().unwrap(),
            scheduler.clone(),
            Arc::new(FileSequenceLoader::new(dir.path())),
        )
        .with_metrics_registry(registry)
        .spawn()
        .await
        .unwrap();
        (handle, scheduler, dir)
    }

    #[tokio::test]
    async fn drives_a_full_playback_session() {
        let (handle, scheduler, _dir) = spawn_api().await;
        let client = Client::new();
        let base = format!("http://{}", handle.local_addr());

        let idle: PlaybackSnapshot = client
            .get(format!("{base}/playback"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(idle.state, PlaybackState::Idle);
        assert_eq!(idle.accuracy, 100.0);

        let loaded = client
            .post(format!("{base}/playback/load"))
            .json(&LoadBody {
                model: "unused".into(),
                dataset: "scenario.json".into(),
                label_column: None,
            })
            .send()
            .await
            .unwrap();
        assert_eq!(loaded.status(), StatusCode::OK);
        assert_eq!(
            loaded.json::<LoadedBody>().await.unwrap(),
            LoadedBody { loaded: 3 }
        );

        let speed = client
            .post(format!("{base}/playback/speed"))
            .json(&SpeedBody { multiplier: 100.0 })
            .send()
            .await
            .unwrap();
        assert_eq!(speed.status(), StatusCode::OK);

        let zone: PlaybackSnapshot = client
            .post(format!("{base}/playback/zone"))
            .json(&ZoneBody {
                zone: "suburbs".into(),
            })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(zone.zone, Zone::new("suburbs"));

        let play = client
            .post(format!("{base}/playback/play"))
            .send()
            .await
            .unwrap();
        assert_eq!(play.status(), StatusCode::ACCEPTED);

        let mut states = scheduler.subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            states.wait_for(|state| *state == PlaybackState::Stopped),
        )
        .await
        .unwrap()
        .unwrap();

        let finished: PlaybackSnapshot = client
            .get(format!("{base}/playback"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(finished.state, PlaybackState::Stopped);
        assert_eq!(finished.stats.total_processed, 3);
        assert_eq!(finished.stats.missed_count, 1);
        assert_eq!(finished.log.len(), 3);
        assert_eq!(finished.log[0].record_index, 2);

        let metrics = client
            .get(format!("{base}/metrics"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(metrics.contains("gridsafe_playback_records_total"));
        assert!(metrics.contains("gridsafe_playback_loads_total"));

        let stop = client
            .post(format!("{base}/playback/stop"))
            .send()
            .await
            .unwrap();
        assert_eq!(stop.status(), StatusCode::ACCEPTED);
        let stopped: PlaybackSnapshot = stop.json().await.unwrap();
        assert_eq!(stopped.cursor, 0);
        assert!(stopped.log.is_empty());

        sleep(Duration::from_millis(20)).await;
        drop(client);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_bad_requests_without_touching_the_session() {
        let (handle, scheduler, _dir) = spawn_api().await;
        let client = Client::new();
        let base = format!("http://{}", handle.local_addr());

        let speed = client
            .post(format!("{base}/playback/speed"))
            .json(&SpeedBody { multiplier: 500.0 })
            .send()
            .await
            .unwrap();
        assert_eq!(speed.status(), StatusCode::BAD_REQUEST);
        let body: Value = speed.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("500"));
        assert_eq!(scheduler.speed().get(), 1.0);

        let missing = client
            .post(format!("{base}/playback/load"))
            .json(&LoadBody {
                model: "unused".into(),
                dataset: "missing.json".into(),
                label_column: Some("label".into()),
            })
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(scheduler.state(), PlaybackState::Idle);

        let zone = client
            .post(format!("{base}/playback/zone"))
            .json(&ZoneBody { zone: " ".into() })
            .send()
            .await
            .unwrap();
        assert_eq!(zone.status(), StatusCode::BAD_REQUEST);

        let play = client
            .post(format!("{base}/playback/play"))
            .send()
            .await
            .unwrap();
        assert_eq!(play.status(), StatusCode::ACCEPTED);
        assert_eq!(scheduler.state(), PlaybackState::Idle);

        drop(client);
        handle.shutdown().await.unwrap();
    }
}
