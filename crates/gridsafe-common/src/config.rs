//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "TOML configuration for the playback daemon and tools."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;
use url::Url;

use crate::logging::LogFormat;

/// Lowest accepted playback speed multiplier.
pub const MIN_PLAYBACK_SPEED: f64 = 1.0;
/// Highest accepted playback speed multiplier.
pub const MAX_PLAYBACK_SPEED: f64 = 100.0;

fn default_zone() -> String {
    "downtown".to_owned()
}

fn default_speed() -> f64 {
    MIN_PLAYBACK_SPEED
}

fn default_actuator_endpoint() -> String {
    "http://192.168.1.101:8000".to_owned()
}

fn default_actuator_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_loader_endpoint() -> String {
    "http://localhost:5000/api".to_owned()
}

fn default_label_column() -> String {
    "label".to_owned()
}

fn default_loader_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8090))
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_true() -> bool {
    true
}

/// Primary configuration object for the playback daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "GRIDSAFE_CONFIG";

    /// Load configuration from disk, respecting the `GRIDSAFE_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path.to_path_buf(),
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.playback.validate()?;
        validate_endpoint("actuator.endpoint", &self.actuator.endpoint)?;
        validate_endpoint("loader.endpoint", &self.loader.endpoint)?;
        if self.loader.label_column.trim().is_empty() {
            return Err(anyhow!("loader.label_column must not be empty"));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

fn validate_endpoint(field: &str, endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint).with_context(|| format!("{field} `{endpoint}` is not a URL"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(anyhow!("{field} uses unsupported scheme `{other}`")),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Actuator zone driven at startup; `all` addresses every zone.
    #[serde(default = "default_zone")]
    pub zone: String,
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Scenario preloaded when the daemon starts.
    #[serde(default)]
    pub scenario_file: Option<PathBuf>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            zone: default_zone(),
            speed: default_speed(),
            scenario_file: None,
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<()> {
        if self.zone.trim().is_empty() {
            return Err(anyhow!("playback.zone must not be empty"));
        }
        if !(MIN_PLAYBACK_SPEED..=MAX_PLAYBACK_SPEED).contains(&self.speed) {
            return Err(anyhow!(
                "playback.speed {} must be within [{MIN_PLAYBACK_SPEED}, {MAX_PLAYBACK_SPEED}]",
                self.speed
            ));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    /// Base URL of the status-light service.
    #[serde(default = "default_actuator_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_actuator_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_actuator_endpoint(),
            request_timeout: default_actuator_timeout(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Base URL of the scoring back-end exposing `/simulate`.
    #[serde(default = "default_loader_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_label_column")]
    pub label_column: String,
    #[serde(default = "default_loader_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
    /// Serve load requests from scenario files below this directory instead of the back-end.
    #[serde(default)]
    pub scenario_root: Option<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_loader_endpoint(),
            label_column: default_label_column(),
            request_timeout: default_loader_timeout(),
            scenario_root: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Also write a daily rolling JSON log below `directory`.
    #[serde(default = "default_true")]
    pub file_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            file_output: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: AppConfig = "".parse().unwrap();
        assert_eq!(config.playback.zone, "downtown");
        assert_eq!(config.playback.speed, 1.0);
        assert_eq!(config.actuator.endpoint, "http://192.168.1.101:8000");
        assert_eq!(config.actuator.request_timeout, Duration::from_secs(2));
        assert_eq!(config.loader.request_timeout, Duration::from_secs(30));
        assert_eq!(config.api.listen.port(), 8090);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn parses_full_document() {
        let config: AppConfig = r#"
            [playback]
            zone = "all"
            speed = 25.0
            scenario_file = "scenarios/fdi.json"

            [actuator]
            endpoint = "http://10.0.0.5:8000"
            request_timeout = 1

            [loader]
            endpoint = "https://scoring.local/api"
            label_column = "attack_type"

            [api]
            enabled = false
            listen = "127.0.0.1:9000"

            [logging]
            format = "pretty"
            file_output = false
        "#
        .parse()
        .unwrap();
        assert_eq!(config.playback.speed, 25.0);
        assert_eq!(
            config.playback.scenario_file.as_deref(),
            Some(Path::new("scenarios/fdi.json"))
        );
        assert_eq!(config.actuator.request_timeout, Duration::from_secs(1));
        assert_eq!(config.loader.label_column, "attack_type");
        assert!(!config.api.enabled);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(!config.logging.file_output);
    }

    #[test]
    fn rejects_out_of_range_speed() {
        let err = "[playback]\nspeed = 150.0".parse::<AppConfig>().unwrap_err();
        assert!(err.to_string().contains("playback.speed"));
        assert!("[playback]\nspeed = 0.5".parse::<AppConfig>().is_err());
    }

    #[test]
    fn rejects_non_http_endpoints() {
        assert!("[actuator]\nendpoint = \"ftp://lights\"".parse::<AppConfig>().is_err());
        assert!("[loader]\nendpoint = \"not a url\"".parse::<AppConfig>().is_err());
    }

    #[test]
    fn rejects_blank_zone() {
        assert!("[playback]\nzone = \"  \"".parse::<AppConfig>().is_err());
    }
}
