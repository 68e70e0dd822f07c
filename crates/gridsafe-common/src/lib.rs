//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives for the playback workspace."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Shared primitives for the GridSafe playback workspace: configuration
//! loading, tracing initialisation and the prometheus registry.

pub mod config;
pub mod logging;
pub mod metrics;

pub use config::{
    ActuatorConfig, ApiConfig, AppConfig, LoadedAppConfig, LoaderConfig, LoggingConfig,
    MetricsConfig, PlaybackConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use metrics::{new_registry, SharedRegistry};
