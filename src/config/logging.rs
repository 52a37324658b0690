// src/config/logging.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Tracing output for both binaries. `RUST_LOG` overrides `filter` at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives, e.g. `geomag_monitor=debug,warn`.
    pub filter: String,
    pub format: LogFormat,
    /// Server only: also require `GEOMAG_DEV_LOG=1` and a development environment.
    pub dev_only: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "geomag_monitor=info,warn".into(),
            format: LogFormat::Compact,
            dev_only: true,
        }
    }
}
