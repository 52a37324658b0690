// src/config/mod.rs
pub mod logging;
pub mod sama;
pub mod sources;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use logging::{LogConfig, LogFormat};
pub use sama::SamaConfig;
pub use sources::{CacheTtlConfig, RelayRoute, RuntimeEnv, SourceConfig};

use crate::ingest::types::SourceId;

pub const ENV_CONFIG_PATH: &str = "GEOMAG_CONFIG_PATH";
pub const DEFAULT_CONFIG_TOML: &str = "config/monitor.toml";
pub const DEFAULT_CONFIG_JSON: &str = "config/monitor.json";

/// Complete policy for one monitor instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub refresh_interval_secs: u64,
    /// Slots on the reconciled display grid.
    pub display_slots: usize,
    pub slot_hours: i64,
    /// Look-back window requested from the JSON-index provider.
    pub history_hours: i64,
    /// Raw high-cadence samples per display slot (30 min → 3 h).
    pub block_size: usize,
    /// Raw ap30 samples kept for trend detection.
    pub ap30_history_len: usize,
    /// Range bounds of JSON-index requests are floored to this grid.
    pub range_align_minutes: i64,
    pub environment: Option<RuntimeEnv>,
    pub relays: Vec<RelayRoute>,
    pub sources: Vec<SourceConfig>,
    pub cache_ttl: CacheTtlConfig,
    pub sama: SamaConfig,
    pub log: LogConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 600,
            display_slots: 24,
            slot_hours: 3,
            history_hours: 72,
            block_size: 6,
            ap30_history_len: 48,
            range_align_minutes: 30,
            environment: None,
            relays: sources::default_relays(),
            sources: sources::default_sources(),
            cache_ttl: CacheTtlConfig::default(),
            sama: SamaConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn runtime_env(&self) -> RuntimeEnv {
        self.environment.unwrap_or_else(RuntimeEnv::detect)
    }

    pub fn source(&self, id: SourceId) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Enabled sources in priority order.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    /// Sort relays and sources by priority, drop duplicate source ids and
    /// clamp degenerate sizes back to their defaults.
    fn sanitize(mut self) -> Self {
        let d = MonitorConfig::default();
        if self.refresh_interval_secs == 0 {
            self.refresh_interval_secs = d.refresh_interval_secs;
        }
        if self.display_slots == 0 {
            self.display_slots = d.display_slots;
        }
        if self.slot_hours <= 0 {
            self.slot_hours = d.slot_hours;
        }
        if self.history_hours <= 0 {
            self.history_hours = d.history_hours;
        }
        if self.block_size == 0 {
            self.block_size = d.block_size;
        }
        if self.range_align_minutes <= 0 {
            self.range_align_minutes = d.range_align_minutes;
        }
        if self.log.filter.trim().is_empty() {
            self.log.filter = d.log.filter;
        }

        self.relays.sort_by_key(|r| r.priority);
        self.sources.sort_by_key(|s| s.priority);
        let mut seen = std::collections::BTreeSet::new();
        self.sources.retain(|s| seen.insert(s.id));
        self
    }
}

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_from(path: &Path) -> Result<MonitorConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading monitor config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing monitor config {}", path.display()))
}

/// Load config using env var + fallbacks:
/// 1) $GEOMAG_CONFIG_PATH
/// 2) config/monitor.toml
/// 3) config/monitor.json
/// 4) built-in defaults
pub fn load_default() -> Result<MonitorConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        } else {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
    }
    for candidate in [DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_JSON] {
        let p = PathBuf::from(candidate);
        if p.exists() {
            return load_from(&p);
        }
    }
    Ok(MonitorConfig::default())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<MonitorConfig> {
    let cfg = match hint_ext {
        "json" => serde_json::from_str::<MonitorConfig>(s)?,
        "toml" => toml::from_str::<MonitorConfig>(s)?,
        _ => match toml::from_str::<MonitorConfig>(s) {
            Ok(c) => c,
            Err(_) => serde_json::from_str::<MonitorConfig>(s)
                .map_err(|_| anyhow!("unsupported monitor config format"))?,
        },
    };
    Ok(cfg.sanitize())
}
