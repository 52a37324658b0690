//! Tracing setup shared by the server and the one-shot binary.
//!
//! Directives come from [`LogConfig::filter`]; `RUST_LOG` wins when it
//! parses. Output goes to stderr so `refresh_once` can keep stdout for JSON.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LogConfig, LogFormat, RuntimeEnv};

pub const ENV_DEV_LOG: &str = "GEOMAG_DEV_LOG";

/// `GEOMAG_DEV_LOG=1` plus a debug build or a development environment.
pub fn dev_logging_requested(flag: Option<&str>, env: RuntimeEnv) -> bool {
    flag.is_some_and(|v| v.trim() == "1")
        && (cfg!(debug_assertions) || env == RuntimeEnv::Development)
}

/// Env override, then the configured directives, then the built-in default.
pub fn filter_for(log: &LogConfig, env_override: Option<&str>) -> EnvFilter {
    env_override
        .and_then(|d| EnvFilter::try_new(d).ok())
        .or_else(|| EnvFilter::try_new(&log.filter).ok())
        .unwrap_or_else(|| EnvFilter::new(LogConfig::default().filter))
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_tracing(log: &LogConfig) -> bool {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let registry = tracing_subscriber::registry().with(filter_for(log, env.as_deref()));
    let installed = match log.format {
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.is_ok()
}

/// Server variant: with `dev_only` set, stays silent unless dev logging
/// was asked for, leaving the platform's own subscriber in place.
pub fn init_server_tracing(log: &LogConfig, env: RuntimeEnv) -> bool {
    let flag = std::env::var(ENV_DEV_LOG).ok();
    if log.dev_only && !dev_logging_requested(flag.as_deref(), env) {
        return false;
    }
    init_tracing(log)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_directives_are_used() {
        let log = LogConfig {
            filter: "geomag_monitor=debug".into(),
            ..LogConfig::default()
        };
        assert!(filter_for(&log, None).to_string().contains("geomag_monitor=debug"));
        assert!(filter_for(&LogConfig::default(), None)
            .to_string()
            .contains("geomag_monitor=info"));
    }

    #[test]
    fn env_override_wins_unless_unparseable() {
        let log = LogConfig::default();
        let f = filter_for(&log, Some("geomag_monitor=trace"));
        assert!(f.to_string().contains("geomag_monitor=trace"));

        let f = filter_for(&log, Some("geomag_monitor=loud"));
        assert!(f.to_string().contains("geomag_monitor=info"));
    }

    #[test]
    fn dev_flag_gates_server_logging() {
        assert!(!dev_logging_requested(None, RuntimeEnv::Development));
        assert!(!dev_logging_requested(Some("0"), RuntimeEnv::Development));
        assert!(dev_logging_requested(Some("1"), RuntimeEnv::Development));
    }
}
