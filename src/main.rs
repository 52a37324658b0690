//! Geomagnetic SAMA monitor — Binary Entrypoint
//! Boots the Axum HTTP server, the refresh scheduler and the metrics route.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use geomag_monitor::api::{self, AppState};
use geomag_monitor::config;
use geomag_monitor::metrics::Metrics;
use geomag_monitor::{spawn_refresh_scheduler, telemetry, Monitor};
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    let cfg = config::load_default().context("loading monitor config")?;
    // Filter directives come from `[log]`; no-op outside dev unless `dev_only = false`.
    telemetry::init_server_tracing(&cfg.log, cfg.runtime_env());

    let interval = Duration::from_secs(cfg.refresh_interval_secs);
    tracing::info!(
        sources = cfg.sources.len(),
        interval_secs = cfg.refresh_interval_secs,
        env = ?cfg.runtime_env(),
        "starting geomagnetic monitor"
    );

    let metrics = Metrics::init(cfg.refresh_interval_secs).context("installing metrics recorder")?;
    let monitor = Arc::new(Monitor::from_config(cfg).context("building monitor")?);

    // Detached: ticks for the life of the process, first cycle immediately.
    drop(spawn_refresh_scheduler(Arc::clone(&monitor), interval));

    let router = api::router(AppState::new(monitor)).merge(metrics.router());
    Ok(router.into())
}
