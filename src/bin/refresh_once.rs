//! Runs a single refresh cycle against the live providers and prints the
//! resulting forecast, per-source validation and risk report as JSON.

use std::sync::Arc;

use anyhow::Context;
use geomag_monitor::{config, telemetry, Monitor};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cfg = config::load_default().context("loading monitor config")?;
    telemetry::init_tracing(&cfg.log);
    let monitor = Arc::new(Monitor::from_config(cfg)?);

    if let Err(e) = monitor.refresh().await {
        tracing::warn!(error = %e, "refresh produced no forecast");
    }

    let out = json!({
        "forecast": monitor.forecast(),
        "validation": monitor.validation(),
        "summary": monitor.validation_summary(),
        "risk": monitor.risk_report(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
