// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod analyze;
pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod metrics;
pub mod monitor;
pub mod reconcile;
pub mod state;
pub mod telemetry;
pub mod validation;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::MonitorConfig;
pub use crate::ingest::scheduler::{spawn_refresh_scheduler, SchedulerHandle};
pub use crate::ingest::types::{IndexSeries, Sample, SampleStatus, SourceId};
pub use crate::monitor::{Monitor, RiskReport};
pub use crate::state::ForecastState;
