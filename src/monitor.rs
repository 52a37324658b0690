//! # Monitor
//!
//! The injectable context object behind every entry point. It owns the
//! configuration, the fetcher, the clock, the cache, the validation tracker,
//! the per-source records and the published state.
//!
//! Locking:
//! - each source pipeline runs under its own async mutex, so a manual retry
//!   and an automatic cycle for the same source serialize instead of racing;
//! - reconciliation runs under one async mutex, so two passes never write
//!   the state concurrently;
//! - the cache, the tracker and the records sit behind short-lived std
//!   mutexes that are never held across an `.await`.
//!
//! Every pipeline runs in its own task. If that task dies, the source is
//! still closed out with a terminal `error` entry.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::task::{self, JoinSet};

use crate::analyze::{
    dst_storm_class, DstClass, FlightStatus, Indices, Prediction, RiskAssessment, SamaAnalyzer,
    Trend,
};
use crate::cache::IndexCache;
use crate::clock::{Clock, SystemClock};
use crate::config::MonitorConfig;
use crate::error::{ReconcileError, SourceError, UnknownSource};
use crate::fetch::{ReqwestTransport, ResilientFetcher, Transport};
use crate::ingest::types::{IndexSeries, SourceId};
use crate::ingest::{acquire_source, ensure_metrics_described, PipelineCtx};
use crate::reconcile::{reconcile, Grid, SourceRecord};
use crate::state::{ForecastState, ForecastUpdate, StateStore};
use crate::validation::{ValidationEntry, ValidationSummary, ValidationTracker};

/// Structured risk output for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskReport {
    pub sama_factor: f64,
    pub risk: Option<RiskAssessment>,
    pub trend: Option<Trend>,
    pub prediction: Option<Prediction>,
    pub storm_probability: f64,
    pub flight_status: Option<FlightStatus>,
    pub recommendation: Option<&'static str>,
    pub dst: Option<f64>,
    pub dst_class: Option<DstClass>,
    pub optimal_window_slots: usize,
    pub total_slots: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

pub struct Monitor {
    cfg: Arc<MonitorConfig>,
    fetcher: ResilientFetcher,
    clock: Arc<dyn Clock>,
    analyzer: SamaAnalyzer,
    cache: Mutex<IndexCache<IndexSeries>>,
    tracker: Mutex<ValidationTracker>,
    records: Mutex<BTreeMap<SourceId, SourceRecord>>,
    source_locks: HashMap<SourceId, tokio::sync::Mutex<()>>,
    reconcile_lock: tokio::sync::Mutex<()>,
    store: StateStore,
}

impl Monitor {
    pub fn new(cfg: MonitorConfig, transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        let fetcher = ResilientFetcher::new(transport, cfg.relays.clone());
        let ids: Vec<SourceId> = cfg.sources.iter().map(|s| s.id).collect();
        let records = cfg
            .sources
            .iter()
            .map(|s| (s.id, SourceRecord::new(s.id, s.priority)))
            .collect();
        let source_locks = ids
            .iter()
            .map(|id| (*id, tokio::sync::Mutex::new(())))
            .collect();

        Self {
            analyzer: SamaAnalyzer::new(cfg.sama.clone()),
            cache: Mutex::new(IndexCache::new(cfg.cache_ttl.clone(), clock.clone())),
            tracker: Mutex::new(ValidationTracker::new(ids)),
            records: Mutex::new(records),
            source_locks,
            reconcile_lock: tokio::sync::Mutex::new(()),
            store: StateStore::new(),
            fetcher,
            clock,
            cfg: Arc::new(cfg),
        }
    }

    /// Production wiring: reqwest transport and the system clock.
    pub fn from_config(cfg: MonitorConfig) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::new(cfg, Arc::new(transport), Arc::new(SystemClock)))
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.cfg
    }

    pub fn forecast(&self) -> ForecastState {
        self.store.snapshot()
    }

    pub fn validation(&self) -> BTreeMap<SourceId, ValidationEntry> {
        self.tracker.lock().expect("tracker mutex poisoned").snapshot()
    }

    pub fn validation_summary(&self) -> ValidationSummary {
        self.tracker.lock().expect("tracker mutex poisoned").summary()
    }

    pub fn risk_report(&self) -> RiskReport {
        let s = self.store.snapshot();
        RiskReport {
            sama_factor: s.sama_factor,
            recommendation: s.flight_status.map(|f| f.recommendation()),
            risk: s.risk,
            trend: s.trend,
            prediction: s.prediction,
            storm_probability: s.storm_probability,
            flight_status: s.flight_status,
            dst: s.current.dst,
            dst_class: s.dst_class,
            optimal_window_slots: s.optimal_window_slots,
            total_slots: s.timestamps.len(),
            updated_at: s.updated_at,
        }
    }

    /// One full cycle: every enabled source in parallel, wait for all of
    /// them to settle, then reconcile once.
    ///
    /// Returns the newly published state, or `NoData` when no source had
    /// data, in which case the previous state is left as it was.
    pub async fn refresh(self: &Arc<Self>) -> Result<ForecastState, ReconcileError> {
        ensure_metrics_described();
        counter!("geomag_refresh_cycles_total").increment(1);
        self.purge_cache();

        let mut set = JoinSet::new();
        let mut spawned: HashMap<task::Id, SourceId> = HashMap::new();
        for source in self.cfg.enabled_sources() {
            let id = source.id;
            let me = Arc::clone(self);
            let handle = set.spawn(async move { (id, me.run_source(id).await) });
            spawned.insert(handle.id(), id);
        }
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((id, Some(entry))) => {
                    tracing::debug!(source = %id, status = entry.status.as_str(), "pipeline settled")
                }
                Ok((id, None)) => tracing::warn!(source = %id, "source vanished from config"),
                Err(e) => match spawned.get(&e.id()) {
                    Some(&id) => {
                        self.abandon_source(id, &e);
                    }
                    None => tracing::error!(error = %e, "unknown source pipeline task failed"),
                },
            }
        }

        self.reconcile_and_publish().await
    }

    /// Re-run one source and reconcile. Serializes with any in-flight run of
    /// the same source; other sources are not touched.
    pub async fn retry_source(
        self: &Arc<Self>,
        id: SourceId,
    ) -> Result<ValidationEntry, UnknownSource> {
        if !self.cfg.source(id).is_some_and(|s| s.enabled) {
            return Err(UnknownSource(id.to_string()));
        }
        let me = Arc::clone(self);
        let entry = match tokio::spawn(async move { me.run_source(id).await }).await {
            Ok(entry) => entry.ok_or_else(|| UnknownSource(id.to_string()))?,
            Err(e) => self.abandon_source(id, &e),
        };
        if let Err(e) = self.reconcile_and_publish().await {
            tracing::info!(source = %id, error = %e, "retry left the forecast unchanged");
        }
        Ok(entry)
    }

    /// Close out a pipeline whose task died: terminal error entry, no data.
    fn abandon_source(&self, id: SourceId, err: &task::JoinError) -> ValidationEntry {
        tracing::error!(source = %id, error = %err, "source pipeline task failed");
        let entry = ValidationEntry::failure(
            &SourceError::format(format!("pipeline aborted: {err}")),
            0,
            self.clock.now(),
        );
        counter!(
            "geomag_source_outcomes_total",
            "source" => id.as_str(),
            "status" => entry.status.as_str()
        )
        .increment(1);
        if let Some(rec) = self.records.lock().expect("records mutex poisoned").get_mut(&id) {
            rec.series = None;
            rec.validation = entry.clone();
        }
        self.tracker
            .lock()
            .expect("tracker mutex poisoned")
            .record(id, entry.clone());
        entry
    }

    fn purge_cache(&self) {
        let purged = self.cache.lock().expect("cache mutex poisoned").purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "expired cache entries dropped");
        }
    }

    async fn run_source(&self, id: SourceId) -> Option<ValidationEntry> {
        let source = self.cfg.source(id)?;
        let _guard = self.source_locks.get(&id)?.lock().await;

        self.tracker.lock().expect("tracker mutex poisoned").begin(id);

        let ctx = PipelineCtx {
            cfg: &self.cfg,
            fetcher: &self.fetcher,
            cache: &self.cache,
            now: self.clock.now(),
        };
        let outcome = acquire_source(source, &ctx).await;

        if let Some(rec) = self.records.lock().expect("records mutex poisoned").get_mut(&id) {
            rec.series = outcome.series;
            rec.validation = outcome.validation.clone();
        }
        self.tracker
            .lock()
            .expect("tracker mutex poisoned")
            .record(id, outcome.validation.clone());
        Some(outcome.validation)
    }

    async fn reconcile_and_publish(&self) -> Result<ForecastState, ReconcileError> {
        let _guard = self.reconcile_lock.lock().await;

        let records: Vec<SourceRecord> = self
            .records
            .lock()
            .expect("records mutex poisoned")
            .values()
            .cloned()
            .collect();

        let reconciled = match reconcile(&records, Grid::from_config(&self.cfg)) {
            Ok(r) => r,
            Err(e) => {
                counter!("geomag_refresh_failures_total").increment(1);
                tracing::warn!(error = %e, "no source produced data, keeping previous forecast");
                return Err(e);
            }
        };

        let a = &self.analyzer;
        let current = reconciled.current;
        let indices = Indices {
            kp: current.kp,
            ap: current.ap,
            hp30: current.hp30,
            ap30: current.ap30,
            ap30_history: reconciled.ap30_history.clone(),
        };
        let factor = a.dynamic_factor(&indices);
        let risk = a.evaluate_risk(&indices, factor);
        let trend = a.analyze_recent_changes(&indices.ap30_history);
        let prediction = a.predict_short_term(&indices, self.cfg.sama.prediction_horizon_hours);
        let storm = a.storm_probability(&reconciled.kp, &reconciled.ap, &reconciled.hp30, factor);
        let flight = a.flight_status(current.kp, current.ap, factor);
        let optimal = a.optimal_window_slots(&reconciled.kp, factor);
        let now = self.clock.now();

        tracing::info!(
            primary = %reconciled.primary_source,
            factor,
            score = risk.score,
            level = ?risk.level,
            "forecast reconciled"
        );

        let update = ForecastUpdate {
            sama_factor: Some(factor),
            risk: Some(risk),
            trend: Some(trend),
            prediction: Some(prediction),
            storm_probability: Some(storm),
            flight_status: Some(flight),
            dst_class: Some(current.dst.map(dst_storm_class)),
            optimal_window_slots: Some(optimal),
            updated_at: Some(now),
            ..ForecastUpdate::from(reconciled)
        };
        let state = self.store.apply(update);

        gauge!("geomag_sama_factor").set(factor);
        gauge!("geomag_last_refresh_ts").set(now.timestamp() as f64);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct Down;

    #[async_trait]
    impl Transport for Down {
        async fn get(&self, _url: &str, route: &str) -> Result<String, FetchError> {
            Err(FetchError::Network {
                route: route.to_string(),
                detail: "down".into(),
            })
        }
    }

    fn monitor() -> Arc<Monitor> {
        let mut cfg = MonitorConfig::default();
        cfg.relays.clear();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap(),
        ));
        Arc::new(Monitor::new(cfg, Arc::new(Down), clock))
    }

    #[tokio::test]
    async fn total_failure_keeps_state_and_records_every_source() {
        let m = monitor();
        let before = m.forecast();
        assert_eq!(m.refresh().await, Err(ReconcileError::NoData));
        assert_eq!(m.forecast(), before);

        let v = m.validation();
        assert_eq!(v.len(), 8);
        assert!(v.values().all(|e| e.status.is_terminal()));
        assert!(v.values().all(|e| e.error_detail.is_some()));
    }

    #[tokio::test]
    async fn retry_rejects_unknown_source() {
        let mut cfg = MonitorConfig::default();
        cfg.sources.retain(|s| s.id != SourceId::Dst);
        let m = Arc::new(Monitor::new(cfg, Arc::new(Down), Arc::new(SystemClock)));
        assert!(m.retry_source(SourceId::Dst).await.is_err());
        let e = m.retry_source(SourceId::Ksa).await.unwrap();
        assert!(e.status.is_terminal());
    }

    #[test]
    fn initial_report_is_neutral() {
        let r = monitor().risk_report();
        assert_eq!(r.sama_factor, 1.3);
        assert!(r.risk.is_none());
        assert_eq!(r.total_slots, 0);
    }
}
