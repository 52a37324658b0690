// tests/refresh_cycle.rs
//
// Full refresh cycles against a scripted transport: every provider URL is
// answered from tests/fixtures, the clock is pinned, and the transport can
// be switched to fail everything.
//
// Covered:
// - successful cycle publishes a reconciled state (regional K as primary)
// - second cycle inside the TTL is served from cache
// - total failure keeps the previous state, entries end terminal
// - day walk-back for dated sources
// - manual retry of one source
// - malformed or crashing source still ends in a terminal entry
// - scheduler start / cancel

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use geomag_monitor::analyze::{DstClass, RiskLevel, TrendDirection};
use geomag_monitor::clock::ManualClock;
use geomag_monitor::error::{FetchError, ReconcileError};
use geomag_monitor::fetch::Transport;
use geomag_monitor::validation::{Reliability, ValidationStatus};
use geomag_monitor::{spawn_refresh_scheduler, Monitor, MonitorConfig, SourceId};

const KSA: &str = include_str!("fixtures/ksa_2024-05-10.txt");
const NOAA: &str = include_str!("fixtures/noaa_3day.txt");
const GFZ_KP: &str = include_str!("fixtures/gfz_kp.json");
const GFZ_AP: &str = include_str!("fixtures/gfz_ap.json");
const GFZ_HP30: &str = include_str!("fixtures/gfz_hp30.json");
const GFZ_AP30: &str = include_str!("fixtures/gfz_ap30.json");
const DST: &str = include_str!("fixtures/dst_2405.txt");
const PIL: &str = include_str!("fixtures/pil.json");
const DST_BAD_DAY: &str = "DST 2024 05 999999999999 \
    -10 -10 -10 -10 -10 -10 -10 -10 -10 -10 -10 -10 \
    -10 -10 -10 -10 -10 -10 -10 -10 -10 -10 -10 -10 9999\n";

/// Serves the first body whose pattern matches the URL; 404 otherwise.
struct Scripted {
    routes: Vec<(&'static str, &'static str)>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(routes: Vec<(&'static str, &'static str)>) -> Arc<Self> {
        Arc::new(Self {
            routes,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    fn all_providers() -> Arc<Self> {
        Self::new(vec![
            ("/ksa/2024/2024-05-10.txt", KSA),
            ("3-day-geomag-forecast", NOAA),
            ("index=Kp", GFZ_KP),
            ("index=Hp30", GFZ_HP30),
            ("index=ap30", GFZ_AP30),
            ("index=ap", GFZ_AP),
            ("dst2405.for.request", DST),
            ("ObservatoryIagaCode=PIL", PIL),
        ])
    }

    fn set_failing(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for Scripted {
    async fn get(&self, url: &str, route: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Network {
                route: route.to_string(),
                detail: "connection refused".into(),
            });
        }
        // GFZ URLs end with the index name; `index=ap` must not swallow `index=ap30`.
        self.routes
            .iter()
            .find(|(pat, _)| {
                if pat.starts_with("index=") {
                    url.ends_with(pat)
                } else {
                    url.contains(pat)
                }
            })
            .map(|(_, body)| body.to_string())
            .ok_or(FetchError::Http {
                route: route.to_string(),
                status: 404,
            })
    }
}

/// Delegates to `inner` but panics for any URL containing `pattern`.
struct PanicsOn {
    inner: Arc<Scripted>,
    pattern: &'static str,
}

#[async_trait]
impl Transport for PanicsOn {
    async fn get(&self, url: &str, route: &str) -> Result<String, FetchError> {
        if url.contains(self.pattern) {
            panic!("transport blew up on {url}");
        }
        self.inner.get(url, route).await
    }
}

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 12, 10, 0).unwrap()
}

fn build(transport: Arc<dyn Transport>) -> (Arc<Monitor>, Arc<ManualClock>) {
    let mut cfg = MonitorConfig::default();
    cfg.relays.clear();
    let clock = Arc::new(ManualClock::new(noon()));
    let m = Monitor::new(cfg, transport, clock.clone());
    (Arc::new(m), clock)
}

#[tokio::test]
async fn successful_cycle_publishes_reconciled_state() {
    let (m, _) = build(Scripted::all_providers());

    let s = m.refresh().await.expect("cycle should reconcile");
    assert_eq!(s.generation, 1);
    assert_eq!(s.primary_source, Some(SourceId::Ksa));
    assert_eq!(s.kp, vec![Some(2.0), Some(3.0), Some(3.0), Some(4.0)]);
    assert_eq!(s.timestamps.len(), 4);
    assert_eq!(s.kp_noaa.len(), 24);
    assert_eq!(s.hp30.len(), 2);
    assert_eq!(s.ap, vec![Some(9.0), Some(15.0), Some(22.0)]);
    assert_eq!(s.ap30_history, vec![5.0, 7.0, 9.0, 12.0, 18.0, 27.0]);

    assert_eq!(s.current.kp, Some(4.0));
    assert_eq!(s.current.ap, Some(22.0));
    assert_eq!(s.current.ap30, Some(27.0));
    assert_eq!(s.current.dst, Some(-35.0));
    assert!(s.current.field_magnitude.unwrap() > 23_000.0);
    assert_eq!(s.dst_class, Some(DstClass::Weak));

    assert!((1.0..=2.0).contains(&s.sama_factor));
    let risk = s.risk.as_ref().unwrap();
    assert_eq!(risk.score, 20);
    assert_eq!(risk.level, RiskLevel::Medium);
    let trend = s.trend.unwrap();
    assert_eq!(trend.direction, TrendDirection::Increasing);
    assert!(!trend.rapid_increase);
    assert!(s.prediction.as_ref().unwrap().predicted_kp.is_some());
    assert_eq!(s.updated_at, Some(noon()));

    let v = m.validation();
    assert!(v.values().all(|e| e.status.is_usable()), "{v:?}");
    assert_eq!(v[&SourceId::Ksa].confidence, 95);
    assert_eq!(v[&SourceId::Ksa].data_date, NaiveDate::from_ymd_opt(2024, 5, 10));
    assert_eq!(v[&SourceId::KpNoaa].data_points, 24);
    assert!(v[&SourceId::KpGfz].status_breakdown.is_some());
    assert!(v.values().all(|e| !e.from_cache));

    let summary = m.validation_summary();
    assert_eq!(summary.valid_sources, 8);
    assert_eq!(summary.reliability, Reliability::Reliable);

    let report = m.risk_report();
    assert_eq!(report.total_slots, 4);
    assert!(report.recommendation.is_some());
}

#[tokio::test]
async fn second_cycle_within_ttl_is_served_from_cache() {
    let t = Scripted::all_providers();
    let (m, clock) = build(t.clone());

    m.refresh().await.unwrap();
    let calls = t.calls();
    assert_eq!(calls, 8);

    clock.advance(Duration::minutes(10));
    let s = m.refresh().await.unwrap();
    assert_eq!(t.calls(), calls, "no network traffic inside the TTL");
    assert_eq!(s.generation, 2);
    assert!(m.validation().values().all(|e| e.from_cache));

    // past every TTL: everything is fetched again
    clock.advance(Duration::hours(2));
    m.refresh().await.unwrap();
    assert_eq!(t.calls(), calls * 2);
    assert!(m.validation().values().all(|e| !e.from_cache));
}

#[tokio::test]
async fn total_failure_keeps_previous_state() {
    let t = Scripted::all_providers();
    let (m, clock) = build(t.clone());

    let good = m.refresh().await.unwrap();

    t.set_failing(true);
    clock.advance(Duration::hours(2));
    let err = m.refresh().await.unwrap_err();
    assert_eq!(err, ReconcileError::NoData);
    assert_eq!(m.forecast(), good, "published state must not change");

    let v = m.validation();
    assert!(v.values().all(|e| e.status == ValidationStatus::Error), "{v:?}");
    assert!(v.values().all(|e| e.error_detail.is_some()));
    assert_eq!(m.validation_summary().reliability, Reliability::Limited);
}

#[tokio::test]
async fn dated_source_walks_back_to_previous_day() {
    let t = Scripted::new(vec![("/ksa/2024/2024-05-09.txt", KSA)]);
    let (m, _) = build(t);

    let s = m.refresh().await.unwrap();
    assert_eq!(s.primary_source, Some(SourceId::Ksa));
    let ksa = &m.validation()[&SourceId::Ksa];
    assert_eq!(ksa.status, ValidationStatus::Valid);
    assert_eq!(ksa.data_date, NaiveDate::from_ymd_opt(2024, 5, 9));

    // everything else had nothing to serve
    let failed = m
        .validation()
        .values()
        .filter(|e| e.status == ValidationStatus::Error)
        .count();
    assert_eq!(failed, 7);
}

#[tokio::test]
async fn retry_reloads_one_source() {
    let t = Scripted::all_providers();
    let (m, _) = build(t.clone());

    t.set_failing(true);
    assert!(m.refresh().await.is_err());
    assert!(!m.forecast().has_data());

    t.set_failing(false);
    let entry = m.retry_source(SourceId::KpGfz).await.unwrap();
    assert!(entry.status.is_usable());

    let s = m.forecast();
    assert_eq!(s.generation, 1);
    assert_eq!(s.primary_source, Some(SourceId::KpGfz));
    assert_eq!(s.kp, vec![Some(2.333), Some(3.0), Some(3.667)]);
    // untouched sources keep their failed entries
    assert_eq!(m.validation()[&SourceId::Ksa].status, ValidationStatus::Error);
}

#[tokio::test]
async fn malformed_dst_body_ends_terminal() {
    let t = Scripted::new(vec![
        ("/ksa/2024/2024-05-10.txt", KSA),
        ("dst2405.for.request", DST_BAD_DAY),
    ]);
    let (m, _) = build(t);

    let s = m.refresh().await.expect("regional K still reconciles");
    assert_eq!(s.primary_source, Some(SourceId::Ksa));
    assert_eq!(s.current.dst, None);

    let dst = &m.validation()[&SourceId::Dst];
    assert!(dst.status.is_terminal(), "{dst:?}");
    assert!(!dst.status.is_usable());
    assert!(dst.error_detail.is_some());
}

#[tokio::test]
async fn crashed_pipeline_is_recorded_as_error() {
    let t = Arc::new(PanicsOn {
        inner: Scripted::all_providers(),
        pattern: "dst2405",
    });
    let (m, _) = build(t);

    let s = m.refresh().await.expect("other sources still reconcile");
    assert_eq!(s.primary_source, Some(SourceId::Ksa));
    assert_eq!(s.current.dst, None);

    let v = m.validation();
    let dst = &v[&SourceId::Dst];
    assert_eq!(dst.status, ValidationStatus::Error);
    assert!(dst.error_detail.as_deref().unwrap().contains("pipeline aborted"));
    assert!(v.values().all(|e| e.status.is_terminal()));
    assert_eq!(
        v.values().filter(|e| e.status.is_usable()).count(),
        7,
        "{v:?}"
    );

    // the manual path contains the crash too
    let entry = m.retry_source(SourceId::Dst).await.expect("enabled source");
    assert_eq!(entry.status, ValidationStatus::Error);
    assert_eq!(m.validation()[&SourceId::Dst], entry);
}

#[tokio::test]
async fn retry_and_cycle_can_overlap() {
    let (m, _) = build(Scripted::all_providers());

    let (cycle, retry) = tokio::join!(m.refresh(), m.retry_source(SourceId::Ksa));
    assert!(cycle.is_ok());
    assert!(retry.unwrap().status.is_usable());

    let s = m.forecast();
    assert_eq!(s.primary_source, Some(SourceId::Ksa));
    assert!(s.generation >= 1);
}

#[tokio::test(start_paused = true)]
async fn scheduler_runs_first_cycle_immediately_and_stops() {
    let (m, _) = build(Scripted::all_providers());

    let handle = spawn_refresh_scheduler(m.clone(), StdDuration::from_secs(600));
    tokio::time::sleep(StdDuration::from_secs(1)).await;
    assert!(m.forecast().has_data());

    handle.cancel();
    assert!(handle.is_cancelled());
    handle.shutdown().await;

    let generation = m.forecast().generation;
    tokio::time::sleep(StdDuration::from_secs(1_800)).await;
    assert_eq!(m.forecast().generation, generation);
}
