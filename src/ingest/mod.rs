// src/ingest/mod.rs
//! Single-source acquisition: plan URL(s) → cache → fetch → parse → outcome.
//!
//! Every call ends in exactly one terminal [`ValidationEntry`]; errors never
//! leave this module. Dated sources walk back through earlier days until one
//! yields at least one value.

pub mod providers;
pub mod scheduler;
pub mod types;

use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Duration, DurationRound, NaiveDate, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;

use crate::cache::{CacheKey, IndexCache};
use crate::config::sources::{render_endpoint, EndpointParams};
use crate::config::{MonitorConfig, SourceConfig};
use crate::error::SourceError;
use crate::fetch::ResilientFetcher;
use crate::ingest::providers::{gfz, parser_for, ParseContext, RequestShape, SourceParser};
use crate::ingest::types::IndexSeries;
use crate::validation::ValidationEntry;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("geomag_fetch_attempts_total", "Fetch attempts per route.");
        describe_counter!("geomag_fetch_failures_total", "Failed fetch attempts per route and kind.");
        describe_counter!("geomag_fetch_exhausted_total", "URLs for which every route failed.");
        describe_counter!("geomag_cache_hits_total", "Fresh cache hits per index family.");
        describe_counter!("geomag_cache_misses_total", "Cache misses (absent or expired) per family.");
        describe_counter!("geomag_source_outcomes_total", "Terminal source outcomes by status.");
        describe_counter!("geomag_refresh_cycles_total", "Refresh cycles started.");
        describe_counter!(
            "geomag_refresh_failures_total",
            "Cycles in which no source produced data."
        );
        describe_histogram!("geomag_parse_ms", "Provider parse time in milliseconds.");
        describe_gauge!("geomag_sama_factor", "Dynamic SAMA amplification factor.");
        describe_gauge!(
            "geomag_last_refresh_ts",
            "Unix ts of the last successful reconciliation."
        );
    });
}

/// A resolved request for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRequest {
    pub url: String,
    pub key: CacheKey,
    pub date: Option<NaiveDate>,
}

/// Result of one source pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOutcome {
    /// `None` when the attempt failed; the source is then absent for reconciliation.
    pub series: Option<IndexSeries>,
    pub validation: ValidationEntry,
}

/// JSON-index request window `[end - history, end]`, with `end` floored to
/// the alignment grid so consecutive refreshes share a cache key.
pub fn aligned_range(
    now: DateTime<Utc>,
    history_hours: i64,
    align_minutes: i64,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = now
        .duration_trunc(Duration::minutes(align_minutes.max(1)))
        .unwrap_or(now);
    (end - Duration::hours(history_hours), end)
}

/// Status filter forwarded upstream; only `def` on status-bearing indices.
fn effective_status_filter<'a>(source: &'a SourceConfig, index: &str) -> Option<&'a str> {
    source
        .status_filter
        .as_deref()
        .filter(|f| *f == "def" && gfz::supports_status(index))
}

/// URLs to try for `source`, most recent first.
pub fn plan_requests(
    source: &SourceConfig,
    parser: &dyn SourceParser,
    cfg: &MonitorConfig,
    now: DateTime<Utc>,
) -> Vec<PlannedRequest> {
    let today = now.date_naive();
    match parser.shape() {
        RequestShape::Fixed => vec![PlannedRequest {
            url: source.endpoint.clone(),
            key: CacheKey::day(parser.family(), today),
            date: None,
        }],
        RequestShape::Dated => (0..=i64::from(source.day_fallback))
            .map(|back| today - Duration::days(back))
            .map(|date| PlannedRequest {
                url: render_endpoint(
                    &source.endpoint,
                    &EndpointParams {
                        date: Some(date),
                        ..Default::default()
                    },
                ),
                key: CacheKey::day(parser.family(), date),
                date: Some(date),
            })
            .collect(),
        RequestShape::Range { index } => {
            let (start, end) = aligned_range(now, cfg.history_hours, cfg.range_align_minutes);
            let status = effective_status_filter(source, index);
            vec![PlannedRequest {
                url: render_endpoint(
                    &source.endpoint,
                    &EndpointParams {
                        start: Some(start),
                        end: Some(end),
                        index: Some(index),
                        status,
                        ..Default::default()
                    },
                ),
                key: CacheKey::range(parser.family(), start, end, status),
                date: None,
            }]
        }
    }
}

/// Everything a pipeline run needs, borrowed from the monitor.
pub struct PipelineCtx<'a> {
    pub cfg: &'a MonitorConfig,
    pub fetcher: &'a ResilientFetcher,
    pub cache: &'a Mutex<IndexCache<IndexSeries>>,
    pub now: DateTime<Utc>,
}

fn success(
    parser: &dyn SourceParser,
    series: IndexSeries,
    req: &PlannedRequest,
    from_cache: bool,
    latency_ms: u64,
    now: DateTime<Utc>,
) -> SourceOutcome {
    let validation = ValidationEntry::success(
        parser.confidence(&series),
        series.value_count(),
        latency_ms,
        now,
    )
    .with_cache_flag(from_cache)
    .with_data_date(req.date)
    .with_breakdown(series.status_counts());
    SourceOutcome {
        series: Some(series),
        validation,
    }
}

/// Run the fetch-parse-validate pipeline for one source.
pub async fn acquire_source(source: &SourceConfig, ctx: &PipelineCtx<'_>) -> SourceOutcome {
    ensure_metrics_described();
    let t0 = Instant::now();
    let parser = parser_for(source.id);
    let timeout = source.timeout(ctx.cfg.runtime_env());
    let requests = plan_requests(source, parser.as_ref(), ctx.cfg, ctx.now);

    let mut last_err = SourceError::no_data(format!("{}: nothing requested", source.id));
    for req in &requests {
        let cached = ctx
            .cache
            .lock()
            .expect("cache mutex poisoned")
            .lookup(&req.key);
        if let Some(hit) = cached.filter(|h| h.payload.has_values()) {
            tracing::debug!(source = %source.id, key = %req.key, age_secs = hit.age.num_seconds(), "cache hit");
            let out = success(parser.as_ref(), hit.payload, req, true, elapsed_ms(t0), ctx.now);
            return finish(source, out);
        }

        let fetched = match ctx.fetcher.acquire(&req.url, timeout).await {
            Ok(f) => f,
            Err(e) => {
                tracing::debug!(source = %source.id, url = %req.url, error = %e, "fetch failed");
                last_err = e.into();
                continue;
            }
        };

        let pctx = match req.date {
            Some(d) => ParseContext::for_date(ctx.now, d),
            None => ParseContext::at(ctx.now),
        };
        match parser.parse(&fetched.body, &pctx) {
            Ok(series) if series.has_values() => {
                ctx.cache
                    .lock()
                    .expect("cache mutex poisoned")
                    .store(req.key.clone(), series.clone());
                tracing::info!(
                    source = %source.id,
                    route = %fetched.route,
                    points = series.value_count(),
                    latency_ms = elapsed_ms(t0),
                    "source loaded"
                );
                let out = success(parser.as_ref(), series, req, false, elapsed_ms(t0), ctx.now);
                return finish(source, out);
            }
            Ok(_) => {
                last_err = SourceError::no_data(format!("{} returned no values", req.url));
            }
            Err(e) => {
                tracing::debug!(source = %source.id, error = %e, "parse failed");
                last_err = e;
            }
        }
    }

    let validation = ValidationEntry::failure(&last_err, elapsed_ms(t0), ctx.now);
    tracing::warn!(source = %source.id, status = validation.status.as_str(), error = %last_err, "source failed");
    finish(
        source,
        SourceOutcome {
            series: None,
            validation,
        },
    )
}

fn finish(source: &SourceConfig, out: SourceOutcome) -> SourceOutcome {
    counter!(
        "geomag_source_outcomes_total",
        "source" => source.id.as_str(),
        "status" => out.validation.status.as_str()
    )
    .increment(1);
    gauge!("geomag_source_confidence", "source" => source.id.as_str())
        .set(f64::from(out.validation.confidence));
    out
}

fn elapsed_ms(t0: Instant) -> u64 {
    t0.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::SourceId;
    use chrono::TimeZone;

    fn cfg() -> MonitorConfig {
        MonitorConfig::default()
    }

    #[test]
    fn range_is_aligned_to_grid() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 47, 13).unwrap();
        let (s, e) = aligned_range(now, 72, 30);
        assert_eq!(e, Utc.with_ymd_and_hms(2024, 5, 10, 12, 30, 0).unwrap());
        assert_eq!(s, Utc.with_ymd_and_hms(2024, 5, 7, 12, 30, 0).unwrap());
    }

    #[test]
    fn dated_sources_walk_back_most_recent_first() {
        let c = cfg();
        let ksa = c.source(SourceId::Ksa).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
        let plan = plan_requests(ksa, parser_for(SourceId::Ksa).as_ref(), &c, now);
        let dates: Vec<_> = plan.iter().map(|p| p.date.unwrap().to_string()).collect();
        assert_eq!(dates, vec!["2024-03-01", "2024-02-29", "2024-02-28", "2024-02-27"]);
        assert!(plan[1].url.ends_with("/2024/2024-02-29.txt"));
    }

    #[test]
    fn status_filter_only_for_status_indices() {
        let mut c = cfg();
        for s in c.sources.iter_mut() {
            s.status_filter = Some("def".into());
        }
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let kp = c.source(SourceId::KpGfz).unwrap();
        let plan = plan_requests(kp, parser_for(SourceId::KpGfz).as_ref(), &c, now);
        assert!(plan[0].url.contains("index=Kp&status=def"));
        assert!(plan[0].key.as_str().ends_with("_def"));

        let hp = c.source(SourceId::Hp30).unwrap();
        let plan = plan_requests(hp, parser_for(SourceId::Hp30).as_ref(), &c, now);
        assert!(plan[0].url.ends_with("index=Hp30"));
        assert!(plan[0].key.as_str().ends_with("_all"));
    }

    #[test]
    fn monthly_dst_url() {
        let c = cfg();
        let dst = c.source(SourceId::Dst).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let plan = plan_requests(dst, parser_for(SourceId::Dst).as_ref(), &c, now);
        assert_eq!(plan.len(), 1);
        assert!(plan[0].url.ends_with("dst2405.for.request"));
    }
}
