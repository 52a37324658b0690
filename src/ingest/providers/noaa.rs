// src/ingest/providers/noaa.rs
//! 3-day fixed-width Kp forecast (NOAA/SWPC text product).

use chrono::{Duration, NaiveDate};
use metrics::histogram;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{in_kp_range, ParseContext, RequestShape, SourceParser};
use crate::error::SourceError;
use crate::ingest::types::{IndexSeries, Sample};

const FIRST_PERIOD: &str = "00-03UT";
const PERIODS_PER_DAY: usize = 8;
const FORECAST_DAYS: usize = 3;
/// Full grid size the confidence is scaled against.
const FULL_GRID: usize = 24;

static RE_PERIOD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2})-(\d{2})UT").expect("period regex"));
static RE_ISSUED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r":Issued:\s+(\d{4})\s+([A-Za-z]{3})\s+(\d{1,2})").expect("issued regex")
});

pub struct NoaaForecastParser;

fn issue_date(body: &str) -> Option<NaiveDate> {
    let c = RE_ISSUED.captures(body)?;
    NaiveDate::parse_from_str(&format!("{} {} {}", &c[1], &c[2], &c[3]), "%Y %b %d").ok()
}

impl SourceParser for NoaaForecastParser {
    fn family(&self) -> &'static str {
        "kpNoaa"
    }

    fn shape(&self) -> RequestShape {
        RequestShape::Fixed
    }

    fn parse(&self, body: &str, ctx: &ParseContext) -> Result<IndexSeries, SourceError> {
        let t0 = std::time::Instant::now();
        let lines: Vec<&str> = body.lines().collect();

        let start = lines
            .iter()
            .position(|l| RE_PERIOD.is_match(l) && l.contains(FIRST_PERIOD))
            .or_else(|| {
                let i = lines.iter().position(|l| RE_PERIOD.is_match(l))?;
                tracing::warn!(source = "kpNoaa", "00-03UT marker missing, using first period line");
                Some(i)
            })
            .ok_or_else(|| SourceError::format("no forecast period block found"))?;

        let day0 = issue_date(body)
            .unwrap_or_else(|| ctx.now.date_naive())
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc();

        let mut samples = Vec::with_capacity(FULL_GRID);
        for line in lines.iter().skip(start).take(PERIODS_PER_DAY) {
            let Some(m) = RE_PERIOD.captures(line) else {
                continue;
            };
            let Ok(hour) = m[1].parse::<i64>() else {
                continue;
            };
            let label_end = m.get(0).map(|g| g.end()).unwrap_or(0);
            let cells = line[label_end..]
                .split_whitespace()
                .filter(|tok| !tok.starts_with('('));

            for (day, tok) in cells.take(FORECAST_DAYS).enumerate() {
                let Ok(v) = tok.parse::<f64>() else {
                    continue;
                };
                if !in_kp_range(v) {
                    continue;
                }
                let ts = day0 + Duration::days(day as i64) + Duration::hours(hour);
                samples.push(Sample::new(ts, Some(v)));
            }
        }

        histogram!("geomag_parse_ms", "family" => "kpNoaa").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(IndexSeries::new(samples))
    }

    fn confidence(&self, series: &IndexSeries) -> u8 {
        let n = series.value_count().min(FULL_GRID) as f64;
        (n / FULL_GRID as f64 * 85.0).min(85.0).round() as u8
    }
}
