// src/ingest/providers/ksa.rs
//! Daily regional K index (EMBRACE), one text file per calendar day.
//! Lines look like `2024-05-10T03:00 3+`; the sign suffix is dropped.

use metrics::histogram;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{in_kp_range, parse_utc, ParseContext, RequestShape, SourceParser};
use crate::error::SourceError;
use crate::ingest::types::{IndexSeries, Sample};

static RE_DATE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("date prefix regex"));

pub struct KsaParser;

impl SourceParser for KsaParser {
    fn family(&self) -> &'static str {
        "ksa"
    }

    fn shape(&self) -> RequestShape {
        RequestShape::Dated
    }

    fn parse(&self, body: &str, _ctx: &ParseContext) -> Result<IndexSeries, SourceError> {
        let t0 = std::time::Instant::now();
        let mut samples = Vec::new();

        for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 2 || !RE_DATE_PREFIX.is_match(parts[0]) {
                continue;
            }
            let Some(ts) = parse_utc(parts[0]) else {
                tracing::debug!(source = "ksa", line, "unparseable timestamp");
                continue;
            };
            let cleaned: String = parts[1].chars().filter(|c| *c != '+' && *c != '-').collect();
            match cleaned.parse::<f64>() {
                Ok(v) if in_kp_range(v) => samples.push(Sample::new(ts, Some(v))),
                _ => tracing::debug!(source = "ksa", line, "invalid K value"),
            }
        }

        histogram!("geomag_parse_ms", "family" => "ksa").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(IndexSeries::new(samples))
    }

    fn confidence(&self, _series: &IndexSeries) -> u8 {
        95
    }
}
