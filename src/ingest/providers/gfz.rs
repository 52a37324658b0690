// src/ingest/providers/gfz.rs
use std::collections::HashMap;

use metrics::histogram;
use serde::Deserialize;

use super::{in_ap_range, in_kp_range, parse_utc, ParseContext, RequestShape, SourceParser};
use crate::error::SourceError;
use crate::ingest::types::{IndexSeries, Sample, SampleStatus};

/// Indices the JSON service publishes with a per-sample status array.
pub const INDICES_WITH_STATUS: [&str; 6] = ["Kp", "ap", "Ap", "Cp", "C9", "SN"];
pub const INDICES_WITHOUT_STATUS: [&str; 6] = ["Hp30", "Hp60", "ap30", "ap60", "Fobs", "Fadj"];

/// Default confidence when a status-bearing payload has no status array.
const DEFAULT_QUALITY: u8 = 85;

/// Parallel-array payload: `datetime[]`, `<index>[]`, optional `status[]`.
/// Missing arrays are read as empty.
#[derive(Debug, Deserialize)]
struct GfzPayload {
    #[serde(default)]
    datetime: Vec<String>,
    #[serde(default)]
    status: Option<Vec<String>>,
    #[serde(flatten)]
    rest: HashMap<String, serde_json::Value>,
}

pub fn supports_status(index: &str) -> bool {
    INDICES_WITH_STATUS.contains(&index)
}

pub struct GfzIndexParser {
    index: &'static str,
    /// Fixed confidence for indices without status; `None` derives it from quality.
    fixed_confidence: Option<u8>,
}

impl GfzIndexParser {
    pub fn new(index: &'static str, fixed_confidence: Option<u8>) -> Self {
        Self {
            index,
            fixed_confidence,
        }
    }

    pub fn index(&self) -> &'static str {
        self.index
    }

    fn accept(&self, v: f64) -> bool {
        if self.index.starts_with("ap") || self.index == "Ap" {
            in_ap_range(v)
        } else if self.index.starts_with("Kp") || self.index.starts_with("Hp") {
            in_kp_range(v)
        } else {
            v.is_finite()
        }
    }
}

impl SourceParser for GfzIndexParser {
    fn family(&self) -> &'static str {
        self.index
    }

    fn shape(&self) -> RequestShape {
        RequestShape::Range { index: self.index }
    }

    fn parse(&self, body: &str, _ctx: &ParseContext) -> Result<IndexSeries, SourceError> {
        let t0 = std::time::Instant::now();
        let payload: GfzPayload = serde_json::from_str(body)
            .map_err(|e| SourceError::format(format!("{} payload: {e}", self.index)))?;

        let values: Vec<Option<f64>> = match payload.rest.get(self.index) {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
                SourceError::format(format!("{} array is not numeric: {e}", self.index))
            })?,
        };
        let statuses = payload.status.unwrap_or_default();
        let with_status = supports_status(self.index) && !statuses.is_empty();

        let mut samples = Vec::with_capacity(payload.datetime.len());
        for (i, raw_ts) in payload.datetime.iter().enumerate() {
            let Some(ts) = parse_utc(raw_ts) else {
                tracing::debug!(index = self.index, raw = %raw_ts, "skipping unparseable datetime");
                continue;
            };
            let value = values.get(i).copied().flatten().filter(|v| self.accept(*v));
            let mut sample = Sample::new(ts, value);
            if with_status {
                let st = statuses
                    .get(i)
                    .map(|s| SampleStatus::from_tag(s))
                    .unwrap_or(SampleStatus::Unknown);
                sample = sample.with_status(st);
            }
            samples.push(sample);
        }

        histogram!("geomag_parse_ms", "family" => self.index).record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(IndexSeries::new(samples))
    }

    fn confidence(&self, series: &IndexSeries) -> u8 {
        if let Some(c) = self.fixed_confidence {
            return c;
        }
        series
            .status_counts()
            .map(|c| c.quality(series.len()))
            .unwrap_or(DEFAULT_QUALITY)
    }
}
