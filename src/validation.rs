//! Per-source outcome bookkeeping.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::ingest::types::{SourceId, StatusCounts};

/// Quality below this downgrades an otherwise valid fetch to `warning`.
pub const QUALITY_THRESHOLD: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationStatus {
    #[default]
    Pending,
    Loading,
    Valid,
    Warning,
    Error,
    Timeout,
    NoData,
}

impl ValidationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ValidationStatus::Pending | ValidationStatus::Loading)
    }

    /// Usable data was obtained.
    pub fn is_usable(&self) -> bool {
        matches!(self, ValidationStatus::Valid | ValidationStatus::Warning)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Pending => "pending",
            ValidationStatus::Loading => "loading",
            ValidationStatus::Valid => "valid",
            ValidationStatus::Warning => "warning",
            ValidationStatus::Error => "error",
            ValidationStatus::Timeout => "timeout",
            ValidationStatus::NoData => "no-data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationEntry {
    pub status: ValidationStatus,
    pub confidence: u8,
    pub latency_ms: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub data_points: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub from_cache: bool,
    /// Day the data came from, for sources that fall back to earlier days.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_breakdown: Option<StatusCounts>,
}

impl ValidationEntry {
    pub fn pending() -> Self {
        Self::default()
    }

    /// Successful parse; `warning` when the confidence is below [`QUALITY_THRESHOLD`].
    pub fn success(confidence: u8, data_points: usize, latency_ms: u64, at: DateTime<Utc>) -> Self {
        let status = if confidence < QUALITY_THRESHOLD {
            ValidationStatus::Warning
        } else {
            ValidationStatus::Valid
        };
        Self {
            status,
            confidence: confidence.min(100),
            latency_ms,
            last_update: Some(at),
            data_points,
            ..Self::default()
        }
    }

    pub fn failure(err: &SourceError, latency_ms: u64, at: DateTime<Utc>) -> Self {
        let status = match err {
            SourceError::Transport(e) if e.is_timeout() => ValidationStatus::Timeout,
            SourceError::NoData(_) => ValidationStatus::NoData,
            _ => ValidationStatus::Error,
        };
        Self {
            status,
            confidence: 0,
            latency_ms,
            last_update: Some(at),
            data_points: 0,
            error_detail: Some(err.to_string()),
            ..Self::default()
        }
    }

    pub fn with_cache_flag(mut self, from_cache: bool) -> Self {
        self.from_cache = from_cache;
        self
    }

    pub fn with_data_date(mut self, date: Option<NaiveDate>) -> Self {
        self.data_date = date;
        self
    }

    pub fn with_breakdown(mut self, counts: Option<StatusCounts>) -> Self {
        self.status_breakdown = counts;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reliability {
    Reliable,
    Partial,
    Limited,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub valid_sources: usize,
    pub total_sources: usize,
    pub reliability: Reliability,
}

/// Latest outcome per source. Every source starts `pending`.
#[derive(Debug, Clone, Default)]
pub struct ValidationTracker {
    entries: BTreeMap<SourceId, ValidationEntry>,
}

impl ValidationTracker {
    pub fn new<I: IntoIterator<Item = SourceId>>(ids: I) -> Self {
        Self {
            entries: ids
                .into_iter()
                .map(|id| (id, ValidationEntry::pending()))
                .collect(),
        }
    }

    /// Mark an attempt as in flight.
    pub fn begin(&mut self, id: SourceId) {
        let e = self.entries.entry(id).or_default();
        e.status = ValidationStatus::Loading;
    }

    /// Store the outcome of an attempt. A `pending` entry is never accepted
    /// once the source has completed a fetch.
    pub fn record(&mut self, id: SourceId, entry: ValidationEntry) {
        let current = self.entries.entry(id).or_default();
        if entry.status == ValidationStatus::Pending && current.last_update.is_some() {
            tracing::debug!(source = %id, "ignoring rollback to pending");
            return;
        }
        *current = entry;
    }

    pub fn get(&self, id: SourceId) -> ValidationEntry {
        self.entries.get(&id).cloned().unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<SourceId, ValidationEntry> {
        self.entries.clone()
    }

    pub fn summary(&self) -> ValidationSummary {
        let total_sources = self.entries.len();
        let valid_sources = self
            .entries
            .values()
            .filter(|e| e.status.is_usable())
            .count();
        let pct = if total_sources == 0 {
            0.0
        } else {
            valid_sources as f64 / total_sources as f64 * 100.0
        };
        let reliability = if pct >= 75.0 {
            Reliability::Reliable
        } else if pct >= 50.0 {
            Reliability::Partial
        } else {
            Reliability::Limited
        };
        ValidationSummary {
            valid_sources,
            total_sources,
            reliability,
        }
    }
}
