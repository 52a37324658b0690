// src/ingest/types.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of one upstream provider feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceId {
    Ksa,
    KpNoaa,
    Hp30,
    KpGfz,
    ApGfz,
    Ap30,
    Dst,
    IntermagnetPil,
}

impl SourceId {
    pub const ALL: [SourceId; 8] = [
        SourceId::Ksa,
        SourceId::KpNoaa,
        SourceId::Hp30,
        SourceId::KpGfz,
        SourceId::ApGfz,
        SourceId::Ap30,
        SourceId::Dst,
        SourceId::IntermagnetPil,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Ksa => "ksa",
            SourceId::KpNoaa => "kpNoaa",
            SourceId::Hp30 => "hp30",
            SourceId::KpGfz => "kpGfz",
            SourceId::ApGfz => "apGfz",
            SourceId::Ap30 => "ap30",
            SourceId::Dst => "dst",
            SourceId::IntermagnetPil => "intermagnetPil",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown source id: {s}"))
    }
}

/// Publication status of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleStatus {
    Definitive,
    Provisional,
    Nowcast,
    Unknown,
}

impl SampleStatus {
    /// Tolerant mapping of upstream status tags ("def", "prov", "nowcast", ...).
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "def" | "definitive" => SampleStatus::Definitive,
            "prov" | "provisional" => SampleStatus::Provisional,
            "nowcast" => SampleStatus::Nowcast,
            _ => SampleStatus::Unknown,
        }
    }

    /// Weight used by the quality score.
    pub fn quality_weight(&self) -> f64 {
        match self {
            SampleStatus::Definitive => 1.0,
            SampleStatus::Provisional => 0.7,
            SampleStatus::Nowcast => 0.5,
            SampleStatus::Unknown => 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SampleStatus>,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: Option<f64>) -> Self {
        Self {
            timestamp,
            value,
            status: None,
        }
    }

    pub fn with_status(mut self, status: SampleStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Normalized output of one parse: samples ordered by timestamp.
///
/// Immutable once built. When `has_status` is set every sample carries a
/// status (missing tags become `Unknown`), so the status sequence always has
/// the same length as the value sequence.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexSeries {
    samples: Vec<Sample>,
    has_status: bool,
}

impl IndexSeries {
    pub fn new(mut samples: Vec<Sample>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        let has_status = samples.iter().any(|s| s.status.is_some());
        if has_status {
            for s in samples.iter_mut() {
                s.status.get_or_insert(SampleStatus::Unknown);
            }
        }
        Self {
            samples,
            has_status,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn has_status(&self) -> bool {
        self.has_status
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.samples.iter().map(|s| s.timestamp).collect()
    }

    pub fn values(&self) -> Vec<Option<f64>> {
        self.samples.iter().map(|s| s.value).collect()
    }

    pub fn statuses(&self) -> Option<Vec<SampleStatus>> {
        if !self.has_status {
            return None;
        }
        Some(
            self.samples
                .iter()
                .map(|s| s.status.unwrap_or(SampleStatus::Unknown))
                .collect(),
        )
    }

    /// Number of samples that carry a value.
    pub fn value_count(&self) -> usize {
        self.samples.iter().filter(|s| s.value.is_some()).count()
    }

    pub fn has_values(&self) -> bool {
        self.samples.iter().any(|s| s.value.is_some())
    }

    pub fn first_value(&self) -> Option<f64> {
        self.samples.iter().find_map(|s| s.value)
    }

    pub fn latest_value(&self) -> Option<f64> {
        self.samples.iter().rev().find_map(|s| s.value)
    }

    pub fn status_counts(&self) -> Option<StatusCounts> {
        self.statuses().map(|st| StatusCounts::tally(&st))
    }
}

/// Per-status tally used for the quality score and the validation breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub definitive: usize,
    pub provisional: usize,
    pub nowcast: usize,
    pub unknown: usize,
}

impl StatusCounts {
    pub fn tally(statuses: &[SampleStatus]) -> Self {
        let mut c = StatusCounts::default();
        for s in statuses {
            match s {
                SampleStatus::Definitive => c.definitive += 1,
                SampleStatus::Provisional => c.provisional += 1,
                SampleStatus::Nowcast => c.nowcast += 1,
                SampleStatus::Unknown => c.unknown += 1,
            }
        }
        c
    }

    pub fn total(&self) -> usize {
        self.definitive + self.provisional + self.nowcast + self.unknown
    }

    /// Weighted share of the status categories over `total` samples, in 0–100.
    /// An empty series scores 90.
    pub fn quality(&self, total: usize) -> u8 {
        if total == 0 {
            return 90;
        }
        let n = total as f64;
        let score = [
            (self.definitive, SampleStatus::Definitive),
            (self.provisional, SampleStatus::Provisional),
            (self.nowcast, SampleStatus::Nowcast),
            (self.unknown, SampleStatus::Unknown),
        ]
        .iter()
        .map(|(count, st)| (*count as f64 / n) * st.quality_weight() * 100.0)
        .sum::<f64>();
        score.round().clamp(0.0, 100.0) as u8
    }
}
