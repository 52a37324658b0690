//! # Reconciler
//!
//! Merges the latest series of every source into one display view. The
//! primary Kp-equivalent series is chosen by whole-series substitution: the
//! highest-priority Kp-scale source with at least one value becomes the
//! baseline as-is; nothing is interleaved across providers.
//!
//! The function is pure. Given the same records it returns the same value,
//! and when no source has data it returns an error so the caller keeps the
//! previously published state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MonitorConfig;
use crate::error::ReconcileError;
use crate::ingest::types::{IndexSeries, SourceId};
use crate::validation::ValidationEntry;

/// One provider's contribution to a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub id: SourceId,
    /// Lower is preferred.
    pub priority: u8,
    pub series: Option<IndexSeries>,
    pub validation: ValidationEntry,
}

impl SourceRecord {
    pub fn new(id: SourceId, priority: u8) -> Self {
        Self {
            id,
            priority,
            series: None,
            validation: ValidationEntry::pending(),
        }
    }

    /// The series, if it carries at least one value.
    pub fn usable(&self) -> Option<&IndexSeries> {
        self.series.as_ref().filter(|s| s.has_values())
    }
}

/// Grid parameters for the display view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub slots: usize,
    /// High-cadence samples folded into one slot.
    pub block_size: usize,
    pub ap30_history_len: usize,
}

impl Grid {
    pub fn from_config(cfg: &MonitorConfig) -> Self {
        Self {
            slots: cfg.display_slots.max(1),
            block_size: cfg.block_size.max(1),
            ap30_history_len: cfg.ap30_history_len,
        }
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

/// Latest scalar value per index, used by the analyzer and the flight gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentIndices {
    pub kp: Option<f64>,
    pub ap: Option<f64>,
    pub hp30: Option<f64>,
    pub ap30: Option<f64>,
    pub dst: Option<f64>,
    /// Observatory total field, nT.
    pub field_magnitude: Option<f64>,
}

/// Complete replacement for the series part of the published state.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub primary_source: SourceId,
    pub timestamps: Vec<DateTime<Utc>>,
    pub kp: Vec<Option<f64>>,
    pub kp_noaa: Vec<Option<f64>>,
    pub hp30: Vec<Option<f64>>,
    pub ap: Vec<Option<f64>>,
    pub ap30: Vec<Option<f64>>,
    pub ap30_history: Vec<f64>,
    pub current: CurrentIndices,
}

/// Kp-scale sources eligible as the primary baseline, most preferred first
/// when priorities tie.
const PRIMARY_CANDIDATES: [SourceId; 4] = [
    SourceId::Ksa,
    SourceId::KpNoaa,
    SourceId::Hp30,
    SourceId::KpGfz,
];

/// Non-overlapping block means. A block's value is the mean of its present
/// samples; a trailing short block is kept.
pub fn block_average(values: &[Option<f64>], block: usize) -> Vec<Option<f64>> {
    values
        .chunks(block.max(1))
        .map(|chunk| {
            let present: Vec<f64> = chunk.iter().flatten().copied().collect();
            if present.is_empty() {
                None
            } else {
                Some(present.iter().sum::<f64>() / present.len() as f64)
            }
        })
        .collect()
}

/// Stretch to `target` samples by repeating the nearest preceding sample
/// (`out[i] = src[floor(i * len / target)]`). Longer input is truncated.
pub fn stretch_nearest_preceding<T: Clone>(src: &[T], target: usize) -> Vec<T> {
    if src.is_empty() || src.len() >= target {
        return src.iter().take(target).cloned().collect();
    }
    (0..target)
        .map(|i| src[i * src.len() / target].clone())
        .collect()
}

fn block_timestamps(ts: &[DateTime<Utc>], block: usize) -> Vec<DateTime<Utc>> {
    ts.chunks(block.max(1)).map(|c| c[0]).collect()
}

fn take<T: Clone>(v: &[T], n: usize) -> Vec<T> {
    v.iter().take(n).cloned().collect()
}

/// Primary baseline of one candidate shaped for the display grid.
fn shape_primary(id: SourceId, s: &IndexSeries, grid: Grid) -> (Vec<DateTime<Utc>>, Vec<Option<f64>>) {
    let (ts, vals) = (s.timestamps(), s.values());
    match id {
        SourceId::Hp30 => {
            let v = block_average(&vals, grid.block_size);
            let t = block_timestamps(&ts, grid.block_size);
            (take(&t, grid.slots), take(&v, grid.slots))
        }
        SourceId::KpNoaa => (
            stretch_nearest_preceding(&ts, grid.slots),
            stretch_nearest_preceding(&vals, grid.slots),
        ),
        _ => (take(&ts, grid.slots), take(&vals, grid.slots)),
    }
}

fn record<'a>(records: &'a [SourceRecord], id: SourceId) -> Option<&'a SourceRecord> {
    records.iter().find(|r| r.id == id)
}

fn series<'a>(records: &'a [SourceRecord], id: SourceId) -> Option<&'a IndexSeries> {
    record(records, id).and_then(SourceRecord::usable)
}

/// Current Kp: latest regional K, else the first forecast period, else the
/// latest Hp30, else the latest GFZ Kp.
fn current_kp(records: &[SourceRecord]) -> Option<f64> {
    series(records, SourceId::Ksa)
        .and_then(IndexSeries::latest_value)
        .or_else(|| series(records, SourceId::KpNoaa).and_then(IndexSeries::first_value))
        .or_else(|| series(records, SourceId::Hp30).and_then(IndexSeries::latest_value))
        .or_else(|| series(records, SourceId::KpGfz).and_then(IndexSeries::latest_value))
}

pub fn reconcile(records: &[SourceRecord], grid: Grid) -> Result<Reconciled, ReconcileError> {
    if !records.iter().any(|r| r.usable().is_some()) {
        return Err(ReconcileError::NoData);
    }

    let mut candidates: Vec<&SourceRecord> = records
        .iter()
        .filter(|r| PRIMARY_CANDIDATES.contains(&r.id))
        .collect();
    candidates.sort_by_key(|r| {
        let rank = PRIMARY_CANDIDATES.iter().position(|c| *c == r.id);
        (r.priority, rank)
    });

    let primary = candidates
        .iter()
        .find_map(|r| r.usable().map(|s| (r.id, s)));

    // Only non-Kp sources have data: the state still gets their series, but
    // the primary axis is taken from whichever of them has timestamps.
    let (primary_source, timestamps, kp) = match primary {
        Some((id, s)) => {
            let (t, v) = shape_primary(id, s, grid);
            (id, t, v)
        }
        None => {
            let r = records
                .iter()
                .filter(|r| r.usable().is_some())
                .min_by_key(|r| r.priority)
                .ok_or(ReconcileError::NoData)?;
            let ts = r.usable().map(|s| take(&s.timestamps(), grid.slots)).unwrap_or_default();
            let empty = vec![None; ts.len()];
            (r.id, ts, empty)
        }
    };

    let values = |id| series(records, id).map(IndexSeries::values).unwrap_or_default();

    let hp30 = take(&block_average(&values(SourceId::Hp30), grid.block_size), grid.slots);
    let ap30_raw = values(SourceId::Ap30);
    let ap30 = take(&block_average(&ap30_raw, grid.block_size), grid.slots);
    let ap30_present: Vec<f64> = ap30_raw.iter().flatten().copied().collect();
    let ap30_history = ap30_present
        .iter()
        .skip(ap30_present.len().saturating_sub(grid.ap30_history_len))
        .copied()
        .collect();

    let latest = |id| series(records, id).and_then(IndexSeries::latest_value);
    let current = CurrentIndices {
        kp: current_kp(records),
        ap: latest(SourceId::ApGfz),
        hp30: latest(SourceId::Hp30),
        ap30: latest(SourceId::Ap30),
        dst: latest(SourceId::Dst),
        field_magnitude: latest(SourceId::IntermagnetPil),
    };

    Ok(Reconciled {
        primary_source,
        timestamps,
        kp,
        kp_noaa: stretch_nearest_preceding(&values(SourceId::KpNoaa), grid.slots),
        hp30,
        ap: take(&values(SourceId::ApGfz), grid.slots),
        ap30,
        ap30_history,
        current,
    })
}
