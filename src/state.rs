//! Published forecast state and its single write path.
//!
//! Readers get cloned snapshots. Writers build a [`ForecastUpdate`] (every
//! field optional) and hand it to [`StateStore::apply`], which applies all
//! present fields under one write lock, so a reader never sees a half
//! applied cycle.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analyze::{DstClass, FlightStatus, Prediction, RiskAssessment, Trend};
use crate::ingest::types::SourceId;
use crate::reconcile::{CurrentIndices, Reconciled};

/// Base factor shown before the first successful cycle.
const INITIAL_FACTOR: f64 = 1.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastState {
    pub timestamps: Vec<DateTime<Utc>>,
    /// Reconciled primary Kp-equivalent series.
    pub kp: Vec<Option<f64>>,
    pub primary_source: Option<SourceId>,
    pub kp_noaa: Vec<Option<f64>>,
    pub hp30: Vec<Option<f64>>,
    pub ap: Vec<Option<f64>>,
    pub ap30: Vec<Option<f64>>,
    pub ap30_history: Vec<f64>,
    pub current: CurrentIndices,
    pub sama_factor: f64,
    pub risk: Option<RiskAssessment>,
    pub trend: Option<Trend>,
    pub prediction: Option<Prediction>,
    pub storm_probability: f64,
    pub flight_status: Option<FlightStatus>,
    pub dst_class: Option<DstClass>,
    pub optimal_window_slots: usize,
    pub updated_at: Option<DateTime<Utc>>,
    /// Successful reconciliations so far.
    pub generation: u64,
}

impl Default for ForecastState {
    fn default() -> Self {
        Self {
            timestamps: Vec::new(),
            kp: Vec::new(),
            primary_source: None,
            kp_noaa: Vec::new(),
            hp30: Vec::new(),
            ap: Vec::new(),
            ap30: Vec::new(),
            ap30_history: Vec::new(),
            current: CurrentIndices::default(),
            sama_factor: INITIAL_FACTOR,
            risk: None,
            trend: None,
            prediction: None,
            storm_probability: 0.0,
            flight_status: None,
            dst_class: None,
            optimal_window_slots: 0,
            updated_at: None,
            generation: 0,
        }
    }
}

impl ForecastState {
    pub fn has_data(&self) -> bool {
        self.generation > 0
    }
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastUpdate {
    pub timestamps: Option<Vec<DateTime<Utc>>>,
    pub kp: Option<Vec<Option<f64>>>,
    pub primary_source: Option<SourceId>,
    pub kp_noaa: Option<Vec<Option<f64>>>,
    pub hp30: Option<Vec<Option<f64>>>,
    pub ap: Option<Vec<Option<f64>>>,
    pub ap30: Option<Vec<Option<f64>>>,
    pub ap30_history: Option<Vec<f64>>,
    pub current: Option<CurrentIndices>,
    pub sama_factor: Option<f64>,
    pub risk: Option<RiskAssessment>,
    pub trend: Option<Trend>,
    pub prediction: Option<Prediction>,
    pub storm_probability: Option<f64>,
    pub flight_status: Option<FlightStatus>,
    /// `Some(None)` clears a stale class when Dst is unavailable.
    pub dst_class: Option<Option<DstClass>>,
    pub optimal_window_slots: Option<usize>,
    pub updated_at: Option<DateTime<Utc>>,
    pub bump_generation: bool,
}

impl ForecastUpdate {
    pub fn is_empty(&self) -> bool {
        *self == ForecastUpdate::default()
    }
}

impl From<Reconciled> for ForecastUpdate {
    fn from(r: Reconciled) -> Self {
        Self {
            timestamps: Some(r.timestamps),
            kp: Some(r.kp),
            primary_source: Some(r.primary_source),
            kp_noaa: Some(r.kp_noaa),
            hp30: Some(r.hp30),
            ap: Some(r.ap),
            ap30: Some(r.ap30),
            ap30_history: Some(r.ap30_history),
            current: Some(r.current),
            bump_generation: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct StateStore {
    inner: RwLock<ForecastState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ForecastState {
        self.inner.read().expect("state lock poisoned").clone()
    }

    /// Apply every present field of `u` atomically and return the new state.
    pub fn apply(&self, u: ForecastUpdate) -> ForecastState {
        let mut s = self.inner.write().expect("state lock poisoned");
        if let Some(v) = u.timestamps {
            s.timestamps = v;
        }
        if let Some(v) = u.kp {
            s.kp = v;
        }
        if let Some(v) = u.primary_source {
            s.primary_source = Some(v);
        }
        if let Some(v) = u.kp_noaa {
            s.kp_noaa = v;
        }
        if let Some(v) = u.hp30 {
            s.hp30 = v;
        }
        if let Some(v) = u.ap {
            s.ap = v;
        }
        if let Some(v) = u.ap30 {
            s.ap30 = v;
        }
        if let Some(v) = u.ap30_history {
            s.ap30_history = v;
        }
        if let Some(v) = u.current {
            s.current = v;
        }
        if let Some(v) = u.sama_factor {
            s.sama_factor = v;
        }
        if let Some(v) = u.risk {
            s.risk = Some(v);
        }
        if let Some(v) = u.trend {
            s.trend = Some(v);
        }
        if let Some(v) = u.prediction {
            s.prediction = Some(v);
        }
        if let Some(v) = u.storm_probability {
            s.storm_probability = v;
        }
        if let Some(v) = u.flight_status {
            s.flight_status = Some(v);
        }
        if let Some(v) = u.dst_class {
            s.dst_class = v;
        }
        if let Some(v) = u.optimal_window_slots {
            s.optimal_window_slots = v;
        }
        if let Some(v) = u.updated_at {
            s.updated_at = Some(v);
        }
        if u.bump_generation {
            s.generation += 1;
        }
        s.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_update_changes_nothing() {
        let store = StateStore::new();
        let before = store.snapshot();
        assert!(ForecastUpdate::default().is_empty());
        assert_eq!(store.apply(ForecastUpdate::default()), before);
        assert!(!before.has_data());
        assert_eq!(before.sama_factor, 1.3);
    }

    #[test]
    fn batch_applies_only_present_fields() {
        let store = StateStore::new();
        store.apply(ForecastUpdate {
            kp: Some(vec![Some(3.0)]),
            sama_factor: Some(1.6),
            bump_generation: true,
            ..Default::default()
        });
        let s = store.apply(ForecastUpdate {
            storm_probability: Some(12.0),
            ..Default::default()
        });
        assert_eq!(s.kp, vec![Some(3.0)]);
        assert_eq!(s.sama_factor, 1.6);
        assert_eq!(s.storm_probability, 12.0);
        assert_eq!(s.generation, 1);
        assert!(s.has_data());
    }

    #[test]
    fn dst_class_can_be_cleared() {
        let store = StateStore::new();
        store.apply(ForecastUpdate {
            dst_class: Some(Some(DstClass::Weak)),
            ..Default::default()
        });
        let s = store.apply(ForecastUpdate {
            dst_class: Some(None),
            ..Default::default()
        });
        assert_eq!(s.dst_class, None);
    }
}
