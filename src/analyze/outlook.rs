// src/analyze/outlook.rs
//! Operational read-outs derived from the reconciled series: storm
//! probability, the flight gate, the Dst storm class and the count of
//! quiet slots.

use serde::{Deserialize, Serialize};

use super::sama::SamaAnalyzer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightStatus {
    Safe,
    Caution,
    Limited,
    ExtremeCaution,
    NoFly,
}

impl FlightStatus {
    pub fn recommendation(&self) -> &'static str {
        match self {
            FlightStatus::Safe => "Normal operations.",
            FlightStatus::Caution => "Minor activity amplified over the anomaly. Monitor continuously.",
            FlightStatus::Limited => "Moderate activity. Reduce operating range and altitude.",
            FlightStatus::ExtremeCaution => "Very high activity. Essential flights only.",
            FlightStatus::NoFly => "Severe geomagnetic storm. Do not fly.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DstClass {
    Quiet,
    Weak,
    Moderate,
    Intense,
    Severe,
}

pub fn dst_storm_class(dst: f64) -> DstClass {
    if dst <= -200.0 {
        DstClass::Severe
    } else if dst <= -100.0 {
        DstClass::Intense
    } else if dst <= -50.0 {
        DstClass::Moderate
    } else if dst <= -30.0 {
        DstClass::Weak
    } else {
        DstClass::Quiet
    }
}

/// Share of slots at or above `threshold`; `None` slots count in the denominator.
fn share_at_or_above(series: &[Option<f64>], threshold: f64) -> Option<f64> {
    if series.is_empty() {
        return None;
    }
    let high = series.iter().flatten().filter(|v| **v >= threshold).count();
    Some(high as f64 / series.len() as f64 * 100.0)
}

impl SamaAnalyzer {
    /// Weighted share of danger-level slots across primary Kp (0.4), ap (0.3)
    /// and Hp30 (0.3), divided by the weights used, scaled by `factor` and
    /// capped at 100.
    pub fn storm_probability(
        &self,
        kp: &[Option<f64>],
        ap: &[Option<f64>],
        hp30: &[Option<f64>],
        factor: f64,
    ) -> f64 {
        let danger = self.config().thresholds.danger;
        let parts = [
            (share_at_or_above(kp, danger.kp), 0.4),
            (share_at_or_above(ap, danger.ap), 0.3),
            (share_at_or_above(hp30, danger.kp), 0.3),
        ];

        let mut probability = 0.0;
        let mut weights = 0.0;
        for (share, w) in parts {
            if let Some(s) = share {
                probability += s * w;
                weights += w;
            }
        }
        if weights > 0.0 {
            probability = probability / weights * factor;
        }
        probability.min(100.0)
    }

    /// Operational gate from the effective (factor-scaled) current values.
    pub fn flight_status(&self, kp: Option<f64>, ap: Option<f64>, factor: f64) -> FlightStatus {
        let t = self.config().thresholds;
        let kp = kp.unwrap_or(0.0) * factor;
        let ap = ap.unwrap_or(0.0) * factor;

        if kp >= t.critical.kp || ap >= t.critical.ap {
            FlightStatus::NoFly
        } else if kp >= t.danger.kp || ap >= t.danger.ap {
            FlightStatus::ExtremeCaution
        } else if kp >= t.caution.kp || ap >= t.caution.ap {
            FlightStatus::Limited
        } else if kp >= t.safe.kp || ap >= t.safe.ap {
            FlightStatus::Caution
        } else {
            FlightStatus::Safe
        }
    }

    /// Slots whose effective Kp stays below the caution threshold.
    pub fn optimal_window_slots(&self, kp: &[Option<f64>], factor: f64) -> usize {
        let caution = self.config().thresholds.caution.kp;
        kp.iter().flatten().filter(|v| **v * factor < caution).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SamaConfig;

    fn a() -> SamaAnalyzer {
        SamaAnalyzer::new(SamaConfig::default())
    }

    #[test]
    fn dst_classes() {
        assert_eq!(dst_storm_class(-10.0), DstClass::Quiet);
        assert_eq!(dst_storm_class(-30.0), DstClass::Weak);
        assert_eq!(dst_storm_class(-75.0), DstClass::Moderate);
        assert_eq!(dst_storm_class(-100.0), DstClass::Intense);
        assert_eq!(dst_storm_class(-250.0), DstClass::Severe);
    }

    #[test]
    fn flight_gate_uses_effective_values() {
        assert_eq!(a().flight_status(Some(1.0), Some(5.0), 1.3), FlightStatus::Safe);
        // 2.5 * 1.3 = 3.25 ≥ 3
        assert_eq!(a().flight_status(Some(2.5), None, 1.3), FlightStatus::Caution);
        assert_eq!(a().flight_status(None, Some(25.0), 1.3), FlightStatus::Limited);
        assert_eq!(a().flight_status(Some(4.0), None, 1.3), FlightStatus::ExtremeCaution);
        assert_eq!(a().flight_status(None, Some(150.0), 1.3), FlightStatus::NoFly);
        assert_eq!(a().flight_status(None, None, 2.0), FlightStatus::Safe);
    }

    #[test]
    fn storm_probability_weights_and_caps() {
        let kp = vec![Some(6.0), Some(2.0), None, Some(1.0)];
        // 25 % of kp slots, no ap/hp30 → 25 * 1.2
        let p = a().storm_probability(&kp, &[], &[], 1.2);
        assert!((p - 30.0).abs() < 1e-9);

        let all_high = vec![Some(8.0); 4];
        let ap = vec![Some(200.0); 4];
        assert_eq!(a().storm_probability(&all_high, &ap, &all_high, 2.0), 100.0);
        assert_eq!(a().storm_probability(&[], &[], &[], 2.0), 0.0);
    }

    #[test]
    fn optimal_window_counts_quiet_slots() {
        let kp = vec![Some(1.0), Some(3.0), None, Some(2.9)];
        // effective 1.3, 3.9 and 3.77 all stay below Kp 4
        assert_eq!(a().optimal_window_slots(&kp, 1.3), 3);
        assert_eq!(a().optimal_window_slots(&kp, 2.0), 1);
    }
}
