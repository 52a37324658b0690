// src/config/sama.rs
//! Fixed policy constants for the South Atlantic Magnetic Anomaly model.
//!
//! These are empirical tables, not computed values. Every struct defaults to
//! the stock table so a config file only needs to override what it changes.

use serde::{Deserialize, Serialize};

/// Kp / ap pair used for one threshold tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThreshold {
    pub kp: f64,
    pub ap: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamaThresholds {
    pub safe: TierThreshold,
    pub caution: TierThreshold,
    pub danger: TierThreshold,
    pub critical: TierThreshold,
}

impl Default for SamaThresholds {
    fn default() -> Self {
        Self {
            safe: TierThreshold { kp: 3.0, ap: 18.0 },
            caution: TierThreshold { kp: 4.0, ap: 27.0 },
            danger: TierThreshold { kp: 5.0, ap: 48.0 },
            critical: TierThreshold { kp: 7.0, ap: 180.0 },
        }
    }
}

/// Per-index-family constant pairs (amplification multipliers, blend weights).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerIndex {
    pub kp: f64,
    pub ap: f64,
    pub hp30: f64,
    pub ap30: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskScores {
    pub kp_critical: u32,
    pub kp_elevated: u32,
    pub ap_critical: u32,
    pub ap_elevated: u32,
    pub rapid_increase: u32,
    pub level_critical: u32,
    pub level_high: u32,
    pub level_medium: u32,
}

impl Default for RiskScores {
    fn default() -> Self {
        Self {
            kp_critical: 40,
            kp_elevated: 20,
            ap_critical: 30,
            ap_elevated: 15,
            rapid_increase: 25,
            level_critical: 60,
            level_high: 40,
            level_medium: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamaConfig {
    /// Returned when no index is available.
    pub base_factor: f64,
    /// Starting value of the weighted blend accumulator.
    pub blend_origin: f64,
    pub min_factor: f64,
    pub max_factor: f64,
    pub amplification: PerIndex,
    pub weights: PerIndex,
    /// Magnitude bonus caps for the two amplitude-linear families.
    pub ap_bonus_cap: f64,
    pub ap30_bonus_cap: f64,
    /// Amplitude (nT) at which the magnitude bonus saturates.
    pub bonus_saturation_nt: f64,
    pub thresholds: SamaThresholds,
    pub risk_scores: RiskScores,
    /// nT per hour over the last three ap30 samples.
    pub rapid_increase_rate: f64,
    pub trend_rate: f64,
    /// Confidence points lost per nT/h of slope.
    pub confidence_decay: f64,
    pub min_prediction_samples: usize,
    pub prediction_horizon_hours: f64,
}

impl Default for SamaConfig {
    fn default() -> Self {
        Self {
            base_factor: 1.3,
            blend_origin: 1.0,
            min_factor: 1.0,
            max_factor: 2.0,
            amplification: PerIndex {
                kp: 1.3,
                ap: 1.4,
                hp30: 1.35,
                ap30: 1.45,
            },
            weights: PerIndex {
                kp: 0.3,
                ap: 0.4,
                hp30: 0.15,
                ap30: 0.15,
            },
            ap_bonus_cap: 0.2,
            ap30_bonus_cap: 0.3,
            bonus_saturation_nt: 50.0,
            thresholds: SamaThresholds::default(),
            risk_scores: RiskScores::default(),
            rapid_increase_rate: 10.0,
            trend_rate: 5.0,
            confidence_decay: 5.0,
            min_prediction_samples: 4,
            prediction_horizon_hours: 3.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_override_keeps_stock_table() {
        let cfg: SamaConfig = toml::from_str(
            r#"
            base_factor = 1.25
            [risk_scores]
            rapid_increase = 30
            "#,
        )
        .unwrap();
        assert!((cfg.base_factor - 1.25).abs() < 1e-9);
        assert_eq!(cfg.risk_scores.rapid_increase, 30);
        assert_eq!(cfg.risk_scores.kp_critical, 40);
        assert!((cfg.thresholds.danger.ap - 48.0).abs() < 1e-9);
    }
}
