// src/analyze/sama.rs
//! Regional amplification model for the South Atlantic Magnetic Anomaly.
//!
//! Three deterministic functions over already reconciled values: a bounded
//! dynamic factor, a composite risk score and a short-horizon extrapolation.
//! Nothing is remembered between calls; the ap30 history is supplied by
//! the caller every time.

use serde::{Deserialize, Serialize};

use super::conversion::ap_to_kp;
use crate::config::SamaConfig;

/// Current index values fed to the analyzer. `None` means unavailable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Indices {
    pub kp: Option<f64>,
    pub ap: Option<f64>,
    pub hp30: Option<f64>,
    pub ap30: Option<f64>,
    /// Recent raw ap30 samples, oldest first.
    #[serde(default)]
    pub ap30_history: Vec<f64>,
}

impl Indices {
    pub fn is_empty(&self) -> bool {
        self.kp.is_none() && self.ap.is_none() && self.hp30.is_none() && self.ap30.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    KpCritical,
    KpElevated,
    ApCritical,
    ApElevated,
    RapidIncrease,
}

impl RiskFactor {
    pub fn describe(&self) -> &'static str {
        match self {
            RiskFactor::KpCritical => "effective Kp critical",
            RiskFactor::KpElevated => "effective Kp elevated",
            RiskFactor::ApCritical => "critical amplitude",
            RiskFactor::ApElevated => "elevated amplitude",
            RiskFactor::RapidIncrease => "rapid increase detected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub score: u32,
    pub factors: Vec<RiskFactor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub rapid_increase: bool,
    pub direction: TrendDirection,
    /// nT per hour over the last three samples.
    pub rate: f64,
}

impl Trend {
    pub fn stable() -> Self {
        Self {
            rapid_increase: false,
            direction: TrendDirection::Stable,
            rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub text: String,
    /// 0–100.
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_ap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_kp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<TrendDirection>,
}

impl Prediction {
    pub fn insufficient() -> Self {
        Self {
            text: "insufficient data".to_string(),
            confidence: 0.0,
            predicted_ap: None,
            predicted_kp: None,
            trend: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SamaAnalyzer {
    cfg: SamaConfig,
}

impl SamaAnalyzer {
    pub fn new(cfg: SamaConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &SamaConfig {
        &self.cfg
    }

    /// Weighted blend of the per-family amplification constants, clamped to
    /// `[min_factor, max_factor]`.
    ///
    /// The accumulator starts at `blend_origin` and is divided by the sum of
    /// the weights of the indices actually present; absent indices are
    /// skipped without rescaling the others. ap and ap30 add a magnitude
    /// bonus that saturates at `bonus_saturation_nt`.
    pub fn dynamic_factor(&self, ix: &Indices) -> f64 {
        let c = &self.cfg;
        if ix.is_empty() {
            return c.base_factor;
        }

        let bonus = |v: f64, cap: f64| (v / c.bonus_saturation_nt).min(1.0) * cap;
        let mut factor = c.blend_origin;
        let mut weight_sum = 0.0;

        if ix.kp.is_some() {
            factor += c.amplification.kp * c.weights.kp;
            weight_sum += c.weights.kp;
        }
        if let Some(ap) = ix.ap {
            factor += (c.amplification.ap + bonus(ap, c.ap_bonus_cap)) * c.weights.ap;
            weight_sum += c.weights.ap;
        }
        if ix.hp30.is_some() {
            factor += c.amplification.hp30 * c.weights.hp30;
            weight_sum += c.weights.hp30;
        }
        if let Some(ap30) = ix.ap30 {
            factor += (c.amplification.ap30 + bonus(ap30, c.ap30_bonus_cap)) * c.weights.ap30;
            weight_sum += c.weights.ap30;
        }

        if weight_sum > 0.0 {
            factor /= weight_sum;
        }
        if !factor.is_finite() {
            return c.base_factor;
        }
        factor.clamp(c.min_factor, c.max_factor)
    }

    /// Composite score from factor-scaled values against factor-scaled
    /// thresholds, plus a penalty for a rapid ap30 rise.
    pub fn evaluate_risk(&self, ix: &Indices, factor: f64) -> RiskAssessment {
        let t = &self.cfg.thresholds;
        let pts = &self.cfg.risk_scores;
        let mut score = 0u32;
        let mut factors = Vec::new();

        if let Some(kp) = ix.kp {
            let effective = kp * factor;
            if effective >= t.danger.kp * factor {
                factors.push(RiskFactor::KpCritical);
                score += pts.kp_critical;
            } else if effective >= t.caution.kp * factor {
                factors.push(RiskFactor::KpElevated);
                score += pts.kp_elevated;
            }
        }

        if let Some(ap) = ix.ap {
            let effective = ap * factor;
            if effective >= t.danger.ap * factor {
                factors.push(RiskFactor::ApCritical);
                score += pts.ap_critical;
            } else if effective >= t.caution.ap * factor {
                factors.push(RiskFactor::ApElevated);
                score += pts.ap_elevated;
            }
        }

        if ix.ap30.is_some() && self.analyze_recent_changes(&ix.ap30_history).rapid_increase {
            factors.push(RiskFactor::RapidIncrease);
            score += pts.rapid_increase;
        }

        RiskAssessment {
            level: self.level_for(score),
            score,
            factors,
        }
    }

    pub fn level_for(&self, score: u32) -> RiskLevel {
        let pts = &self.cfg.risk_scores;
        if score >= pts.level_critical {
            RiskLevel::Critical
        } else if score >= pts.level_high {
            RiskLevel::High
        } else if score >= pts.level_medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Mean slope over the last three samples, `(h[n-1] - h[n-3]) / 2`.
    pub fn analyze_recent_changes(&self, history: &[f64]) -> Trend {
        if history.len() < 3 {
            return Trend::stable();
        }
        let recent = &history[history.len() - 3..];
        let rate = (recent[2] - recent[0]) / 2.0;
        let direction = if rate > self.cfg.trend_rate {
            TrendDirection::Increasing
        } else if rate < -self.cfg.trend_rate {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        };
        Trend {
            rapid_increase: rate > self.cfg.rapid_increase_rate,
            direction,
            rate,
        }
    }

    /// Linear extrapolation of the amplitude index `hours` ahead, reported on
    /// the Kp scale. Needs `min_prediction_samples` ap30 samples.
    pub fn predict_short_term(&self, ix: &Indices, hours: f64) -> Prediction {
        if ix.ap30_history.len() < self.cfg.min_prediction_samples {
            return Prediction::insufficient();
        }
        let trend = self.analyze_recent_changes(&ix.ap30_history);
        let current = ix.ap.or(ix.ap30).unwrap_or(0.0);
        // ap is an amplitude; a steep decline extrapolates to 0, not below.
        let predicted_ap = (current + trend.rate * hours).max(0.0);
        let predicted_kp = ap_to_kp(predicted_ap);
        let confidence = (100.0 - trend.rate.abs() * self.cfg.confidence_decay).max(0.0);

        Prediction {
            text: format!("Kp {:.1} (ap {:.0} nT)", predicted_kp, predicted_ap),
            confidence,
            predicted_ap: Some(predicted_ap),
            predicted_kp: Some(predicted_kp),
            trend: Some(trend.direction),
        }
    }
}
