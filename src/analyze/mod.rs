// src/analyze/mod.rs
//! Risk analysis over reconciled index values.

pub mod conversion;
pub mod outlook;
pub mod sama;

pub use conversion::{ap_to_kp, AP_KP_TABLE};
pub use outlook::{dst_storm_class, DstClass, FlightStatus};
pub use sama::{
    Indices, Prediction, RiskAssessment, RiskFactor, RiskLevel, SamaAnalyzer, Trend,
    TrendDirection,
};
