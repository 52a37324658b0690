// src/ingest/providers/mod.rs
//! One parser per upstream provider.
//!
//! A parser is a pure function of the response body plus a little context
//! (the wall-clock instant and, for dated resources, the requested day). It
//! also declares how its resource is addressed so the pipeline can build
//! URLs and cache keys without knowing the provider.

pub mod dst;
pub mod gfz;
pub mod intermagnet;
pub mod ksa;
pub mod noaa;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::SourceError;
use crate::ingest::types::{IndexSeries, SourceId};

pub use dst::DstParser;
pub use gfz::GfzIndexParser;
pub use intermagnet::IntermagnetParser;
pub use ksa::KsaParser;
pub use noaa::NoaaForecastParser;

pub const KP_MIN: f64 = 0.0;
pub const KP_MAX: f64 = 9.0;
pub const AP_MIN: f64 = 0.0;
pub const AP_MAX: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParseContext {
    pub now: DateTime<Utc>,
    /// Calendar day the resource was requested for, when it is dated.
    pub date: Option<NaiveDate>,
}

impl ParseContext {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now, date: None }
    }

    pub fn for_date(now: DateTime<Utc>, date: NaiveDate) -> Self {
        Self {
            now,
            date: Some(date),
        }
    }
}

/// How a provider's resource is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestShape {
    /// A single fixed URL.
    Fixed,
    /// One URL per calendar day (or per month, through `{yy}{mm}`).
    Dated,
    /// A time range of one named index from the JSON service.
    Range { index: &'static str },
}

pub trait SourceParser: Send + Sync {
    /// Cache family this provider's payloads are filed under.
    fn family(&self) -> &'static str;

    fn shape(&self) -> RequestShape;

    fn parse(&self, body: &str, ctx: &ParseContext) -> Result<IndexSeries, SourceError>;

    /// Confidence (0–100) reported for a successful parse of `series`.
    fn confidence(&self, series: &IndexSeries) -> u8;
}

pub fn parser_for(id: SourceId) -> Box<dyn SourceParser> {
    match id {
        SourceId::Ksa => Box::new(KsaParser),
        SourceId::KpNoaa => Box::new(NoaaForecastParser),
        SourceId::Hp30 => Box::new(GfzIndexParser::new("Hp30", Some(92))),
        SourceId::KpGfz => Box::new(GfzIndexParser::new("Kp", None)),
        SourceId::ApGfz => Box::new(GfzIndexParser::new("ap", None)),
        SourceId::Ap30 => Box::new(GfzIndexParser::new("ap30", Some(90))),
        SourceId::Dst => Box::new(DstParser),
        SourceId::IntermagnetPil => Box::new(IntermagnetParser::new("PIL")),
    }
}

pub(crate) fn in_kp_range(v: f64) -> bool {
    v.is_finite() && (KP_MIN..=KP_MAX).contains(&v)
}

pub(crate) fn in_ap_range(v: f64) -> bool {
    v.is_finite() && (AP_MIN..=AP_MAX).contains(&v)
}

/// Lenient UTC timestamp parsing for provider date strings.
pub(crate) fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(n) = chrono::NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(n.and_utc());
        }
    }
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
}
