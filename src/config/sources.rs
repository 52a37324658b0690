// src/config/sources.rs
use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::types::SourceId;

const ENV_GEOMAG_ENV: &str = "GEOMAG_ENV";
const ENV_SHUTTLE_ENV: &str = "SHUTTLE_ENV";

fn default_true() -> bool {
    true
}

/// Deployment flavour; production gets the longer upstream timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnv {
    #[default]
    Development,
    Production,
}

impl RuntimeEnv {
    /// `GEOMAG_ENV` wins over `SHUTTLE_ENV`; anything but production/prod is development.
    pub fn detect() -> Self {
        let raw = std::env::var(ENV_GEOMAG_ENV)
            .or_else(|_| std::env::var(ENV_SHUTTLE_ENV))
            .unwrap_or_default();
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => RuntimeEnv::Production,
            _ => RuntimeEnv::Development,
        }
    }
}

/// Alternate transport route used after the direct request fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayRoute {
    pub name: String,
    /// Relay base URL. The target is appended raw unless `query_param` is set.
    pub base: String,
    #[serde(default)]
    pub query_param: Option<String>,
    pub timeout_ms: u64,
    pub priority: u8,
}

impl RelayRoute {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One configured provider feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: SourceId,
    pub name: String,
    /// Lower is preferred.
    pub priority: u8,
    /// URL template; see [`render_endpoint`].
    pub endpoint: String,
    pub timeout_ms: u64,
    #[serde(default)]
    pub production_timeout_ms: Option<u64>,
    /// Prior calendar days retried when today's resource is unavailable.
    #[serde(default)]
    pub day_fallback: u8,
    /// Optional upstream status filter (only "def" is understood).
    #[serde(default)]
    pub status_filter: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl SourceConfig {
    pub fn timeout(&self, env: RuntimeEnv) -> Duration {
        let ms = match env {
            RuntimeEnv::Production => self.production_timeout_ms.unwrap_or(self.timeout_ms),
            RuntimeEnv::Development => self.timeout_ms,
        };
        Duration::from_millis(ms.max(1))
    }
}

/// Values substituted into an endpoint template.
#[derive(Debug, Clone, Default)]
pub struct EndpointParams<'a> {
    pub date: Option<NaiveDate>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub index: Option<&'a str>,
    pub status: Option<&'a str>,
}

/// Expand `{date}`, `{year}`, `{yy}`, `{mm}`, `{start}`, `{end}`, `{index}`
/// and `{status}` in an endpoint template. Unknown placeholders are left as-is.
pub fn render_endpoint(template: &str, p: &EndpointParams<'_>) -> String {
    let mut out = template.to_string();
    if let Some(d) = p.date {
        out = out
            .replace("{date}", &d.format("%Y-%m-%d").to_string())
            .replace("{year}", &d.year().to_string())
            .replace("{yy}", &format!("{:02}", d.year().rem_euclid(100)))
            .replace("{mm}", &format!("{:02}", d.month()));
    }
    if let Some(s) = p.start {
        out = out.replace("{start}", &s.format("%Y-%m-%dT%H:%M:%SZ").to_string());
    }
    if let Some(e) = p.end {
        out = out.replace("{end}", &e.format("%Y-%m-%dT%H:%M:%SZ").to_string());
    }
    if let Some(i) = p.index {
        out = out.replace("{index}", i);
    }
    // `{status}` expands to a query suffix or nothing.
    let status = p
        .status
        .map(|s| format!("&status={s}"))
        .unwrap_or_default();
    out.replace("{status}", &status)
}

/// Per-index-family time-to-live, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtlConfig {
    pub default_secs: u64,
    pub families: BTreeMap<String, u64>,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        let families = [("Kp", 3600), ("ap", 3600), ("Hp30", 1800), ("ap30", 1800)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self {
            default_secs: 3600,
            families,
        }
    }
}

impl CacheTtlConfig {
    pub fn ttl_for(&self, family: &str) -> chrono::Duration {
        let secs = self.families.get(family).copied().unwrap_or(self.default_secs);
        chrono::Duration::seconds(secs as i64)
    }
}

pub fn default_relays() -> Vec<RelayRoute> {
    vec![
        RelayRoute {
            name: "AllOrigins".into(),
            base: "https://api.allorigins.win/raw".into(),
            query_param: Some("url".into()),
            timeout_ms: 10_000,
            priority: 1,
        },
        RelayRoute {
            name: "CORS-Anywhere".into(),
            base: "https://cors-anywhere.herokuapp.com/".into(),
            query_param: None,
            timeout_ms: 15_000,
            priority: 2,
        },
    ]
}

pub fn default_sources() -> Vec<SourceConfig> {
    let gfz = "https://kp.gfz-potsdam.de/app/json/?start={start}&end={end}&index={index}{status}";
    let src = |id, name: &str, priority, endpoint: &str, dev, prod, day_fallback| SourceConfig {
        id,
        name: name.to_string(),
        priority,
        endpoint: endpoint.to_string(),
        timeout_ms: dev,
        production_timeout_ms: Some(prod),
        day_fallback,
        status_filter: None,
        enabled: true,
    };
    vec![
        src(
            SourceId::Ksa,
            "KSA EMBRACE",
            1,
            "https://embracedata.inpe.br/ksa/{year}/{date}.txt",
            20_000,
            30_000,
            3,
        ),
        src(
            SourceId::KpNoaa,
            "Kp NOAA/SWPC",
            2,
            "https://services.swpc.noaa.gov/text/3-day-geomag-forecast.txt",
            30_000,
            40_000,
            0,
        ),
        src(SourceId::Hp30, "HP30 GFZ", 3, gfz, 20_000, 30_000, 0),
        src(SourceId::KpGfz, "Kp GFZ", 4, gfz, 20_000, 30_000, 0),
        src(SourceId::ApGfz, "ap GFZ", 5, gfz, 20_000, 30_000, 0),
        src(SourceId::Ap30, "ap30 GFZ", 6, gfz, 20_000, 30_000, 0),
        src(
            SourceId::Dst,
            "DST Kyoto",
            7,
            "https://wdc.kugi.kyoto-u.ac.jp/dst_realtime/presentmonth/dst{yy}{mm}.for.request",
            40_000,
            60_000,
            0,
        ),
        src(
            SourceId::IntermagnetPil,
            "INTERMAGNET PIL",
            8,
            "https://imag-data.bgs.ac.uk/GIN_V1/GINServices?Request=GetData&ObservatoryIagaCode=PIL&samplesPerDay=Minute&dataStartDate={date}&dataDuration=1&publicationState=best-avail&format=json",
            10_000,
            15_000,
            3,
        ),
    ]
}
