// src/ingest/providers/intermagnet.rs
//! Observatory vector feed; only the most recent sample is used and reduced
//! to total field magnitude F = sqrt(x² + y² + z²).

use metrics::histogram;
use serde::Deserialize;

use super::{parse_utc, ParseContext, RequestShape, SourceParser};
use crate::error::SourceError;
use crate::ingest::types::{IndexSeries, Sample};

#[derive(Debug, Deserialize)]
struct VectorPayload {
    #[serde(default)]
    data: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    x: Option<f64>,
    #[serde(default)]
    y: Option<f64>,
    #[serde(default)]
    z: Option<f64>,
}

impl VectorSample {
    /// Missing components count as zero.
    fn magnitude(&self) -> f64 {
        let (x, y, z) = (
            self.x.unwrap_or(0.0),
            self.y.unwrap_or(0.0),
            self.z.unwrap_or(0.0),
        );
        (x * x + y * y + z * z).sqrt()
    }
}

pub struct IntermagnetParser {
    observatory: &'static str,
}

impl IntermagnetParser {
    pub fn new(observatory: &'static str) -> Self {
        Self { observatory }
    }

    pub fn observatory(&self) -> &'static str {
        self.observatory
    }
}

impl SourceParser for IntermagnetParser {
    fn family(&self) -> &'static str {
        "intermagnet"
    }

    fn shape(&self) -> RequestShape {
        RequestShape::Dated
    }

    fn parse(&self, body: &str, ctx: &ParseContext) -> Result<IndexSeries, SourceError> {
        let t0 = std::time::Instant::now();
        let payload: VectorPayload = serde_json::from_str(body).map_err(|e| {
            SourceError::format(format!("{} payload: {e}", self.observatory))
        })?;

        let Some(latest) = payload.data.last() else {
            return Ok(IndexSeries::empty());
        };
        let ts = latest
            .timestamp
            .as_deref()
            .and_then(parse_utc)
            .unwrap_or(ctx.now);
        let f = latest.magnitude();

        histogram!("geomag_parse_ms", "family" => "intermagnet").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(IndexSeries::new(vec![Sample::new(
            ts,
            f.is_finite().then_some(f),
        )]))
    }

    fn confidence(&self, _series: &IndexSeries) -> u8 {
        92
    }
}
