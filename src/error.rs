//! Error taxonomy for the acquisition pipeline.
//!
//! Errors never escape a single source pipeline: the monitor converts each
//! one into a [`ValidationEntry`](crate::validation::ValidationEntry) and the
//! cycle carries on with whatever the other sources produced.

use thiserror::Error;

/// Transport-level failure for one URL after all routes were tried (or for a
/// single attempt, before the fetcher folds it into `Exhausted`).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("timeout after {timeout_ms} ms via {route}")]
    Timeout { route: String, timeout_ms: u64 },

    #[error("HTTP {status} via {route}")]
    Http { route: String, status: u16 },

    #[error("network error via {route}: {detail}")]
    Network { route: String, detail: String },

    /// Every route failed; `last` is the failure of the final route tried.
    #[error("all {attempts} routes failed for {url} (last: {last})")]
    Exhausted {
        url: String,
        attempts: usize,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// True when the failure (or the last failure of an exhausted chain) was a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            FetchError::Timeout { .. } => true,
            FetchError::Exhausted { last, .. } => last.is_timeout(),
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout { .. } => "timeout",
            FetchError::Http { .. } => "http",
            FetchError::Network { .. } => "network",
            FetchError::Exhausted { .. } => "exhausted",
        }
    }
}

/// Failure of one source's fetch-parse step.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error(transparent)]
    Transport(#[from] FetchError),

    /// Unparseable or structurally unexpected payload.
    #[error("format error: {0}")]
    Format(String),

    /// Well-formed payload without any usable sample.
    #[error("no data: {0}")]
    NoData(String),
}

impl SourceError {
    pub fn format(msg: impl Into<String>) -> Self {
        SourceError::Format(msg.into())
    }

    pub fn no_data(msg: impl Into<String>) -> Self {
        SourceError::NoData(msg.into())
    }
}

/// The reconciler found no source with data; the published state is kept.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("no source produced data this cycle")]
    NoData,
}

/// A manual retry named a source that is not configured or is disabled.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown or disabled source: {0}")]
pub struct UnknownSource(pub String);
