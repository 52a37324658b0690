// src/fetch/http.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};

use super::Transport;
use crate::error::FetchError;

const USER_AGENT: &str = "geomag-sama-monitor/0.1";

/// reqwest-backed transport. Per-attempt timeouts are enforced by the
/// fetcher, the client only carries a connect timeout.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(4))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, route: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url).send().await.map_err(|e| map_err(e, route))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                route: route.to_string(),
                status: status.as_u16(),
            });
        }
        resp.text().await.map_err(|e| map_err(e, route))
    }
}

fn map_err(e: reqwest::Error, route: &str) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            route: route.to_string(),
            timeout_ms: 0,
        }
    } else {
        FetchError::Network {
            route: route.to_string(),
            detail: e.to_string(),
        }
    }
}
