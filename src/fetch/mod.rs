//! # Resilient fetcher
//!
//! Issues a GET for a URL over the direct route first and, on network
//! failure, non-2xx status or timeout, walks the relay routes in priority
//! order until one answers. The caller's timeout bounds each direct attempt;
//! every relay carries its own budget. Nothing is cached here.

pub mod http;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::counter;
use reqwest::Url;

use crate::config::RelayRoute;
use crate::error::FetchError;

pub use http::ReqwestTransport;

pub const DIRECT_ROUTE: &str = "direct";

/// One network attempt with no retry and no timeout of its own.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the body of a 2xx response. `route` is only used for error labels.
    async fn get(&self, url: &str, route: &str) -> Result<String, FetchError>;
}

/// Successful acquisition plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub body: String,
    pub route: String,
    pub attempts: usize,
    pub elapsed: Duration,
}

#[derive(Clone)]
pub struct ResilientFetcher {
    transport: Arc<dyn Transport>,
    relays: Vec<RelayRoute>,
}

impl ResilientFetcher {
    pub fn new(transport: Arc<dyn Transport>, mut relays: Vec<RelayRoute>) -> Self {
        relays.sort_by_key(|r| r.priority);
        Self { transport, relays }
    }

    /// Direct route only.
    pub fn direct_only(transport: Arc<dyn Transport>) -> Self {
        Self::new(transport, Vec::new())
    }

    pub fn relays(&self) -> &[RelayRoute] {
        &self.relays
    }

    /// Try direct, then each relay in order; first success wins.
    ///
    /// Worst-case latency is `timeout` plus the sum of the relay timeouts.
    pub async fn acquire(&self, url: &str, timeout: Duration) -> Result<Fetched, FetchError> {
        let t0 = Instant::now();
        let mut attempts = 0usize;

        let mut last = match self.attempt(url, DIRECT_ROUTE, timeout).await {
            Ok(body) => {
                return Ok(Fetched {
                    body,
                    route: DIRECT_ROUTE.to_string(),
                    attempts: 1,
                    elapsed: t0.elapsed(),
                })
            }
            Err(e) => {
                attempts += 1;
                tracing::debug!(url, error = %e, "direct fetch failed, trying relays");
                e
            }
        };

        for relay in &self.relays {
            let relay_url = match relay_url(relay, url) {
                Some(u) => u,
                None => {
                    tracing::warn!(relay = %relay.name, "relay base is not a valid URL, skipping");
                    continue;
                }
            };
            attempts += 1;
            match self.attempt(&relay_url, &relay.name, relay.timeout()).await {
                Ok(body) => {
                    tracing::info!(url, relay = %relay.name, attempts, "fetched via relay");
                    return Ok(Fetched {
                        body,
                        route: relay.name.clone(),
                        attempts,
                        elapsed: t0.elapsed(),
                    });
                }
                Err(e) => {
                    tracing::debug!(url, relay = %relay.name, error = %e, "relay fetch failed");
                    last = e;
                }
            }
        }

        counter!("geomag_fetch_exhausted_total").increment(1);
        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts,
            last: Box::new(last),
        })
    }

    async fn attempt(&self, url: &str, route: &str, timeout: Duration) -> Result<String, FetchError> {
        counter!("geomag_fetch_attempts_total", "route" => route.to_string()).increment(1);
        let res = match tokio::time::timeout(timeout, self.transport.get(url, route)).await {
            Ok(r) => r,
            Err(_) => Err(FetchError::Timeout {
                route: route.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };
        if let Err(e) = &res {
            counter!("geomag_fetch_failures_total", "route" => route.to_string(), "kind" => e.kind())
                .increment(1);
        }
        res
    }
}

/// Build the relayed URL for `target`.
pub fn relay_url(relay: &RelayRoute, target: &str) -> Option<String> {
    match &relay.query_param {
        Some(param) => {
            let mut u = Url::parse(&relay.base).ok()?;
            u.query_pairs_mut().append_pair(param, target);
            Some(u.to_string())
        }
        None => Some(format!("{}{}", relay.base, target)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Transport answering from a script keyed by route name.
    struct Scripted {
        by_route: HashMap<String, Result<String, FetchError>>,
        delay_route: Option<(String, Duration)>,
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn get(&self, url: &str, route: &str) -> Result<String, FetchError> {
            self.seen
                .lock()
                .unwrap()
                .push((route.to_string(), url.to_string()));
            if let Some((r, d)) = &self.delay_route {
                if r == route {
                    tokio::time::sleep(*d).await;
                }
            }
            self.by_route.get(route).cloned().unwrap_or_else(|| {
                Err(FetchError::Network {
                    route: route.to_string(),
                    detail: "unscripted".into(),
                })
            })
        }
    }

    fn relays() -> Vec<RelayRoute> {
        vec![
            RelayRoute {
                name: "second".into(),
                base: "https://relay-b.test/".into(),
                query_param: None,
                timeout_ms: 50,
                priority: 2,
            },
            RelayRoute {
                name: "first".into(),
                base: "https://relay-a.test/raw".into(),
                query_param: Some("url".into()),
                timeout_ms: 50,
                priority: 1,
            },
        ]
    }

    #[tokio::test]
    async fn direct_success_skips_relays() {
        let t = Arc::new(Scripted {
            by_route: HashMap::from([(DIRECT_ROUTE.to_string(), Ok("body".to_string()))]),
            delay_route: None,
            seen: Mutex::new(vec![]),
        });
        let f = ResilientFetcher::new(t.clone(), relays());
        let out = f
            .acquire("https://up.test/a", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(out.body, "body");
        assert_eq!(out.route, DIRECT_ROUTE);
        assert_eq!(out.attempts, 1);
        assert_eq!(t.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn relays_are_tried_in_priority_order() {
        let t = Arc::new(Scripted {
            by_route: HashMap::from([
                (
                    DIRECT_ROUTE.to_string(),
                    Err(FetchError::Http {
                        route: DIRECT_ROUTE.into(),
                        status: 503,
                    }),
                ),
                ("second".to_string(), Ok("via-b".to_string())),
            ]),
            delay_route: None,
            seen: Mutex::new(vec![]),
        });
        let f = ResilientFetcher::new(t.clone(), relays());
        let out = f
            .acquire("https://up.test/a?x=1", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(out.body, "via-b");
        assert_eq!(out.route, "second");
        assert_eq!(out.attempts, 3);

        let seen = t.seen.lock().unwrap();
        let routes: Vec<_> = seen.iter().map(|(r, _)| r.as_str()).collect();
        assert_eq!(routes, vec![DIRECT_ROUTE, "first", "second"]);
        assert_eq!(
            seen[1].1,
            "https://relay-a.test/raw?url=https%3A%2F%2Fup.test%2Fa%3Fx%3D1"
        );
        assert_eq!(seen[2].1, "https://relay-b.test/https://up.test/a?x=1");
    }

    #[tokio::test]
    async fn direct_timeout_falls_through_to_relay() {
        let t = Arc::new(Scripted {
            by_route: HashMap::from([
                (DIRECT_ROUTE.to_string(), Ok("late".to_string())),
                ("first".to_string(), Ok("relay".to_string())),
            ]),
            delay_route: Some((DIRECT_ROUTE.to_string(), Duration::from_millis(200))),
            seen: Mutex::new(vec![]),
        });
        let f = ResilientFetcher::new(t, relays());
        let out = f
            .acquire("https://up.test/a", Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(out.body, "relay");
    }

    #[tokio::test]
    async fn all_routes_failing_is_exhausted() {
        let t = Arc::new(Scripted {
            by_route: HashMap::new(),
            delay_route: None,
            seen: Mutex::new(vec![]),
        });
        let f = ResilientFetcher::new(t, relays());
        let err = f
            .acquire("https://up.test/a", Duration::from_millis(20))
            .await
            .unwrap_err();
        match err {
            FetchError::Exhausted { attempts, last, .. } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, FetchError::Network { .. }));
            }
            other => panic!("expected exhausted, got {other:?}"),
        }
    }
}
