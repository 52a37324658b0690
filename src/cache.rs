//! # Index cache
//! Key → (payload, fetched-at) store with a time-to-live per index family.
//!
//! Expiry is lazy: an entry older than its family's TTL is evicted by the
//! lookup that finds it, never by a background task. Range keys move with
//! the aligned window, so most keys are never looked up again; the owner
//! calls [`IndexCache::purge_expired`] once per refresh cycle to keep the
//! map bounded. The cache takes
//! `&mut self` for both lookup and store, so shared use needs an external
//! lock (the monitor wraps it in a `Mutex`).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use metrics::counter;

use crate::clock::Clock;
use crate::config::CacheTtlConfig;

/// Deterministic key built from (index family, time range, status filter).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    family: String,
    repr: String,
}

impl CacheKey {
    pub fn range(
        family: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        status_filter: Option<&str>,
    ) -> Self {
        let repr = format!(
            "{}_{}_{}_{}",
            family,
            start.format("%Y-%m-%dT%H:%M:%SZ"),
            end.format("%Y-%m-%dT%H:%M:%SZ"),
            status_filter.unwrap_or("all")
        );
        Self {
            family: family.to_string(),
            repr,
        }
    }

    /// Key for a resource published per calendar day (or month, with the first day).
    pub fn day(family: &str, date: NaiveDate) -> Self {
        let start = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        Self::range(family, start, start + Duration::days(1), None)
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn as_str(&self) -> &str {
        &self.repr
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

/// A cached payload handed back by [`IndexCache::lookup`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit<T> {
    pub payload: T,
    pub from_cache: bool,
    pub age: Duration,
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    payload: T,
    fetched_at: DateTime<Utc>,
}

pub struct IndexCache<T> {
    entries: HashMap<CacheKey, CacheEntry<T>>,
    ttl: CacheTtlConfig,
    clock: Arc<dyn Clock>,
}

impl<T: Clone> IndexCache<T> {
    pub fn new(ttl: CacheTtlConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            clock,
        }
    }

    /// Look up with the TTL of the key's family.
    pub fn lookup(&mut self, key: &CacheKey) -> Option<CacheHit<T>> {
        let ttl = self.ttl.ttl_for(key.family());
        self.lookup_with_ttl(key, ttl)
    }

    /// Fresh while `age <= ttl`; an expired entry is purged and reported as a miss.
    pub fn lookup_with_ttl(&mut self, key: &CacheKey, ttl: Duration) -> Option<CacheHit<T>> {
        let now = self.clock.now();
        let age = match self.entries.get(key) {
            Some(e) => now - e.fetched_at,
            None => {
                counter!("geomag_cache_misses_total", "family" => key.family().to_string())
                    .increment(1);
                return None;
            }
        };

        if age > ttl {
            self.entries.remove(key);
            tracing::debug!(key = %key, age_secs = age.num_seconds(), "cache entry expired");
            counter!("geomag_cache_misses_total", "family" => key.family().to_string())
                .increment(1);
            return None;
        }

        counter!("geomag_cache_hits_total", "family" => key.family().to_string()).increment(1);
        self.entries.get(key).map(|e| CacheHit {
            payload: e.payload.clone(),
            from_cache: true,
            age,
        })
    }

    pub fn store(&mut self, key: CacheKey, payload: T) {
        let fetched_at = self.clock.now();
        self.entries.insert(
            key,
            CacheEntry {
                payload,
                fetched_at,
            },
        );
    }

    /// Drop every entry past its family's TTL. Returns how many went.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        let ttl = &self.ttl;
        self.entries
            .retain(|key, e| now - e.fetched_at <= ttl.ttl_for(key.family()));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }
}
