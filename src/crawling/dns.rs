//! Session-scoped DNS cache
//!
//! Plugged into the HTTP client through `reqwest::dns::Resolve` so every
//! request of a crawl session resolves each host at most once. Failed
//! lookups are not cached; they surface as [`DnsResolutionError`] in the
//! request's error chain, which the fetcher maps to a domain-unavailable
//! error.

use parking_lot::Mutex;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Host name could not be resolved
#[derive(Debug, Error)]
#[error("DNS resolution failed for {host}: {reason}")]
pub struct DnsResolutionError {
    pub host: String,
    pub reason: String,
}

#[derive(Default)]
struct DnsState {
    entries: Mutex<HashMap<String, Vec<SocketAddr>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Caching resolver shared by one session's HTTP clients
#[derive(Clone, Default)]
pub struct DnsCache {
    state: Arc<DnsState>,
}

impl DnsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a host, consulting the cache first
    pub async fn lookup(&self, host: &str) -> Result<Vec<SocketAddr>, DnsResolutionError> {
        Self::lookup_with(self.state.clone(), host.to_ascii_lowercase()).await
    }

    async fn lookup_with(
        state: Arc<DnsState>,
        host: String,
    ) -> Result<Vec<SocketAddr>, DnsResolutionError> {
        let cached = state.entries.lock().get(&host).cloned();
        if let Some(addrs) = cached {
            state.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(addrs);
        }

        state.misses.fetch_add(1, Ordering::Relaxed);
        let resolved: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
            .await
            .map_err(|e| DnsResolutionError {
                host: host.clone(),
                reason: e.to_string(),
            })?
            .collect();

        if resolved.is_empty() {
            return Err(DnsResolutionError {
                host,
                reason: "no addresses".to_string(),
            });
        }

        debug!("Resolved {} -> {} address(es)", host, resolved.len());
        state.entries.lock().insert(host, resolved.clone());
        Ok(resolved)
    }

    /// Cache hits since creation
    pub fn hits(&self) -> u64 {
        self.state.hits.load(Ordering::Relaxed)
    }

    /// Lookups that went to the system resolver
    pub fn misses(&self) -> u64 {
        self.state.misses.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.state.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Resolve for DnsCache {
    fn resolve(&self, name: Name) -> Resolving {
        let state = self.state.clone();
        let host = name.as_str().to_ascii_lowercase();
        Box::pin(async move {
            let addrs = Self::lookup_with(state, host).await?;
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
        })
    }
}

/// Whether an error chain contains a DNS resolution failure
pub fn is_dns_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<DnsResolutionError>().is_some() {
            return true;
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_lookup_hits_cache() {
        let cache = DnsCache::new();
        let first = cache.lookup("localhost").await.unwrap();
        let second = cache.lookup("LOCALHOST").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let cache = DnsCache::new();
        let clone = cache.clone();
        cache.lookup("localhost").await.unwrap();
        clone.lookup("localhost").await.unwrap();
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn finds_dns_error_in_chain() {
        #[derive(Debug, Error)]
        #[error("connect failed")]
        struct Wrapper(#[source] DnsResolutionError);

        let err = Wrapper(DnsResolutionError {
            host: "gone.example".into(),
            reason: "nxdomain".into(),
        });
        assert!(is_dns_failure(&err));
        assert!(!is_dns_failure(&std::io::Error::other("boom")));
    }
}
