// Memoizing decorator around a Measurer

use crate::cache::ProbeCache;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};
use websteps_scanner::{
    DnsLookupMeasurement, DnsLookupPlan, EndpointMeasurement, EndpointPlan, Measurer, next_id,
};

const KIND_DNS: &str = "dns";
const KIND_ENDPOINT: &str = "endpoint";

/// Request headers that change what a server answers.
const FINGERPRINT_HEADERS: [&str; 4] = ["accept", "accept-language", "user-agent", "host"];

/// A measurement together with whether it came from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup<T> {
    pub value: T,
    pub cached: bool,
}

fn sha256_hex(doc: &serde_json::Value) -> String {
    // serde_json maps are ordered, so equal documents hash equally
    hex::encode(Sha256::digest(doc.to_string().as_bytes()))
}

pub fn dns_fingerprint(plan: &DnsLookupPlan) -> String {
    sha256_hex(&json!({
        "kind": KIND_DNS,
        "domain": plan.domain,
        "lookup_type": "getaddrinfo",
        "resolver_network": plan.resolver.network,
        "resolver_address": plan.resolver.address,
    }))
}

pub fn endpoint_fingerprint(plan: &EndpointPlan) -> String {
    let headers: serde_json::Map<String, serde_json::Value> = FINGERPRINT_HEADERS
        .iter()
        .filter(|name| plan.headers.contains(name))
        .map(|name| (name.to_string(), json!(plan.headers.get_all(name))))
        .collect();
    sha256_hex(&json!({
        "kind": KIND_ENDPOINT,
        "network": plan.network.as_str(),
        "address": plan.address,
        "url": plan.url.as_str(),
        "sni": plan.sni,
        "alpn": plan.alpn,
        "cookies": plan.cookies,
        "headers": headers,
    }))
}

/// Wraps a [`Measurer`] and memoizes its results in a [`ProbeCache`].
pub struct CachingMeasurer<M> {
    inner: M,
    cache: Arc<ProbeCache>,
}

impl<M: Measurer> CachingMeasurer<M> {
    pub fn new(inner: M, cache: Arc<ProbeCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<ProbeCache> {
        &self.cache
    }

    // rusqlite blocks, so store access runs on the blocking pool

    async fn read<T: DeserializeOwned>(&self, fingerprint: &str) -> Option<T> {
        let cache = Arc::clone(&self.cache);
        let key = fingerprint.to_string();
        let entry = match tokio::task::spawn_blocking(move || cache.lookup(&key)).await {
            Ok(Ok(entry)) => entry?,
            Ok(Err(e)) => {
                warn!("Cache read failed: {}", e);
                return None;
            }
            Err(e) => {
                warn!("Cache read task failed: {}", e);
                return None;
            }
        };
        match serde_json::from_str(&entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", fingerprint, e);
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, fingerprint: &str, kind: &'static str, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!("Cannot encode cache entry {}: {}", fingerprint, e);
                return;
            }
        };
        let cache = Arc::clone(&self.cache);
        let key = fingerprint.to_string();
        match tokio::task::spawn_blocking(move || cache.put(&key, kind, &json)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Cache write failed: {}", e),
            Err(e) => warn!("Cache write task failed: {}", e),
        }
    }

    pub async fn lookup_dns_cached(&self, plan: &DnsLookupPlan) -> CacheLookup<DnsLookupMeasurement> {
        let fingerprint = dns_fingerprint(plan);
        if let Some(mut hit) = self.read::<DnsLookupMeasurement>(&fingerprint).await {
            debug!("cache hit: dns {}", plan.domain);
            hit.id = next_id();
            hit.url_measurement_id = plan.url_measurement_id;
            hit.cached = true;
            return CacheLookup {
                value: hit,
                cached: true,
            };
        }
        let value = self.inner.lookup_dns(plan).await;
        self.write(&fingerprint, KIND_DNS, &value).await;
        CacheLookup {
            value,
            cached: false,
        }
    }

    pub async fn probe_endpoint_cached(&self, plan: &EndpointPlan) -> CacheLookup<EndpointMeasurement> {
        let fingerprint = endpoint_fingerprint(plan);
        if let Some(mut hit) = self.read::<EndpointMeasurement>(&fingerprint).await {
            debug!("cache hit: {} {} {}", plan.network.as_str(), plan.address, plan.url);
            hit.id = next_id();
            hit.url_measurement_id = plan.url_measurement_id;
            hit.cached = true;
            return CacheLookup {
                value: hit,
                cached: true,
            };
        }
        let value = self.inner.probe_endpoint(plan).await;
        self.write(&fingerprint, KIND_ENDPOINT, &value).await;
        CacheLookup {
            value,
            cached: false,
        }
    }
}

#[async_trait]
impl<M: Measurer> Measurer for CachingMeasurer<M> {
    async fn lookup_dns(&self, plan: &DnsLookupPlan) -> DnsLookupMeasurement {
        self.lookup_dns_cached(plan).await.value
    }

    async fn probe_endpoint(&self, plan: &EndpointPlan) -> EndpointMeasurement {
        self.probe_endpoint_cached(plan).await.value
    }
}
