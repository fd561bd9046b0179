// Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use url::Url;
use websteps_scanner::headers::Headers;
use websteps_scanner::{
    DnsLookupMeasurement, DnsLookupPlan, DnsLookupType, EndpointMeasurement, EndpointPlan,
    Measurer, NetworkType, next_id,
};

pub fn dns(um_id: i64, domain: &str, addresses: &[&str]) -> DnsLookupMeasurement {
    let now = Utc::now();
    DnsLookupMeasurement {
        id: next_id(),
        url_measurement_id: um_id,
        domain: domain.to_string(),
        lookup_type: DnsLookupType::Getaddrinfo,
        resolver_network: "system".to_string(),
        resolver_address: String::new(),
        addresses: addresses.iter().map(|a| a.to_string()).collect(),
        alpns: Vec::new(),
        failure: None,
        started: now,
        finished: now,
        cached: false,
    }
}

/// An HTTPS-RR lookup advertising HTTP/3.
pub fn h3_dns(um_id: i64, domain: &str, addresses: &[&str]) -> DnsLookupMeasurement {
    let mut out = dns(um_id, domain, addresses);
    out.lookup_type = DnsLookupType::Https;
    out.alpns = vec!["h3".to_string(), "h2".to_string()];
    out
}

pub fn endpoint(
    um_id: i64,
    url: &str,
    network: NetworkType,
    address: &str,
    status: Option<u16>,
) -> EndpointMeasurement {
    let now = Utc::now();
    EndpointMeasurement {
        id: next_id(),
        url_measurement_id: um_id,
        url: Url::parse(url).unwrap(),
        network,
        address: address.to_string(),
        failure: None,
        failed_operation: None,
        request_headers: Headers::new(),
        status_code: status,
        response_headers: Headers::new(),
        location: None,
        cookies: Vec::new(),
        response_body_length: Some(0),
        started: now,
        finished: now,
        cached: false,
    }
}

pub fn redirect(
    um_id: i64,
    url: &str,
    address: &str,
    status: u16,
    location: &str,
    cookies: &[&str],
) -> EndpointMeasurement {
    let mut out = endpoint(um_id, url, NetworkType::Tcp, address, Some(status));
    out.location = Some(Url::parse(location).unwrap());
    out.cookies = cookies.iter().map(|c| c.to_string()).collect();
    out
}

/// What a scripted server answers for one URL.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub status: u16,
    pub location: Option<String>,
    pub set_cookies: Vec<String>,
}

/// In-memory measurer driven by a script of DNS answers and responses.
#[derive(Default)]
pub struct ScriptedMeasurer {
    pub addresses: HashMap<String, Vec<String>>,
    pub h3_domains: Vec<String>,
    pub responses: HashMap<String, ScriptedResponse>,
    pub dns_calls: AtomicUsize,
    pub probe_calls: AtomicUsize,
    pub probed: Mutex<Vec<EndpointPlan>>,
}

impl ScriptedMeasurer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dns(mut self, domain: &str, addresses: &[&str]) -> Self {
        self.addresses.insert(
            domain.to_string(),
            addresses.iter().map(|a| a.to_string()).collect(),
        );
        self
    }

    pub fn with_h3(mut self, domain: &str) -> Self {
        self.h3_domains.push(domain.to_string());
        self
    }

    pub fn with_redirect(mut self, url: &str, status: u16, location: &str) -> Self {
        self.responses.insert(
            url.to_string(),
            ScriptedResponse {
                status,
                location: Some(location.to_string()),
                set_cookies: Vec::new(),
            },
        );
        self
    }

    pub fn with_response(mut self, url: &str, response: ScriptedResponse) -> Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    pub fn probe_count(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn dns_count(&self) -> usize {
        self.dns_calls.load(Ordering::SeqCst)
    }

    pub fn probed_plans(&self) -> Vec<EndpointPlan> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Measurer for ScriptedMeasurer {
    async fn lookup_dns(&self, plan: &DnsLookupPlan) -> DnsLookupMeasurement {
        self.dns_calls.fetch_add(1, Ordering::SeqCst);
        let addrs: Vec<&str> = self
            .addresses
            .get(&plan.domain)
            .map(|a| a.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default();
        let mut out = if self.h3_domains.contains(&plan.domain) {
            h3_dns(plan.url_measurement_id, &plan.domain, &addrs)
        } else {
            dns(plan.url_measurement_id, &plan.domain, &addrs)
        };
        if out.addresses.is_empty() {
            out.failure = Some("dns_no_answer".to_string());
        }
        out
    }

    async fn probe_endpoint(&self, plan: &EndpointPlan) -> EndpointMeasurement {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.probed.lock().unwrap().push(plan.clone());
        let mut out = endpoint(
            plan.url_measurement_id,
            plan.url.as_str(),
            plan.network,
            &plan.address,
            Some(200),
        );
        out.request_headers = plan.headers.clone();
        out.cookies = plan.cookies.clone();
        if let Some(response) = self.responses.get(plan.url.as_str()) {
            out.status_code = Some(response.status);
            out.location = response
                .location
                .as_ref()
                .map(|l| plan.url.join(l).unwrap());
            out.cookies.extend(response.set_cookies.iter().cloned());
        }
        out
    }
}
