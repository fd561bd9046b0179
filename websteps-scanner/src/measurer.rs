use crate::headers::{Headers, cookie_header, merge_cookies};
use crate::plan::{DnsLookupPlan, EndpointPlan};
use crate::result::{DnsLookupMeasurement, DnsLookupType, EndpointMeasurement, NetworkType};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use reqwest::header::{COOKIE, LOCATION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

static NEXT_ID: AtomicI64 = AtomicI64::new(1);

/// Returns a process-unique, monotonically increasing id.
///
/// URLMeasurements, DNS lookups and endpoint measurements all draw from
/// the same counter so an id never names two different things.
pub fn next_id() -> i64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// The capability of running network probes.
///
/// Probes never fail as a call: transport errors are recorded inside the
/// returned measurement's `failure` field.
#[async_trait]
pub trait Measurer: Send + Sync {
    async fn lookup_dns(&self, plan: &DnsLookupPlan) -> DnsLookupMeasurement;

    async fn probe_endpoint(&self, plan: &EndpointPlan) -> EndpointMeasurement;
}

#[async_trait]
impl<M: Measurer + ?Sized> Measurer for Arc<M> {
    async fn lookup_dns(&self, plan: &DnsLookupPlan) -> DnsLookupMeasurement {
        (**self).lookup_dns(plan).await
    }

    async fn probe_endpoint(&self, plan: &EndpointPlan) -> EndpointMeasurement {
        (**self).probe_endpoint(plan).await
    }
}

/// Measurer that talks to the network.
pub struct DirectMeasurer {
    timeout_secs: u64,
    user_agent: Option<String>,
}

impl DirectMeasurer {
    pub fn new() -> Self {
        Self::with_timeout(10)
    }

    pub fn with_timeout(timeout_secs: u64) -> Self {
        Self {
            timeout_secs,
            user_agent: None,
        }
    }

    /// Overrides the `User-Agent` of plans that do not set one.
    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = Some(user_agent);
        self
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Builds a client that sends every request for `domain` to `addr`.
    fn client_for(&self, domain: &str, addr: SocketAddr) -> Result<Client, reqwest::Error> {
        let mut builder = Client::builder()
            .timeout(self.timeout())
            .connect_timeout(Duration::from_secs((self.timeout_secs / 2).max(1)))
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .pool_max_idle_per_host(0);
        if addr.ip().to_string() != domain {
            builder = builder.resolve(domain, addr);
        }
        if let Some(ref ua) = self.user_agent {
            builder = builder.user_agent(ua.clone());
        }
        builder.build()
    }
}

impl Default for DirectMeasurer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Measurer for DirectMeasurer {
    async fn lookup_dns(&self, plan: &DnsLookupPlan) -> DnsLookupMeasurement {
        let started = Utc::now();
        let mut out = DnsLookupMeasurement {
            id: next_id(),
            url_measurement_id: plan.url_measurement_id,
            domain: plan.domain.clone(),
            lookup_type: DnsLookupType::Getaddrinfo,
            resolver_network: plan.resolver.network.clone(),
            resolver_address: plan.resolver.address.clone(),
            addresses: Vec::new(),
            alpns: Vec::new(),
            failure: None,
            started,
            finished: started,
            cached: false,
        };

        if !plan.resolver.is_system() {
            warn!(
                "Resolver {}/{} is not supported",
                plan.resolver.network, plan.resolver.address
            );
            out.failure = Some("unsupported_resolver".to_string());
            out.finished = Utc::now();
            return out;
        }

        debug!("Resolving {}", plan.domain);
        let lookup = tokio::net::lookup_host((plan.domain.as_str(), 0));
        match tokio::time::timeout(self.timeout(), lookup).await {
            Ok(Ok(addrs)) => {
                for addr in addrs {
                    let ip = addr.ip().to_string();
                    if !out.addresses.contains(&ip) {
                        out.addresses.push(ip);
                    }
                }
                if out.addresses.is_empty() {
                    out.failure = Some("dns_no_answer".to_string());
                }
            }
            Ok(Err(e)) => {
                debug!("Lookup of {} failed: {}", plan.domain, e);
                out.failure = Some("dns_lookup_error".to_string());
            }
            Err(_) => {
                out.failure = Some("generic_timeout_error".to_string());
            }
        }
        out.finished = Utc::now();
        out
    }

    async fn probe_endpoint(&self, plan: &EndpointPlan) -> EndpointMeasurement {
        let started = Utc::now();
        let mut out = EndpointMeasurement {
            id: next_id(),
            url_measurement_id: plan.url_measurement_id,
            url: plan.url.clone(),
            network: plan.network,
            address: plan.address.clone(),
            failure: None,
            failed_operation: None,
            request_headers: plan.headers.clone(),
            status_code: None,
            response_headers: Headers::new(),
            location: None,
            cookies: plan.cookies.clone(),
            response_body_length: None,
            started,
            finished: started,
            cached: false,
        };

        if plan.network == NetworkType::Quic {
            out.failure = Some("quic_not_supported".to_string());
            out.failed_operation = Some("quic_handshake".to_string());
            out.finished = Utc::now();
            return out;
        }

        let addr: SocketAddr = match plan.address.parse() {
            Ok(addr) => addr,
            Err(_) => {
                out.failure = Some("invalid_endpoint".to_string());
                out.failed_operation = Some("connect".to_string());
                out.finished = Utc::now();
                return out;
            }
        };

        let client = match self.client_for(&plan.domain, addr) {
            Ok(client) => client,
            Err(e) => {
                out.failure = Some(e.to_string());
                out.failed_operation = Some("connect".to_string());
                out.finished = Utc::now();
                return out;
            }
        };

        debug!("Probing {} via {}/{}", plan.url, plan.address, plan.network.as_str());
        let mut request = client.get(plan.url.clone());
        out.request_headers.remove("cookie");
        for (name, value) in plan.headers.iter() {
            // cookies come from `plan.cookies` only
            if name.eq_ignore_ascii_case("cookie") {
                continue;
            }
            request = request.header(name, value);
        }
        if let Some(cookie) = cookie_header(&plan.cookies) {
            request = request.header(COOKIE, cookie.clone());
            out.request_headers.set("Cookie", cookie);
        }

        match request.send().await {
            Ok(response) => {
                out.status_code = Some(response.status().as_u16());
                out.response_headers = Headers::from_header_map(response.headers());
                out.location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|loc| plan.url.join(loc).ok());
                let set_cookie = out.response_headers.get_all("set-cookie").to_vec();
                out.cookies = merge_cookies(&plan.cookies, &set_cookie);
                match response.bytes().await {
                    Ok(body) => out.response_body_length = Some(body.len() as u64),
                    Err(e) => {
                        let (failure, _) = classify_failure(&e);
                        out.failure = Some(failure);
                        out.failed_operation = Some("http_body".to_string());
                    }
                }
            }
            Err(e) => {
                let (failure, operation) = classify_failure(&e);
                debug!("Probe of {} via {} failed: {}", plan.url, plan.address, failure);
                out.failure = Some(failure);
                out.failed_operation = Some(operation);
            }
        }
        out.finished = Utc::now();
        out
    }
}

/// Maps a transport error to a stable failure string and the operation that failed.
fn classify_failure(err: &reqwest::Error) -> (String, String) {
    let operation = if err.is_connect() {
        "connect"
    } else {
        "http_round_trip"
    };
    if err.is_timeout() {
        return ("generic_timeout_error".to_string(), operation.to_string());
    }
    let chain = error_chain(err).to_lowercase();
    if chain.contains("refused") {
        ("connection_refused".to_string(), "connect".to_string())
    } else if chain.contains("reset") {
        ("connection_reset".to_string(), operation.to_string())
    } else if chain.contains("certificate") || chain.contains("tls") || chain.contains("ssl") {
        ("ssl_failed_handshake".to_string(), "tls_handshake".to_string())
    } else if err.is_connect() {
        ("connect_error".to_string(), operation.to_string())
    } else {
        (chain, operation.to_string())
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}
