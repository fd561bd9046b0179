// The URLMeasurement aggregate: one probing session for one URL

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use url::{Host, Url};
use websteps_scanner::headers::{Headers, new_headers_for_measuring};
use websteps_scanner::{
    DnsLookupMeasurement, DnsLookupPlan, DnsResolverInfo, EndpointMeasurement, next_id,
};

/// The (possibly interim) result of measuring a URL.
///
/// The id is assigned at construction and the `dns` and `endpoint` lists
/// only ever grow, which is why they are reachable through accessors and
/// append methods only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlMeasurement {
    id: i64,

    /// Ids of the endpoint measurements whose redirect produced this
    /// URLMeasurement. Empty for the root.
    pub endpoint_ids: Vec<i64>,

    pub url: Url,
    pub cookies: Vec<String>,
    pub headers: Headers,

    /// Probe both HTTP and HTTPS regardless of the URL scheme.
    pub force_both_schemes: bool,

    pub sni: String,
    pub alpn: Vec<String>,

    /// Value of the `Host` header.
    pub host: String,

    dns: Vec<DnsLookupMeasurement>,
    endpoint: Vec<EndpointMeasurement>,
}

impl UrlMeasurement {
    /// Creates the root URLMeasurement for `raw_url`.
    pub fn new(raw_url: &str) -> Result<Self> {
        let mut parsed = Url::parse(raw_url)?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(CoreError::UnsupportedScheme(other.to_string())),
        }
        if parsed.path().is_empty() {
            parsed.set_path("/");
        }
        parsed.set_fragment(None);
        let domain = host_of(&parsed);
        Ok(Self {
            id: next_id(),
            endpoint_ids: Vec::new(),
            url: parsed,
            cookies: Vec::new(),
            headers: new_headers_for_measuring(),
            force_both_schemes: true,
            sni: domain.clone(),
            alpn: Vec::new(),
            host: domain,
            dns: Vec::new(),
            endpoint: Vec::new(),
        })
    }

    /// Creates a follow-up URLMeasurement reached through a redirect.
    pub(crate) fn follow_up(
        url: Url,
        cookies: Vec<String>,
        headers: Headers,
        alpn: Vec<String>,
    ) -> Self {
        let domain = host_of(&url);
        Self {
            id: next_id(),
            endpoint_ids: Vec::new(),
            url,
            cookies,
            headers,
            force_both_schemes: false,
            sni: domain.clone(),
            alpn,
            host: domain,
            dns: Vec::new(),
            endpoint: Vec::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// The domain inside the URL. IPv6 literals come without brackets.
    pub fn domain(&self) -> String {
        host_of(&self.url)
    }

    pub fn is_http(&self) -> bool {
        self.force_both_schemes || self.url.scheme() == "http"
    }

    pub fn is_https(&self) -> bool {
        self.force_both_schemes || self.url.scheme() == "https"
    }

    pub fn dns(&self) -> &[DnsLookupMeasurement] {
        &self.dns
    }

    pub fn endpoint(&self) -> &[EndpointMeasurement] {
        &self.endpoint
    }

    pub fn add_dns(&mut self, results: impl IntoIterator<Item = DnsLookupMeasurement>) {
        self.dns.extend(results);
    }

    pub fn add_endpoint(&mut self, results: impl IntoIterator<Item = EndpointMeasurement>) {
        self.endpoint.extend(results);
    }

    /// One lookup of this URL's domain per resolver.
    pub fn new_dns_lookup_plans(&self, resolvers: &[DnsResolverInfo]) -> Vec<DnsLookupPlan> {
        let domain = self.domain();
        resolvers
            .iter()
            .map(|resolver| DnsLookupPlan {
                url_measurement_id: self.id,
                domain: domain.clone(),
                resolver: resolver.clone(),
            })
            .collect()
    }
}

fn host_of(url: &Url) -> String {
    match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        None => String::new(),
    }
}
