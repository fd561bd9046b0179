// Endpoint planner: which {address, protocol} pairs still need probing

use crate::address::UrlAddress;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::error::PlanningError;
use crate::model::UrlMeasurement;
use std::net::{IpAddr, SocketAddr};
use url::Url;
use websteps_scanner::{EndpointPlan, NetworkType};

/// Returns the port to use for `url`: the explicit one, else the
/// scheme's default.
pub fn port_from_url(url: &Url) -> Result<u16, PlanningError> {
    if let Some(port) = url.port() {
        return Ok(port);
    }
    match url.scheme() {
        "https" => Ok(443),
        "http" => Ok(80),
        _ => Err(PlanningError::PortResolution {
            url: url.to_string(),
        }),
    }
}

/// The ALPN list to offer when speaking HTTP over `network`.
pub fn alpn_for_http_endpoint(network: NetworkType) -> Vec<String> {
    match network {
        NetworkType::Quic => vec!["h3".to_string()],
        NetworkType::Tcp => vec!["h2".to_string(), "http/1.1".to_string()],
    }
}

/// Joins an address and a port, bracketing IPv6 literals.
pub fn join_host_port(address: &str, port: u16) -> String {
    match address.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port).to_string(),
        Err(_) => format!("{address}:{port}"),
    }
}

/// Copies `url` replacing its scheme. Everything else, including an
/// explicit port, is kept.
fn with_scheme(url: &Url, scheme: &str) -> Url {
    let mut out = url.clone();
    if out.scheme() != scheme && out.set_scheme(scheme).is_err() {
        // only special-to-special scheme changes are possible; http and
        // https are both special, so this never happens for our inputs
        return url.clone();
    }
    out
}

impl UrlMeasurement {
    /// Plans one probe per untested {address, protocol} pair. The boolean
    /// tells whether any plan was emitted.
    pub fn new_endpoint_plan(&self) -> (Vec<EndpointPlan>, bool) {
        self.new_endpoint_plan_with(&TracingSink)
    }

    pub fn new_endpoint_plan_with(&self, sink: &dyn DiagnosticSink) -> (Vec<EndpointPlan>, bool) {
        let (addrs, _) = self.url_address_list_with(sink);
        let mut out = Vec::new();
        for addr in &addrs {
            if self.is_http() && !addr.already_tested_http() {
                self.push_plan(&mut out, sink, addr, NetworkType::Tcp, "http");
            }
            if self.is_https() && !addr.already_tested_https() {
                self.push_plan(&mut out, sink, addr, NetworkType::Tcp, "https");
            }
            if self.is_https() && addr.supports_http3() && !addr.already_tested_http3() {
                self.push_plan(&mut out, sink, addr, NetworkType::Quic, "https");
            }
        }
        let has_any = !out.is_empty();
        (out, has_any)
    }

    fn push_plan(
        &self,
        out: &mut Vec<EndpointPlan>,
        sink: &dyn DiagnosticSink,
        addr: &UrlAddress,
        network: NetworkType,
        scheme: &str,
    ) {
        let url = with_scheme(&self.url, scheme);
        let port = match port_from_url(&url) {
            Ok(port) => port,
            Err(error) => {
                sink.skipped(&error);
                return;
            }
        };
        out.push(EndpointPlan {
            url_measurement_id: self.id(),
            domain: self.domain(),
            network,
            address: join_host_port(&addr.address, port),
            sni: self.sni.clone(),
            alpn: alpn_for_http_endpoint(network),
            url,
            headers: self.headers.clone(),
            cookies: self.cookies.clone(),
        });
    }
}
