use crate::error::{Result, ScanError};
use crate::headers::Headers;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Tcp,
    Quic,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Tcp => "tcp",
            NetworkType::Quic => "quic",
        }
    }
}

impl FromStr for NetworkType {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(NetworkType::Tcp),
            "quic" | "udp" => Ok(NetworkType::Quic),
            _ => Err(ScanError::UnknownNetwork(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DnsLookupType {
    /// Address lookup through the operating system resolver API.
    Getaddrinfo,
    /// HTTPS (SVCB) record lookup, which also carries ALPN hints.
    Https,
}

impl DnsLookupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DnsLookupType::Getaddrinfo => "getaddrinfo",
            DnsLookupType::Https => "https",
        }
    }
}

/// Describes which resolver to use for a DNS lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DnsResolverInfo {
    /// "system", "udp" or "doh"
    pub network: String,
    pub address: String,
}

impl DnsResolverInfo {
    pub fn system() -> Self {
        Self {
            network: "system".to_string(),
            address: String::new(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.network == "system"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsLookupMeasurement {
    pub id: i64,
    pub url_measurement_id: i64,
    pub domain: String,
    pub lookup_type: DnsLookupType,
    pub resolver_network: String,
    pub resolver_address: String,
    pub addresses: Vec<String>,
    pub alpns: Vec<String>,
    pub failure: Option<String>,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    /// Set when the result was replayed from a probe cache.
    #[serde(default)]
    pub cached: bool,
}

impl DnsLookupMeasurement {
    /// Whether this lookup tells us the domain speaks HTTP/3.
    pub fn supports_http3(&self) -> bool {
        self.lookup_type == DnsLookupType::Https && self.alpns.iter().any(|a| a == "h3")
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointMeasurement {
    pub id: i64,
    pub url_measurement_id: i64,
    pub url: Url,
    pub network: NetworkType,
    /// The probed `host:port` endpoint.
    pub address: String,
    pub failure: Option<String>,
    pub failed_operation: Option<String>,
    pub request_headers: Headers,
    pub status_code: Option<u16>,
    pub response_headers: Headers,
    pub location: Option<Url>,
    /// Request cookies merged with any `Set-Cookie` in the response.
    pub cookies: Vec<String>,
    pub response_body_length: Option<u64>,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    #[serde(default)]
    pub cached: bool,
}

impl EndpointMeasurement {
    /// Extracts the literal IP address from the probed endpoint.
    pub fn ip_address(&self) -> Result<IpAddr> {
        if let Ok(sockaddr) = self.address.parse::<SocketAddr>() {
            return Ok(sockaddr.ip());
        }
        self.address
            .parse::<IpAddr>()
            .map_err(|_| ScanError::AddressParse(self.address.clone()))
    }

    pub fn is_http_measurement(&self) -> bool {
        self.url.scheme() == "http" && self.network == NetworkType::Tcp
    }

    pub fn is_https_measurement(&self) -> bool {
        self.url.scheme() == "https" && self.network == NetworkType::Tcp
    }

    pub fn is_http3_measurement(&self) -> bool {
        self.url.scheme() == "https" && self.network == NetworkType::Quic
    }

    /// Whether the response advertised HTTP/3 through `Alt-Svc`.
    pub fn supports_alt_svc_http3(&self) -> bool {
        self.response_headers
            .get_all("alt-svc")
            .iter()
            .flat_map(|value| value.split(','))
            .any(|entry| {
                let proto = entry.trim().split('=').next().unwrap_or_default();
                proto == "h3"
            })
    }

    /// Returns the status code, or zero when there was no response.
    pub fn response_status_code(&self) -> u16 {
        self.status_code.unwrap_or(0)
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}
