use crate::headers::Headers;
use crate::result::{DnsResolverInfo, NetworkType};
use serde::{Deserialize, Serialize};
use url::Url;

/// One DNS lookup to perform for a URLMeasurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsLookupPlan {
    pub url_measurement_id: i64,
    pub domain: String,
    pub resolver: DnsResolverInfo,
}

/// One endpoint probe that has not been executed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointPlan {
    pub url_measurement_id: i64,
    pub domain: String,
    pub network: NetworkType,
    /// `host:port` of the endpoint to connect to.
    pub address: String,
    pub sni: String,
    pub alpn: Vec<String>,
    pub url: Url,
    pub headers: Headers,
    pub cookies: Vec<String>,
}

impl EndpointPlan {
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }
}
