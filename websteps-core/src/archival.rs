// Conversion to the archival data format
//
// Every conversion borrows the measurement and never mutates it.

use crate::model::UrlMeasurement;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use websteps_scanner::headers::Headers;
use websteps_scanner::{DnsLookupMeasurement, EndpointMeasurement};

fn seconds_since(begin: DateTime<Utc>, t: DateTime<Utc>) -> f64 {
    (t - begin).num_microseconds().unwrap_or_default() as f64 / 1e6
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivalDnsLookupMeasurement {
    pub id: i64,
    pub url_measurement_id: i64,
    pub domain: String,
    pub lookup_type: String,
    pub resolver_network: String,
    pub resolver_address: String,
    pub addresses: Vec<String>,
    pub alpns: Vec<String>,
    pub failure: Option<String>,
    /// Seconds since the beginning of the session.
    pub t0: f64,
    pub t: f64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cached: bool,
}

impl ArchivalDnsLookupMeasurement {
    pub fn from_measurement(m: &DnsLookupMeasurement, begin: DateTime<Utc>) -> Self {
        Self {
            id: m.id,
            url_measurement_id: m.url_measurement_id,
            domain: m.domain.clone(),
            lookup_type: m.lookup_type.as_str().to_string(),
            resolver_network: m.resolver_network.clone(),
            resolver_address: m.resolver_address.clone(),
            addresses: m.addresses.clone(),
            alpns: m.alpns.clone(),
            failure: m.failure.clone(),
            t0: seconds_since(begin, m.started),
            t: seconds_since(begin, m.finished),
            cached: m.cached,
        }
    }
}

/// The HTTP round trip of an endpoint measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivalHttpRoundTrip {
    pub request_headers: Headers,
    pub status_code: u16,
    pub response_headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_length: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivalEndpointMeasurement {
    pub id: i64,
    pub url_measurement_id: i64,
    pub url: String,
    pub network: String,
    pub endpoint: String,
    pub failure: Option<String>,
    pub failed_operation: Option<String>,
    pub cookies: Vec<String>,
    /// Missing when no response was received.
    pub request: Option<ArchivalHttpRoundTrip>,
    pub t0: f64,
    pub t: f64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cached: bool,
}

impl ArchivalEndpointMeasurement {
    pub fn from_measurement(m: &EndpointMeasurement, begin: DateTime<Utc>) -> Self {
        let request = m.status_code.map(|status_code| ArchivalHttpRoundTrip {
            request_headers: m.request_headers.clone(),
            status_code,
            response_headers: m.response_headers.clone(),
            location: m.location.as_ref().map(|l| l.to_string()),
            body_length: m.response_body_length,
        });
        Self {
            id: m.id,
            url_measurement_id: m.url_measurement_id,
            url: m.url.to_string(),
            network: m.network.as_str().to_string(),
            endpoint: m.address.clone(),
            failure: m.failure.clone(),
            failed_operation: m.failed_operation.clone(),
            cookies: m.cookies.clone(),
            request,
            t0: seconds_since(begin, m.started),
            t: seconds_since(begin, m.finished),
            cached: m.cached,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivalUrlMeasurement {
    pub id: i64,
    /// Endpoint measurements whose redirect produced this URL.
    pub endpoint_ids: Vec<i64>,
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sni: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host_header: String,
    pub dns: Vec<ArchivalDnsLookupMeasurement>,
    pub endpoint: Vec<ArchivalEndpointMeasurement>,
}

impl ArchivalUrlMeasurement {
    pub fn from_measurement(m: &UrlMeasurement, begin: DateTime<Utc>) -> Self {
        Self {
            id: m.id(),
            endpoint_ids: m.endpoint_ids.clone(),
            url: m.url.to_string(),
            sni: m.sni.clone(),
            alpn: m.alpn.clone(),
            host_header: m.host.clone(),
            dns: m
                .dns()
                .iter()
                .map(|d| ArchivalDnsLookupMeasurement::from_measurement(d, begin))
                .collect(),
            endpoint: m
                .endpoint()
                .iter()
                .map(|e| ArchivalEndpointMeasurement::from_measurement(e, begin))
                .collect(),
        }
    }
}

/// Converts a whole traversal, in visit order.
pub fn to_archival(tree: &[UrlMeasurement], begin: DateTime<Utc>) -> Vec<ArchivalUrlMeasurement> {
    tree.iter()
        .map(|um| ArchivalUrlMeasurement::from_measurement(um, begin))
        .collect()
}
