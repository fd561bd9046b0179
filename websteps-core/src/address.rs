// Address book: candidate IP addresses of a URLMeasurement

use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::error::PlanningError;
use crate::model::UrlMeasurement;
use std::collections::HashMap;
use std::net::IpAddr;
use std::ops::{BitOr, BitOrAssign};
use url::Url;

/// Feature flags of a candidate address. Flags are only ever OR-ed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AddressFlags(u8);

impl AddressFlags {
    pub const NONE: AddressFlags = AddressFlags(0);
    /// The address supports HTTP/3.
    pub const HTTP3: AddressFlags = AddressFlags(1 << 0);
    /// Already tested using cleartext HTTP.
    pub const TESTED_HTTP: AddressFlags = AddressFlags(1 << 1);
    /// Already tested using HTTPS over TCP.
    pub const TESTED_HTTPS: AddressFlags = AddressFlags(1 << 2);
    /// Already tested using HTTP/3.
    pub const TESTED_HTTP3: AddressFlags = AddressFlags(1 << 3);

    pub fn contains(&self, other: AddressFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

impl BitOr for AddressFlags {
    type Output = AddressFlags;

    fn bitor(self, rhs: AddressFlags) -> AddressFlags {
        AddressFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for AddressFlags {
    fn bitor_assign(&mut self, rhs: AddressFlags) {
        self.0 |= rhs.0;
    }
}

/// An address associated with a given URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlAddress {
    pub url_measurement_id: i64,
    pub url: Url,
    /// IPv4 or IPv6 literal.
    pub address: String,
    pub flags: AddressFlags,
}

impl UrlAddress {
    /// The domain for which the address should be valid. The DNS may be
    /// lying to us, though.
    pub fn domain(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn supports_http3(&self) -> bool {
        self.flags.contains(AddressFlags::HTTP3)
    }

    pub fn already_tested_http(&self) -> bool {
        self.flags.contains(AddressFlags::TESTED_HTTP)
    }

    pub fn already_tested_https(&self) -> bool {
        self.flags.contains(AddressFlags::TESTED_HTTPS)
    }

    pub fn already_tested_http3(&self) -> bool {
        self.flags.contains(AddressFlags::TESTED_HTTP3)
    }
}

impl UrlMeasurement {
    /// Builds the list of candidate addresses from the DNS and endpoint
    /// results collected so far. The boolean tells whether the list is
    /// non-empty. List order is unspecified.
    pub fn url_address_list(&self) -> (Vec<UrlAddress>, bool) {
        self.url_address_list_with(&TracingSink)
    }

    pub fn url_address_list_with(&self, sink: &dyn DiagnosticSink) -> (Vec<UrlAddress>, bool) {
        let mut uniq: HashMap<String, AddressFlags> = HashMap::new();

        for dns in self.dns() {
            let mut flags = AddressFlags::NONE;
            if dns.supports_http3() {
                flags |= AddressFlags::HTTP3;
            }
            for addr in &dns.addresses {
                // CNAMEs may slip through
                if addr.parse::<IpAddr>().is_err() {
                    sink.skipped(&PlanningError::AddressParse {
                        address: addr.clone(),
                        context: "dns".to_string(),
                    });
                    continue;
                }
                *uniq.entry(addr.clone()).or_default() |= flags;
            }
        }

        for epnt in self.endpoint() {
            let ip = match epnt.ip_address() {
                Ok(ip) => ip.to_string(),
                Err(_) => {
                    sink.skipped(&PlanningError::AddressParse {
                        address: epnt.address.clone(),
                        context: "endpoint".to_string(),
                    });
                    continue;
                }
            };
            let entry = uniq.entry(ip).or_default();
            if epnt.is_http_measurement() {
                *entry |= AddressFlags::TESTED_HTTP;
            }
            if epnt.is_https_measurement() {
                *entry |= AddressFlags::TESTED_HTTPS;
            }
            if epnt.is_http3_measurement() {
                *entry |= AddressFlags::TESTED_HTTP3;
            }
            if epnt.supports_alt_svc_http3() {
                *entry |= AddressFlags::HTTP3;
            }
        }

        let out: Vec<UrlAddress> = uniq
            .into_iter()
            .map(|(address, flags)| UrlAddress {
                url_measurement_id: self.id(),
                url: self.url.clone(),
                address,
                flags,
            })
            .collect();
        let has_any = !out.is_empty();
        (out, has_any)
    }
}
