// Tests for the URLMeasurement model, address book and endpoint planner

mod common;

use common::{dns, endpoint, h3_dns};
use websteps_core::error::CoreError;
use websteps_core::{AddressFlags, CollectingSink, PlanningError, UrlMeasurement};
use websteps_scanner::headers::{DEFAULT_USER_AGENT, Headers};
use websteps_scanner::{DnsResolverInfo, NetworkType};

// ============================================================================
// URLMeasurement Tests
// ============================================================================

#[test]
fn test_new_url_measurement_defaults() {
    let um = UrlMeasurement::new("http://example.org").unwrap();
    assert_eq!(um.url.as_str(), "http://example.org/");
    assert!(um.force_both_schemes);
    assert!(um.endpoint_ids.is_empty());
    assert!(um.dns().is_empty());
    assert!(um.endpoint().is_empty());
    assert_eq!(um.domain(), "example.org");
    assert_eq!(um.sni, "example.org");
    assert_eq!(um.host, "example.org");
    assert_eq!(um.headers.get("user-agent"), Some(DEFAULT_USER_AGENT));
}

#[test]
fn test_new_url_measurement_strips_fragment() {
    let um = UrlMeasurement::new("https://example.org/page#section").unwrap();
    assert_eq!(um.url.as_str(), "https://example.org/page");
}

#[test]
fn test_new_url_measurement_unsupported_scheme() {
    let err = UrlMeasurement::new("ftp://example.org/").unwrap_err();
    assert!(matches!(err, CoreError::UnsupportedScheme(ref s) if s == "ftp"));
}

#[test]
fn test_new_url_measurement_invalid_url() {
    let err = UrlMeasurement::new("not a url").unwrap_err();
    assert!(matches!(err, CoreError::InvalidUrl(_)));
}

#[test]
fn test_ids_are_unique() {
    let a = UrlMeasurement::new("http://example.org").unwrap();
    let b = UrlMeasurement::new("http://example.org").unwrap();
    assert_ne!(a.id(), b.id());
    assert!(b.id() > a.id());
}

#[test]
fn test_scheme_predicates() {
    let mut um = UrlMeasurement::new("http://example.org").unwrap();
    assert!(um.is_http());
    assert!(um.is_https());

    um.force_both_schemes = false;
    assert!(um.is_http());
    assert!(!um.is_https());
}

#[test]
fn test_ipv6_domain_has_no_brackets() {
    let um = UrlMeasurement::new("http://[2606:2800::1]/").unwrap();
    assert_eq!(um.domain(), "2606:2800::1");
}

#[test]
fn test_new_dns_lookup_plans() {
    let um = UrlMeasurement::new("https://example.org/").unwrap();
    let resolvers = vec![
        DnsResolverInfo::system(),
        DnsResolverInfo {
            network: "udp".to_string(),
            address: "8.8.8.8:53".to_string(),
        },
    ];
    let plans = um.new_dns_lookup_plans(&resolvers);
    assert_eq!(plans.len(), 2);
    assert!(plans.iter().all(|p| p.domain == "example.org"));
    assert!(plans.iter().all(|p| p.url_measurement_id == um.id()));
}

// ============================================================================
// Address Book Tests
// ============================================================================

#[test]
fn test_address_list_empty() {
    let um = UrlMeasurement::new("http://example.org").unwrap();
    let (addrs, any) = um.url_address_list();
    assert!(addrs.is_empty());
    assert!(!any);
}

#[test]
fn test_address_list_dedups_and_flags() {
    let mut um = UrlMeasurement::new("http://example.org").unwrap();
    let id = um.id();
    um.add_dns([
        dns(id, "example.org", &["93.184.216.34", "2606:2800::1"]),
        h3_dns(id, "example.org", &["93.184.216.34"]),
    ]);
    let (addrs, any) = um.url_address_list();
    assert!(any);
    assert_eq!(addrs.len(), 2);

    let v4 = addrs.iter().find(|a| a.address == "93.184.216.34").unwrap();
    assert!(v4.supports_http3());
    assert!(!v4.already_tested_http());
    assert_eq!(v4.url_measurement_id, id);
    assert_eq!(v4.domain(), "example.org");

    let v6 = addrs.iter().find(|a| a.address == "2606:2800::1").unwrap();
    assert!(!v6.supports_http3());
}

#[test]
fn test_address_list_endpoint_flags() {
    let mut um = UrlMeasurement::new("http://example.org").unwrap();
    let id = um.id();
    um.add_dns([dns(id, "example.org", &["93.184.216.34"])]);

    let mut https = endpoint(id, "https://example.org/", NetworkType::Tcp, "93.184.216.34:443", Some(200));
    https.response_headers.set("alt-svc", "h3=\":443\"; ma=86400");
    um.add_endpoint([
        endpoint(id, "http://example.org/", NetworkType::Tcp, "93.184.216.34:80", Some(200)),
        https,
        endpoint(id, "https://example.org/", NetworkType::Quic, "[2606:2800::1]:443", None),
    ]);

    let (addrs, _) = um.url_address_list();
    let v4 = addrs.iter().find(|a| a.address == "93.184.216.34").unwrap();
    assert!(v4.already_tested_http());
    assert!(v4.already_tested_https());
    assert!(!v4.already_tested_http3());
    assert!(v4.supports_http3());

    // endpoints alone contribute addresses too
    let v6 = addrs.iter().find(|a| a.address == "2606:2800::1").unwrap();
    assert!(v6.already_tested_http3());
    assert!(!v6.already_tested_http());
}

#[test]
fn test_address_list_skips_non_ip_entries() {
    let mut um = UrlMeasurement::new("http://example.org").unwrap();
    let id = um.id();
    um.add_dns([dns(id, "example.org", &["cname.example.net", "10.0.0.1"])]);
    um.add_endpoint([endpoint(id, "http://example.org/", NetworkType::Tcp, "example.org:80", Some(200))]);

    let sink = CollectingSink::new();
    let (addrs, any) = um.url_address_list_with(&sink);
    assert!(any);
    assert_eq!(addrs.len(), 1);
    assert_eq!(addrs[0].address, "10.0.0.1");

    let errors = sink.errors();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| matches!(e, PlanningError::AddressParse { .. })));
}

#[test]
fn test_address_list_is_idempotent() {
    let mut um = UrlMeasurement::new("http://example.org").unwrap();
    let id = um.id();
    um.add_dns([h3_dns(id, "example.org", &["1.1.1.1", "1.0.0.1"])]);
    um.add_endpoint([endpoint(id, "http://example.org/", NetworkType::Tcp, "1.1.1.1:80", Some(200))]);

    let mut first: Vec<(String, u8)> = um
        .url_address_list()
        .0
        .into_iter()
        .map(|a| (a.address, a.flags.bits()))
        .collect();
    let mut second: Vec<(String, u8)> = um
        .url_address_list()
        .0
        .into_iter()
        .map(|a| (a.address, a.flags.bits()))
        .collect();
    first.sort();
    second.sort();
    assert_eq!(first, second);
}

#[test]
fn test_flags_only_accumulate() {
    let mut um = UrlMeasurement::new("http://example.org").unwrap();
    let id = um.id();
    um.add_dns([h3_dns(id, "example.org", &["1.1.1.1"])]);
    let before = um.url_address_list().0[0].flags;

    // a later plain lookup does not clear the HTTP/3 flag
    um.add_dns([dns(id, "example.org", &["1.1.1.1"])]);
    um.add_endpoint([endpoint(id, "http://example.org/", NetworkType::Tcp, "1.1.1.1:80", Some(200))]);
    let after = um.url_address_list().0[0].flags;

    assert!(after.contains(before));
    assert!(after.contains(AddressFlags::HTTP3 | AddressFlags::TESTED_HTTP));
}

// ============================================================================
// Endpoint Planner Tests
// ============================================================================

#[test]
fn test_plan_root_with_h3_address() {
    let mut um = UrlMeasurement::new("http://example.org").unwrap();
    let id = um.id();
    um.add_dns([h3_dns(id, "example.org", &["93.184.216.34"])]);

    let (plans, any) = um.new_endpoint_plan();
    assert!(any);
    assert_eq!(plans.len(), 3);

    let http = plans.iter().find(|p| p.scheme() == "http").unwrap();
    assert_eq!(http.network, NetworkType::Tcp);
    assert_eq!(http.address, "93.184.216.34:80");
    assert_eq!(http.alpn, vec!["h2", "http/1.1"]);

    let https_tcp = plans
        .iter()
        .find(|p| p.scheme() == "https" && p.network == NetworkType::Tcp)
        .unwrap();
    assert_eq!(https_tcp.address, "93.184.216.34:443");
    assert_eq!(https_tcp.url.as_str(), "https://example.org/");

    let quic = plans.iter().find(|p| p.network == NetworkType::Quic).unwrap();
    assert_eq!(quic.address, "93.184.216.34:443");
    assert_eq!(quic.alpn, vec!["h3"]);
    assert_eq!(quic.sni, "example.org");
    assert!(plans.iter().all(|p| p.url_measurement_id == id));
}

#[test]
fn test_plan_without_h3_skips_quic() {
    let mut um = UrlMeasurement::new("http://example.org").unwrap();
    let id = um.id();
    um.add_dns([dns(id, "example.org", &["93.184.216.34"])]);

    let (plans, _) = um.new_endpoint_plan();
    assert_eq!(plans.len(), 2);
    assert!(plans.iter().all(|p| p.network == NetworkType::Tcp));
}

#[test]
fn test_plan_respects_scheme_when_not_forced() {
    let mut um = UrlMeasurement::new("https://example.org/login").unwrap();
    um.force_both_schemes = false;
    let id = um.id();
    um.add_dns([h3_dns(id, "example.org", &["93.184.216.34"])]);

    let (plans, _) = um.new_endpoint_plan();
    assert_eq!(plans.len(), 2);
    assert!(plans.iter().all(|p| p.scheme() == "https"));
}

#[test]
fn test_plan_never_repeats_tested_pairs() {
    let mut um = UrlMeasurement::new("http://example.org").unwrap();
    let id = um.id();
    um.add_dns([h3_dns(id, "example.org", &["93.184.216.34", "2606:2800::1"])]);
    um.add_endpoint([
        endpoint(id, "http://example.org/", NetworkType::Tcp, "93.184.216.34:80", Some(200)),
        endpoint(id, "https://example.org/", NetworkType::Quic, "93.184.216.34:443", None),
    ]);

    let (plans, _) = um.new_endpoint_plan();
    let v4: Vec<_> = plans
        .iter()
        .filter(|p| p.address.starts_with("93.184.216.34"))
        .collect();
    assert_eq!(v4.len(), 1);
    assert_eq!(v4[0].scheme(), "https");
    assert_eq!(v4[0].network, NetworkType::Tcp);

    let v6: Vec<_> = plans.iter().filter(|p| p.address.starts_with('[')).collect();
    assert_eq!(v6.len(), 3);
    assert!(v6.iter().any(|p| p.address == "[2606:2800::1]:443"));
}

#[test]
fn test_plan_all_tested_is_empty() {
    let mut um = UrlMeasurement::new("http://example.org").unwrap();
    um.force_both_schemes = false;
    let id = um.id();
    um.add_dns([dns(id, "example.org", &["1.1.1.1"])]);
    um.add_endpoint([endpoint(id, "http://example.org/", NetworkType::Tcp, "1.1.1.1:80", Some(200))]);

    let (plans, any) = um.new_endpoint_plan();
    assert!(plans.is_empty());
    assert!(!any);
}

#[test]
fn test_plan_keeps_explicit_port_and_request_state() {
    let mut um = UrlMeasurement::new("http://example.org:8080/x").unwrap();
    um.force_both_schemes = false;
    um.cookies = vec!["a=b; Path=/".to_string()];
    let mut headers = Headers::new();
    headers.set("Referer", "http://example.org:8080/x");
    um.headers = headers.clone();
    let id = um.id();
    um.add_dns([dns(id, "example.org", &["1.1.1.1"])]);

    let (plans, _) = um.new_endpoint_plan();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].address, "1.1.1.1:8080");
    assert_eq!(plans[0].cookies, um.cookies);
    assert_eq!(plans[0].headers, headers);
}
