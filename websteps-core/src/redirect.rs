// Redirect resolver: follow-up URLMeasurements from redirect responses

use crate::model::UrlMeasurement;
use crate::plan::alpn_for_http_endpoint;
use std::collections::HashMap;
use url::Url;
use websteps_scanner::EndpointMeasurement;
use websteps_scanner::headers::Headers;

/// Status codes we treat as redirects.
pub const REDIRECT_STATUS_CODES: [u16; 5] = [301, 302, 303, 306, 307];

/// Decides which endpoint results are redirects worth following and
/// which of them are equivalent.
pub trait RedirectPolicy {
    /// Returns the dedup key of `epnt`, or `None` when the result is not
    /// relevant to this policy.
    fn summary(&self, epnt: &EndpointMeasurement) -> Option<String>;
}

/// Follows every redirect, distinguishing cleartext redirects to the
/// same target by their cookies.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRedirectPolicy;

impl RedirectPolicy for DefaultRedirectPolicy {
    fn summary(&self, epnt: &EndpointMeasurement) -> Option<String> {
        if !REDIRECT_STATUS_CODES.contains(&epnt.response_status_code()) {
            return None;
        }
        let location = epnt.location.as_ref()?;
        if epnt.url.scheme() == "https" || epnt.cookies.is_empty() {
            return Some(location.to_string());
        }
        // cookies set over cleartext may have been injected
        let mut summary = epnt.cookies.clone();
        summary.sort();
        summary.push(location.to_string());
        Some(summary.join(" "))
    }
}

/// Copies the request headers of a redirect, pointing `Referer` at the
/// redirect target. The follow-up carries its cookies separately, so the
/// old `Cookie` header is dropped.
fn headers_for_redirect(location: &Url, orig: &Headers) -> Headers {
    let mut out = orig.clone();
    out.remove("cookie");
    out.set("Referer", location.to_string());
    out
}

impl UrlMeasurement {
    /// Returns one follow-up URLMeasurement per distinct redirect seen in
    /// this URLMeasurement. The boolean tells whether there is any.
    pub fn redirects(&self) -> (Vec<UrlMeasurement>, bool) {
        self.redirects_with_policy(&DefaultRedirectPolicy)
    }

    pub fn redirects_with_policy(&self, policy: &dyn RedirectPolicy) -> (Vec<UrlMeasurement>, bool) {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut out: Vec<UrlMeasurement> = Vec::new();
        for epnt in self.endpoint() {
            let Some(summary) = policy.summary(epnt) else {
                continue;
            };
            let Some(location) = epnt.location.as_ref() else {
                continue;
            };
            let slot = *index.entry(summary).or_insert_with(|| {
                out.push(UrlMeasurement::follow_up(
                    location.clone(),
                    epnt.cookies.clone(),
                    headers_for_redirect(location, &epnt.request_headers),
                    alpn_for_http_endpoint(epnt.network),
                ));
                out.len() - 1
            });
            out[slot].endpoint_ids.push(epnt.id);
        }
        let has_any = !out.is_empty();
        (out, has_any)
    }
}
