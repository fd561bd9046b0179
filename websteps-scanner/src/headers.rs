use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36";

/// HTTP headers keyed by lowercase header name.
///
/// Ordered so that two equal header sets always serialize to the same
/// bytes, which the probe cache relies on when fingerprinting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, Vec<String>>);

impl Headers {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Replaces every value of `name` with `value`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), vec![value.into()]);
    }

    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        self.0
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Returns the first value of `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(|v| v.as_str())
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.0
            .get(&name.to_ascii_lowercase())
            .map(|values| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    pub fn remove(&mut self, name: &str) {
        self.0.remove(&name.to_ascii_lowercase());
    }

    /// Iterates over (name, value) pairs, one pair per value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().flat_map(|(name, values)| {
            values.iter().map(move |value| (name.as_str(), value.as_str()))
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts a transport header map, dropping values that are not valid UTF-8.
    pub fn from_header_map(map: &reqwest::header::HeaderMap) -> Self {
        let mut out = Headers::new();
        for (name, value) in map.iter() {
            if let Ok(value) = value.to_str() {
                out.add(name.as_str(), value);
            }
        }
        out
    }
}

/// Builds the request headers every measurement starts from.
pub fn new_headers_for_measuring() -> Headers {
    let mut headers = Headers::new();
    headers.set("Accept", DEFAULT_ACCEPT);
    headers.set("Accept-Language", DEFAULT_ACCEPT_LANGUAGE);
    headers.set("User-Agent", DEFAULT_USER_AGENT);
    headers
}

// Cookies travel through the system in their serialized `Set-Cookie`
// form ("name=value; Path=/; HttpOnly").

/// Returns the `name=value` part of a serialized cookie.
pub fn cookie_pair(serialized: &str) -> &str {
    serialized
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
}

pub fn cookie_name(serialized: &str) -> &str {
    let pair = cookie_pair(serialized);
    pair.split('=').next().unwrap_or_default().trim()
}

/// Builds the value of a `Cookie` request header, or `None` for an empty jar.
pub fn cookie_header(cookies: &[String]) -> Option<String> {
    let pairs: Vec<&str> = cookies
        .iter()
        .map(|c| cookie_pair(c))
        .filter(|p| !p.is_empty())
        .collect();
    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

/// Merges `Set-Cookie` values into an existing jar; a new cookie replaces
/// an old one with the same name.
pub fn merge_cookies(jar: &[String], set_cookie: &[String]) -> Vec<String> {
    let mut out: Vec<String> = jar.to_vec();
    for cookie in set_cookie {
        let name = cookie_name(cookie);
        if name.is_empty() {
            continue;
        }
        match out.iter().position(|c| cookie_name(c) == name) {
            Some(idx) => out[idx] = cookie.clone(),
            None => out.push(cookie.clone()),
        }
    }
    out
}
