// Breadth-first redirect traversal queue

use crate::model::UrlMeasurement;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use url::Url;

/// Returns a representation of `url` that is more canonical than what
/// web services hand out: query parameters are sorted by key and
/// percent-decoded once.
///
/// Path normalization and IDNA handling are not performed.
pub fn canonicalize(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    let mut out = base.to_string();
    if !pairs.is_empty() {
        out.push('?');
        let query: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
        out.push_str(&query.join("&"));
    }
    if let Some(fragment) = url.fragment() {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Work queue of URLMeasurements reached through redirects. Not
/// thread-safe; drive it from a single task.
#[derive(Debug, Default)]
pub struct UrlRedirectDeque {
    /// incremented on every pop, never on append
    depth: usize,
    visited: HashSet<String>,
    pending: VecDeque<UrlMeasurement>,
}

impl UrlRedirectDeque {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every measurement whose URL was not visited yet.
    pub fn append(&mut self, seeds: impl IntoIterator<Item = UrlMeasurement>) {
        for seed in seeds {
            if self.visited.contains(&canonicalize(&seed.url)) {
                continue;
            }
            self.pending.push_back(seed);
        }
    }

    /// Marks the URL of every endpoint result of `um` as visited. Call it
    /// once all of the session's probes have completed and before
    /// computing its redirects.
    pub fn remember_visited(&mut self, um: &UrlMeasurement) {
        for epnt in um.endpoint() {
            self.visited.insert(canonicalize(&epnt.url));
        }
    }

    /// Removes the front of the queue and counts one more hop.
    ///
    /// # Panics
    ///
    /// Panics when the queue is empty; check [`is_empty`](Self::is_empty)
    /// first.
    pub fn pop_left(&mut self) -> UrlMeasurement {
        let Some(um) = self.pending.pop_front() else {
            panic!("pop_left called on an empty redirect deque");
        };
        self.depth += 1;
        um
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of URLMeasurements popped so far.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        self.visited.contains(&canonicalize(url))
    }
}

impl fmt::Display for UrlRedirectDeque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self.pending.iter().map(|um| canonicalize(&um.url)).collect();
        write!(f, "[{}]", entries.join(" "))
    }
}
