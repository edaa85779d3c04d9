//! Passive observation of the API's advertised rate limits.
//!
//! The API sends two structured headers on most responses:
//!
//! - `ratelimit-policy: "perday";q=20000;w=86400` (quota per window, window in seconds)
//! - `ratelimit: "perday";r=19871;t=36511` (remaining calls, seconds until reset)
//!
//! Nothing here enforces the limits; the snapshot is advisory.

use http::HeaderMap;
use std::time::Duration;

pub const POLICY_HEADER: &str = "ratelimit-policy";
pub const STATE_HEADER: &str = "ratelimit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimit {
    pub quota: Option<u64>,
    pub window: Option<Duration>,
    pub remaining: Option<u64>,
    pub resets_in: Option<Duration>,
}

impl RateLimit {
    /// Parse both headers. `None` when the response carried neither.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let policy = headers.get(POLICY_HEADER).and_then(|v| v.to_str().ok());
        let state = headers.get(STATE_HEADER).and_then(|v| v.to_str().ok());
        if policy.is_none() && state.is_none() {
            return None;
        }

        let mut limit = RateLimit::default();
        for (key, value) in policy.into_iter().flat_map(parameters) {
            match key {
                "q" => limit.quota = value.parse().ok(),
                "w" => limit.window = value.parse().ok().map(Duration::from_secs),
                _ => {}
            }
        }
        for (key, value) in state.into_iter().flat_map(parameters) {
            match key {
                "r" => limit.remaining = value.parse().ok(),
                "t" => limit.resets_in = value.parse().ok().map(Duration::from_secs),
                _ => {}
            }
        }
        Some(limit)
    }
}

/// `key=value` pairs of a semicolon-delimited header; bare items (the policy name) are skipped.
fn parameters(raw: &str) -> impl Iterator<Item = (&str, &str)> {
    raw.split(';')
        .filter_map(|part| part.trim().split_once('='))
        .map(|(k, v)| (k.trim(), v.trim().trim_matches('"')))
}
