//! Baseline-differential authentication validation
//!
//! Cameras routinely answer 200 on their root page with and without
//! credentials. A credentialed response only counts as a login when it
//! meaningfully differs from the unauthenticated baseline; everything else is
//! a false positive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::net::{HttpClient, RequestOptions};

/// Body markers that only appear on post-login pages.
pub const POST_LOGIN_MARKERS: &[&str] = &[
    "logout",
    "sign-out",
    "dashboard",
    "welcome",
    "session",
    "authenticated",
    "token",
];

/// Body-size delta below which responses are assumed to be the same page.
const SIZE_DELTA_RATIO: f64 = 0.10;

/// Cached unauthenticated response for one base URL
#[derive(Debug, Clone)]
pub struct Baseline {
    pub reachable: bool,
    pub status: u16,
    pub body: String,
    /// Challenge header, kept for Digest flows where the baseline is the 401 itself
    pub www_authenticate: Option<String>,
}

impl Baseline {
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            status: 0,
            body: String::new(),
            www_authenticate: None,
        }
    }
}

/// Per-activity cache of unauthenticated baselines, keyed by base URL
#[derive(Default)]
pub struct BaselineCache {
    inner: Mutex<HashMap<String, Arc<Baseline>>>,
}

impl BaselineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the baseline for a base URL, once per session.
    pub async fn fetch(
        &self,
        http: &HttpClient,
        base_url: &str,
        timeout: Duration,
    ) -> Arc<Baseline> {
        {
            let cache = self.inner.lock().await;
            if let Some(baseline) = cache.get(base_url) {
                return baseline.clone();
            }
        }

        let options = RequestOptions::with_timeout(timeout);
        let baseline = match http.get(&format!("{}/", base_url), &options).await {
            Ok(response) => Arc::new(Baseline {
                reachable: true,
                status: response.status,
                www_authenticate: response.header("www-authenticate").map(|v| v.to_string()),
                body: response.body,
            }),
            Err(_) => Arc::new(Baseline::unreachable()),
        };

        let mut cache = self.inner.lock().await;
        cache
            .entry(base_url.to_string())
            .or_insert_with(|| baseline.clone())
            .clone()
    }
}

/// Decide whether a credentialed response genuinely differs from the
/// unauthenticated baseline.
pub fn is_authenticated_response_different(baseline: &Baseline, status: u16, body: &str) -> bool {
    let authed_ok = (200..400).contains(&status);

    // Auth challenge replaced by content.
    if baseline.reachable && matches!(baseline.status, 401 | 403) && authed_ok {
        return true;
    }

    // Nothing to compare against; cannot prove sameness.
    if !baseline.reachable {
        return authed_ok;
    }

    if baseline.status == status {
        if baseline.body == body {
            return false;
        }
        let max_len = baseline.body.len().max(body.len());
        if max_len == 0 {
            return false;
        }
        let delta = baseline.body.len().abs_diff(body.len()) as f64;
        if delta / max_len as f64 >= SIZE_DELTA_RATIO {
            return true;
        }
        // Nearly the same size: only trust it when post-login markers appear
        // that the baseline lacks.
        let authed_lower = body.to_ascii_lowercase();
        let baseline_lower = baseline.body.to_ascii_lowercase();
        return POST_LOGIN_MARKERS
            .iter()
            .any(|m| authed_lower.contains(m) && !baseline_lower.contains(m));
    }

    if authed_ok && baseline.status >= 400 {
        return true;
    }

    false
}
