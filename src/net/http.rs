//! HTTP client for camera probing
//!
//! Cameras habitually present self-signed or expired certificates, so TLS
//! verification is disabled. Non-2xx statuses are ordinary results; only
//! transport failures (refused, reset, DNS) and timeouts are errors.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default per-request timeout when the caller gives none.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-call request configuration
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub basic_auth: Option<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub follow_redirects: bool,
    pub content_type: Option<String>,
}

impl RequestOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    pub fn basic(username: &str, password: &str, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            basic_auth: Some((username.to_string(), password.to_string())),
            ..Self::default()
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Uniform response: status, lowercase header map, body text
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    /// Header lookup by lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|v| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP(S) client shared by all probing modules
#[derive(Debug, Clone)]
pub struct HttpClient {
    plain: reqwest::Client,
    redirecting: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let plain = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("http client build failed: {}", e)))?;
        let redirecting = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("http client build failed: {}", e)))?;
        Ok(Self { plain, redirecting })
    }

    /// GET a URL.
    pub async fn get(&self, url: &str, options: &RequestOptions) -> Result<HttpResponse> {
        self.request("GET", url, None, options).await
    }

    /// Arbitrary method with optional body.
    pub async fn request(
        &self,
        method: &str,
        url: &str,
        body: Option<String>,
        options: &RequestOptions,
    ) -> Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| Error::Internal(format!("invalid HTTP method '{}'", method)))?;
        let client = if options.follow_redirects {
            &self.redirecting
        } else {
            &self.plain
        };

        let mut builder = client
            .request(method, url)
            .timeout(options.timeout.unwrap_or(DEFAULT_TIMEOUT));

        if let Some((user, pass)) = &options.basic_auth {
            builder = builder.basic_auth(user, Some(pass));
        }
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(content_type) = &options.content_type {
            builder = builder.header("Content-Type", content_type.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), v.to_string());
            }
        }
        let body = response.text().await.unwrap_or_default();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("www-authenticate".to_string(), "Digest realm=\"cam\"".to_string());
        let response = HttpResponse {
            status: 401,
            headers,
            body: String::new(),
        };
        assert!(response.header("WWW-Authenticate").is_some());
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn connection_refused_maps_to_network_error() {
        let client = HttpClient::new().unwrap();
        // Reserved TEST-NET-1 address, nothing listens there.
        let result = client
            .get(
                "http://192.0.2.1:1/",
                &RequestOptions::with_timeout(Duration::from_millis(200)),
            )
            .await;
        match result {
            Err(Error::Network(_)) | Err(Error::Timeout(_)) => {}
            other => panic!("expected transport error, got {:?}", other.map(|r| r.status)),
        }
    }
}
