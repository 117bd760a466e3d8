//! Credential tester
//!
//! ## Responsibilities
//!
//! - Ordered default + custom credential enumeration per target
//! - Baseline-differential validation of Basic/Digest logins
//! - Form and vendor-specific login flows with explicit success markers
//! - RTSP credential checks that refuse to claim streams already open
//! - ONVIF WS-Security credential checks
//!
//! Attempts for a single host are strictly serial, paced by the shared token
//! bucket plus an optional inter-attempt delay, and stop at the first genuine
//! success.

mod baseline;
mod wordlist;

pub use baseline::{is_authenticated_response_different, Baseline, BaselineCache, POST_LOGIN_MARKERS};
pub use wordlist::{build_credential_list, Credential, GENERIC_CREDENTIALS};

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{CredentialConfig, RateLimitConfig};
use crate::error::Result;
use crate::exec::{run_bounded, RateLimiter};
use crate::fingerprint::{
    get_device_information, signature_for, AuthType, FingerprintResult, Protocol, Vendor,
};
use crate::fuzzer::GENERIC_RTSP_PATHS;
use crate::net::{
    digest_authorization, random_cnonce, rtsp_describe, DigestChallenge, HttpClient, RequestOptions,
};

/// Deadline for credential HTTP probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(8);

/// Vendor-agnostic form login endpoints, tried in order.
const FORM_LOGIN_ENDPOINTS: &[&str] = &[
    "/login",
    "/api/login",
    "/cgi-bin/login.cgi",
    "/goform/login",
    "/login.cgi",
];

/// Explicit positive markers for vendor login endpoints.
const LOGIN_POSITIVE_MARKERS: &[&str] = &[
    "\"success\":true",
    "\"statusvalue\":200",
    "\"result\":true",
    "\"authorized\":true",
    "token",
    "sessionid",
];

/// Negative markers that veto a vendor login response.
const LOGIN_NEGATIVE_MARKERS: &[&str] = &["error", "fail", "invalid", "wrong", "denied"];

/// One credential attempt against one host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialTestResult {
    pub ip: String,
    pub port: u16,
    pub vendor: Vendor,
    pub protocol: Protocol,
    pub credential: Credential,
    pub success: bool,
    pub status_code: Option<u16>,
    pub evidence: String,
    pub tested_at: DateTime<Utc>,
}

/// Aggregated credential module output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialModuleResult {
    pub attempts: usize,
    pub successful_logins: usize,
    pub compromised_hosts: usize,
    pub duration_ms: u64,
    pub results: Vec<CredentialTestResult>,
}

/// Shared per-invocation caches handed down to every host task
struct TesterState {
    http: HttpClient,
    limiter: RateLimiter,
    baselines: BaselineCache,
    /// Unauthenticated DESCRIBE status per `ip:port:path`
    rtsp_unauth: Mutex<HashMap<String, u16>>,
    credentials: CredentialConfig,
}

/// Credential testing runner
pub struct CredentialTester {
    state: Arc<TesterState>,
    max_concurrent_hosts: usize,
}

impl CredentialTester {
    pub fn new(http: HttpClient, credentials: CredentialConfig, rate: &RateLimitConfig) -> Self {
        Self {
            state: Arc::new(TesterState {
                http,
                limiter: RateLimiter::new(rate.requests_per_second),
                baselines: BaselineCache::new(),
                rtsp_unauth: Mutex::new(HashMap::new()),
                credentials,
            }),
            max_concurrent_hosts: rate.max_concurrent_hosts,
        }
    }

    /// Test every target, in parallel across hosts, serial within a host.
    pub async fn run(&self, targets: &[FingerprintResult]) -> Result<CredentialModuleResult> {
        let started = Instant::now();

        let tasks: Vec<_> = targets
            .iter()
            .cloned()
            .map(|target| {
                let state = self.state.clone();
                async move { Ok(test_host(&state, &target).await) }
            })
            .collect();

        let outcomes = run_bounded(tasks, self.max_concurrent_hosts).await;

        let mut result = CredentialModuleResult::default();
        let mut compromised = std::collections::HashSet::new();
        for outcome in outcomes {
            let Some(host_results) = outcome.fulfilled() else {
                continue;
            };
            for attempt in host_results {
                result.attempts += 1;
                if attempt.success {
                    result.successful_logins += 1;
                    compromised.insert(format!("{}:{}", attempt.ip, attempt.port));
                }
                result.results.push(attempt);
            }
        }
        result.compromised_hosts = compromised.len();
        result.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            attempts = result.attempts,
            successful = result.successful_logins,
            compromised = result.compromised_hosts,
            "credential testing complete"
        );
        Ok(result)
    }
}

async fn test_host(state: &TesterState, target: &FingerprintResult) -> Vec<CredentialTestResult> {
    let credentials = build_credential_list(
        target.vendor,
        &state.credentials.custom,
        state.credentials.use_defaults,
    );
    let max_attempts = state.credentials.max_attempts_per_host;
    let delay = Duration::from_millis(state.credentials.delay_ms);

    let mut results = Vec::new();
    let mut attempts = 0usize;

    'credentials: for credential in credentials {
        for protocol in protocol_plan(target) {
            if attempts >= max_attempts {
                break 'credentials;
            }
            state.limiter.acquire().await;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempts += 1;

            let attempt = match protocol {
                Protocol::Http | Protocol::Https => {
                    test_http(state, target, &credential).await
                }
                Protocol::Rtsp => test_rtsp(state, target, &credential).await,
                Protocol::Onvif => test_onvif(state, target, &credential).await,
                _ => None,
            };

            let Some(attempt) = attempt else { continue };
            let success = attempt.success;
            results.push(attempt);
            if success {
                tracing::info!(
                    ip = %target.ip,
                    port = target.port,
                    username = %credential.username,
                    "credential accepted"
                );
                break 'credentials;
            }
        }
    }

    results
}

/// Protocols worth a credential attempt on this target, in order.
fn protocol_plan(target: &FingerprintResult) -> Vec<Protocol> {
    let mut plan = Vec::new();
    if target.web_ui {
        plan.push(if target.has_protocol(Protocol::Https) {
            Protocol::Https
        } else {
            Protocol::Http
        });
    }
    if target.has_protocol(Protocol::Rtsp) {
        plan.push(Protocol::Rtsp);
    }
    if target.onvif_supported {
        plan.push(Protocol::Onvif);
    }
    plan
}

fn attempt_result(
    target: &FingerprintResult,
    protocol: Protocol,
    credential: &Credential,
    success: bool,
    status_code: Option<u16>,
    evidence: String,
) -> CredentialTestResult {
    CredentialTestResult {
        ip: target.ip.clone(),
        port: target.port,
        vendor: target.vendor,
        protocol,
        credential: credential.clone(),
        success,
        status_code,
        evidence,
        tested_at: Utc::now(),
    }
}

async fn test_http(
    state: &TesterState,
    target: &FingerprintResult,
    credential: &Credential,
) -> Option<CredentialTestResult> {
    let protocol = if target.has_protocol(Protocol::Https) {
        Protocol::Https
    } else {
        Protocol::Http
    };
    match target.auth_type {
        AuthType::Digest => test_digest(state, target, credential, protocol).await,
        AuthType::Basic | AuthType::Unknown => test_basic(state, target, credential, protocol).await,
        AuthType::Form => test_form(state, target, credential, protocol).await,
        AuthType::None => test_vendor_login(state, target, credential, protocol).await,
        AuthType::Bearer => None,
    }
}

async fn test_basic(
    state: &TesterState,
    target: &FingerprintResult,
    credential: &Credential,
    protocol: Protocol,
) -> Option<CredentialTestResult> {
    let base_url = target.base_url();
    let baseline = state
        .baselines
        .fetch(&state.http, &base_url, PROBE_TIMEOUT)
        .await;

    let options = RequestOptions::basic(&credential.username, &credential.password, PROBE_TIMEOUT);
    let response = match state.http.get(&format!("{}/", base_url), &options).await {
        Ok(r) => r,
        Err(e) => {
            return Some(attempt_result(
                target,
                protocol,
                credential,
                false,
                None,
                format!("basic auth request failed: {}", e),
            ))
        }
    };

    let different = is_authenticated_response_different(&baseline, response.status, &response.body);
    let evidence = if different {
        format!(
            "basic auth accepted: baseline {} -> authenticated {}",
            baseline_status(&baseline),
            response.status
        )
    } else if baseline.reachable && baseline.status == response.status && baseline.body == response.body
    {
        format!("response identical to baseline ({})", response.status)
    } else {
        format!(
            "no meaningful delta against baseline {} (got {})",
            baseline_status(&baseline),
            response.status
        )
    };

    Some(attempt_result(
        target,
        protocol,
        credential,
        different,
        Some(response.status),
        evidence,
    ))
}

async fn test_digest(
    state: &TesterState,
    target: &FingerprintResult,
    credential: &Credential,
    protocol: Protocol,
) -> Option<CredentialTestResult> {
    let base_url = target.base_url();
    // For Digest the baseline is the 401 challenge response itself.
    let baseline = state
        .baselines
        .fetch(&state.http, &base_url, PROBE_TIMEOUT)
        .await;

    let challenge = baseline
        .www_authenticate
        .as_deref()
        .and_then(DigestChallenge::parse);
    let Some(challenge) = challenge else {
        return Some(attempt_result(
            target,
            protocol,
            credential,
            false,
            Some(baseline.status),
            "no parseable digest challenge on baseline".to_string(),
        ));
    };

    let authorization = digest_authorization(
        &credential.username,
        &credential.password,
        "GET",
        "/",
        &challenge,
        &random_cnonce(),
        "00000001",
    );
    let options = RequestOptions::with_timeout(PROBE_TIMEOUT).header("Authorization", &authorization);
    let response = match state.http.get(&format!("{}/", base_url), &options).await {
        Ok(r) => r,
        Err(e) => {
            return Some(attempt_result(
                target,
                protocol,
                credential,
                false,
                None,
                format!("digest auth request failed: {}", e),
            ))
        }
    };

    let different = is_authenticated_response_different(&baseline, response.status, &response.body);
    let evidence = if different {
        format!(
            "digest auth accepted (realm \"{}\"): challenge {} -> authenticated {}",
            challenge.realm, baseline.status, response.status
        )
    } else {
        format!("digest auth rejected with {}", response.status)
    };

    Some(attempt_result(
        target,
        protocol,
        credential,
        different,
        Some(response.status),
        evidence,
    ))
}

/// Success rule for the vendor-agnostic form flow.
fn form_login_success(status: u16, body: &str) -> bool {
    if status != 200 {
        return false;
    }
    let lower = body.to_ascii_lowercase();
    if LOGIN_NEGATIVE_MARKERS.iter().any(|m| lower.contains(m)) {
        return false;
    }
    ["success", "ok", "true", "token", "session"]
        .iter()
        .any(|m| lower.contains(m))
        || body.len() > 100
}

async fn test_form(
    state: &TesterState,
    target: &FingerprintResult,
    credential: &Credential,
    protocol: Protocol,
) -> Option<CredentialTestResult> {
    let base_url = target.base_url();
    let body = format!(
        "userName={}&password={}",
        url_encode(&credential.username),
        url_encode(&credential.password)
    );

    for endpoint in FORM_LOGIN_ENDPOINTS {
        let options = RequestOptions {
            timeout: Some(PROBE_TIMEOUT),
            content_type: Some("application/x-www-form-urlencoded".to_string()),
            ..RequestOptions::default()
        };
        let url = format!("{}{}", base_url, endpoint);
        let Ok(response) = state
            .http
            .request("POST", &url, Some(body.clone()), &options)
            .await
        else {
            continue;
        };

        if form_login_success(response.status, &response.body) {
            return Some(attempt_result(
                target,
                protocol,
                credential,
                true,
                Some(response.status),
                format!("form login accepted at {}", endpoint),
            ));
        }
    }

    Some(attempt_result(
        target,
        protocol,
        credential,
        false,
        None,
        "form login rejected on all known endpoints".to_string(),
    ))
}

/// Success rule for vendor login endpoints: explicit positive marker, no
/// negative marker in the same body.
fn vendor_login_success(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    if LOGIN_NEGATIVE_MARKERS.iter().any(|m| lower.contains(m)) {
        return false;
    }
    LOGIN_POSITIVE_MARKERS.iter().any(|m| lower.contains(m))
}

async fn test_vendor_login(
    state: &TesterState,
    target: &FingerprintResult,
    credential: &Credential,
    protocol: Protocol,
) -> Option<CredentialTestResult> {
    // Basic auth against an unauthenticated root proves nothing; only the
    // vendor login endpoints give a usable signal.
    let signature = signature_for(target.vendor)?;
    if signature.login_endpoints.is_empty() {
        return None;
    }

    let base_url = target.base_url();
    let body = serde_json::json!({
        "username": credential.username,
        "password": credential.password,
    })
    .to_string();

    for endpoint in signature.login_endpoints {
        let options = RequestOptions {
            timeout: Some(PROBE_TIMEOUT),
            content_type: Some("application/json".to_string()),
            ..RequestOptions::default()
        };
        let url = format!("{}{}", base_url, endpoint);
        let Ok(response) = state
            .http
            .request("POST", &url, Some(body.clone()), &options)
            .await
        else {
            continue;
        };

        if vendor_login_success(&response.body) {
            return Some(attempt_result(
                target,
                protocol,
                credential,
                true,
                Some(response.status),
                format!("vendor login endpoint {} returned a positive marker", endpoint),
            ));
        }
    }

    Some(attempt_result(
        target,
        protocol,
        credential,
        false,
        None,
        "vendor login endpoints returned no positive marker".to_string(),
    ))
}

/// Stream path used for RTSP credential checks on this target.
fn rtsp_probe_path(vendor: Vendor) -> &'static str {
    signature_for(vendor)
        .and_then(|s| s.rtsp_paths.first())
        .copied()
        .unwrap_or(GENERIC_RTSP_PATHS[0])
}

async fn test_rtsp(
    state: &TesterState,
    target: &FingerprintResult,
    credential: &Credential,
) -> Option<CredentialTestResult> {
    let ip: IpAddr = target.ip.parse().ok()?;
    let port = if crate::net::RTSP_PORTS.contains(&target.port) {
        target.port
    } else {
        554
    };
    let path = rtsp_probe_path(target.vendor);
    let cache_key = format!("{}:{}:{}", target.ip, port, path);

    // First: DESCRIBE without credentials, once per (ip, port, path).
    let unauth_status = {
        let cached = state.rtsp_unauth.lock().await.get(&cache_key).copied();
        match cached {
            Some(status) => status,
            None => {
                let status = match rtsp_describe(ip, port, path, None).await {
                    Ok(response) => response.status_code,
                    Err(_) => 0,
                };
                state
                    .rtsp_unauth
                    .lock()
                    .await
                    .insert(cache_key.clone(), status);
                status
            }
        }
    };

    if unauth_status == 200 {
        // Not a credential finding: the stream is simply open. The protocol
        // fuzzer records the exposure.
        return Some(attempt_result(
            target,
            Protocol::Rtsp,
            credential,
            false,
            Some(200),
            format!(
                "stream {} answers DESCRIBE without credentials; unauthenticated access is the finding",
                path
            ),
        ));
    }

    let response = match rtsp_describe(
        ip,
        port,
        path,
        Some((credential.username.as_str(), credential.password.as_str())),
    )
    .await
    {
        Ok(r) => r,
        Err(e) => {
            return Some(attempt_result(
                target,
                Protocol::Rtsp,
                credential,
                false,
                None,
                format!("rtsp describe failed: {}", e),
            ))
        }
    };

    let success = response.status_code == 200;
    let evidence = if success {
        format!(
            "rtsp DESCRIBE {} accepted with basic credentials (unauthenticated attempt was {})",
            path, unauth_status
        )
    } else {
        format!("rtsp DESCRIBE {} rejected with {}", path, response.status_code)
    };

    Some(attempt_result(
        target,
        Protocol::Rtsp,
        credential,
        success,
        Some(response.status_code),
        evidence,
    ))
}

async fn test_onvif(
    state: &TesterState,
    target: &FingerprintResult,
    credential: &Credential,
) -> Option<CredentialTestResult> {
    let response = get_device_information(
        &state.http,
        target.scheme(),
        &target.ip,
        target.port,
        &credential.username,
        &credential.password,
    )
    .await?;

    let success = response.status == 200
        && response.body.contains("GetDeviceInformationResponse")
        && !response.body.contains("NotAuthorized");
    let evidence = if success {
        "onvif GetDeviceInformation accepted the UsernameToken digest".to_string()
    } else {
        format!("onvif GetDeviceInformation rejected ({})", response.status)
    };

    Some(attempt_result(
        target,
        Protocol::Onvif,
        credential,
        success,
        Some(response.status),
        evidence,
    ))
}

fn baseline_status(baseline: &Baseline) -> String {
    if baseline.reachable {
        baseline.status.to_string()
    } else {
        "unreachable".to_string()
    }
}

fn url_encode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            other => encoded.push_str(&format!("%{:02X}", other)),
        }
    }
    encoded
}
