//! Protocol fuzzer
//!
//! ## Responsibilities
//!
//! - RTSP stream path enumeration (unauthenticated vs auth-gated)
//! - Snapshot endpoint exposure
//! - Configuration disclosure probing
//! - Admin/debug surface probing
//!
//! When several records share an IP, exactly one is elected RTSP owner so a
//! camera fingerprinted on :80 and :554 is not DESCRIBEd twice per path.

mod paths;

pub use paths::{
    ADMIN_ENDPOINTS, CONFIG_DISCLOSURE_PATHS, GENERIC_RTSP_PATHS, GENERIC_SNAPSHOT_PATHS,
};

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ProtocolConfig, RateLimitConfig};
use crate::error::Result;
use crate::exec::{run_bounded, RateLimiter};
use crate::fingerprint::{signature_for, FingerprintResult, Protocol};
use crate::net::{rtsp_describe, HttpClient, RequestOptions, RTSP_PORTS};

/// Deadline for fuzzer HTTP probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(8);
/// Minimum body size for a config disclosure hit.
const CONFIG_MIN_BYTES: usize = 20;
/// Minimum body size for an admin endpoint hit.
const ADMIN_MIN_BYTES: usize = 50;

/// Kind of exposure found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    RtspStream,
    SnapshotEndpoint,
    ConfigDisclosure,
    DirectoryTraversal,
    UnauthenticatedAccess,
    InfoDisclosure,
}

/// Finding severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Parse a config threshold string.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            "info" => Some(Severity::Info),
            _ => None,
        }
    }
}

/// One discovered protocol exposure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolFinding {
    pub ip: String,
    pub port: u16,
    pub finding_type: FindingType,
    pub protocol: Protocol,
    pub path: String,
    pub severity: Severity,
    pub description: String,
    pub evidence: String,
    /// true = the endpoint exists but demanded authentication
    pub authenticated: bool,
    pub found_at: DateTime<Utc>,
}

/// Aggregated fuzzer output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FuzzerModuleResult {
    pub findings: Vec<ProtocolFinding>,
    pub hosts_probed: usize,
    pub duration_ms: u64,
}

/// Elect the single record per IP that runs the RTSP pass.
///
/// Preference goes to a record listening on a known RTSP port; ties fall to
/// the first record seen.
pub fn elect_rtsp_owners(targets: &[FingerprintResult]) -> HashSet<(String, u16)> {
    let mut owners: HashMap<String, (String, u16, bool)> = HashMap::new();

    for target in targets {
        if !target.has_protocol(Protocol::Rtsp) {
            continue;
        }
        let is_rtsp_port = RTSP_PORTS.contains(&target.port);
        let takes_over = match owners.get(&target.ip) {
            Some((_, _, true)) => false,
            Some(_) => is_rtsp_port,
            None => true,
        };
        if takes_over {
            owners.insert(
                target.ip.clone(),
                (target.ip.clone(), target.port, is_rtsp_port),
            );
        }
    }

    owners
        .into_values()
        .map(|(ip, port, _)| (ip, port))
        .collect()
}

/// Merge vendor and generic path lists, preserving order, dropping repeats.
fn merged_paths(vendor_paths: &[&str], generic_paths: &[&str]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for path in vendor_paths.iter().chain(generic_paths.iter()) {
        if seen.insert(*path) {
            merged.push(path.to_string());
        }
    }
    merged
}

struct FuzzerState {
    http: HttpClient,
    limiter: RateLimiter,
    protocols: ProtocolConfig,
}

/// Protocol fuzzing runner
pub struct ProtocolFuzzer {
    state: Arc<FuzzerState>,
    max_concurrent_hosts: usize,
}

impl ProtocolFuzzer {
    pub fn new(http: HttpClient, protocols: ProtocolConfig, rate: &RateLimitConfig) -> Self {
        Self {
            state: Arc::new(FuzzerState {
                http,
                limiter: RateLimiter::new(rate.requests_per_second),
                protocols,
            }),
            max_concurrent_hosts: rate.max_concurrent_hosts,
        }
    }

    /// Probe every target's exposed endpoint families.
    pub async fn run(&self, targets: &[FingerprintResult]) -> Result<FuzzerModuleResult> {
        let started = Instant::now();
        let rtsp_owners = Arc::new(elect_rtsp_owners(targets));

        let tasks: Vec<_> = targets
            .iter()
            .cloned()
            .map(|target| {
                let state = self.state.clone();
                let owners = rtsp_owners.clone();
                async move {
                    let owns_rtsp = owners.contains(&(target.ip.clone(), target.port));
                    Ok(fuzz_host(&state, &target, owns_rtsp).await)
                }
            })
            .collect();

        let outcomes = run_bounded(tasks, self.max_concurrent_hosts).await;

        let mut result = FuzzerModuleResult {
            hosts_probed: targets.len(),
            ..FuzzerModuleResult::default()
        };
        for outcome in outcomes {
            if let Some(findings) = outcome.fulfilled() {
                result.findings.extend(findings);
            }
        }
        result.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            findings = result.findings.len(),
            hosts = result.hosts_probed,
            "protocol fuzzing complete"
        );
        Ok(result)
    }
}

async fn fuzz_host(
    state: &FuzzerState,
    target: &FingerprintResult,
    owns_rtsp: bool,
) -> Vec<ProtocolFinding> {
    let mut findings = Vec::new();

    if state.protocols.rtsp && owns_rtsp {
        findings.extend(fuzz_rtsp(state, target).await);
    }
    if state.protocols.http && target.web_ui {
        findings.extend(fuzz_snapshots(state, target).await);
        findings.extend(fuzz_config_disclosure(state, target).await);
        findings.extend(fuzz_admin_endpoints(state, target).await);
    }

    findings
}

async fn fuzz_rtsp(state: &FuzzerState, target: &FingerprintResult) -> Vec<ProtocolFinding> {
    let Ok(ip) = target.ip.parse::<IpAddr>() else {
        return Vec::new();
    };
    let port = if RTSP_PORTS.contains(&target.port) {
        target.port
    } else {
        554
    };

    let vendor_paths = signature_for(target.vendor).map(|s| s.rtsp_paths).unwrap_or(&[]);
    let paths = merged_paths(vendor_paths, GENERIC_RTSP_PATHS);

    let mut findings = Vec::new();
    for path in paths {
        state.limiter.acquire().await;
        let Ok(response) = rtsp_describe(ip, port, &path, None).await else {
            continue;
        };
        match response.status_code {
            200 => findings.push(ProtocolFinding {
                ip: target.ip.clone(),
                port,
                finding_type: FindingType::RtspStream,
                protocol: Protocol::Rtsp,
                path: path.clone(),
                severity: Severity::High,
                description: "RTSP stream served without authentication".to_string(),
                evidence: format!("DESCRIBE rtsp://{}:{}{} returned 200", target.ip, port, path),
                authenticated: false,
                found_at: Utc::now(),
            }),
            401 => findings.push(ProtocolFinding {
                ip: target.ip.clone(),
                port,
                finding_type: FindingType::RtspStream,
                protocol: Protocol::Rtsp,
                path: path.clone(),
                severity: Severity::Info,
                description: "RTSP stream exists, requires authentication".to_string(),
                evidence: format!("DESCRIBE rtsp://{}:{}{} returned 401", target.ip, port, path),
                authenticated: true,
                found_at: Utc::now(),
            }),
            _ => {}
        }
    }
    findings
}

async fn fuzz_snapshots(state: &FuzzerState, target: &FingerprintResult) -> Vec<ProtocolFinding> {
    let vendor_paths = signature_for(target.vendor)
        .map(|s| s.snapshot_paths)
        .unwrap_or(&[]);
    let paths = merged_paths(vendor_paths, GENERIC_SNAPSHOT_PATHS);
    let base_url = target.base_url();
    let options = RequestOptions::with_timeout(PROBE_TIMEOUT);

    let mut findings = Vec::new();
    for path in paths {
        state.limiter.acquire().await;
        let Ok(response) = state.http.get(&format!("{}{}", base_url, path), &options).await else {
            continue;
        };
        if response.status != 200 {
            continue;
        }
        let content_type = response.header("content-type").unwrap_or("");
        if content_type.starts_with("image/") || content_type.contains("octet-stream") {
            findings.push(ProtocolFinding {
                ip: target.ip.clone(),
                port: target.port,
                finding_type: FindingType::SnapshotEndpoint,
                protocol: Protocol::Http,
                path: path.clone(),
                severity: Severity::Medium,
                description: "Snapshot endpoint served without authentication".to_string(),
                evidence: format!("{} returned 200 with content-type {}", path, content_type),
                authenticated: false,
                found_at: Utc::now(),
            });
        }
    }
    findings
}

/// Escalation rule for config disclosure bodies.
fn config_disclosure_severity(body: &str) -> Severity {
    let lower = body.to_ascii_lowercase();
    if ["password", "passwd", "secret", "token", "key"]
        .iter()
        .any(|m| lower.contains(m))
    {
        Severity::Critical
    } else {
        Severity::High
    }
}

/// A config response has to look like data, not a web page.
fn looks_like_config(body: &str) -> bool {
    let trimmed = body.trim_start().to_ascii_lowercase();
    body.len() > CONFIG_MIN_BYTES
        && !trimmed.starts_with("<!doctype")
        && !trimmed.starts_with("<html")
}

async fn fuzz_config_disclosure(
    state: &FuzzerState,
    target: &FingerprintResult,
) -> Vec<ProtocolFinding> {
    let base_url = target.base_url();
    let options = RequestOptions::with_timeout(PROBE_TIMEOUT);

    let mut findings = Vec::new();
    for path in CONFIG_DISCLOSURE_PATHS {
        state.limiter.acquire().await;
        let Ok(response) = state.http.get(&format!("{}{}", base_url, path), &options).await else {
            continue;
        };
        if response.status == 200 && looks_like_config(&response.body) {
            findings.push(ProtocolFinding {
                ip: target.ip.clone(),
                port: target.port,
                finding_type: FindingType::ConfigDisclosure,
                protocol: Protocol::Http,
                path: path.to_string(),
                severity: config_disclosure_severity(&response.body),
                description: "Configuration data exposed without authentication".to_string(),
                evidence: format!("{} returned {} bytes of non-HTML data", path, response.body.len()),
                authenticated: false,
                found_at: Utc::now(),
            });
        }
    }
    findings
}

async fn fuzz_admin_endpoints(
    state: &FuzzerState,
    target: &FingerprintResult,
) -> Vec<ProtocolFinding> {
    let base_url = target.base_url();
    // Redirects to a login page must not count as an exposed panel.
    let options = RequestOptions::with_timeout(PROBE_TIMEOUT);

    let mut findings = Vec::new();
    for path in ADMIN_ENDPOINTS {
        state.limiter.acquire().await;
        let Ok(response) = state.http.get(&format!("{}{}", base_url, path), &options).await else {
            continue;
        };
        if response.status == 200 && response.body.len() > ADMIN_MIN_BYTES {
            findings.push(ProtocolFinding {
                ip: target.ip.clone(),
                port: target.port,
                finding_type: FindingType::UnauthenticatedAccess,
                protocol: Protocol::Http,
                path: path.to_string(),
                severity: Severity::Medium,
                description: "Admin or debug endpoint reachable without authentication".to_string(),
                evidence: format!("{} returned 200 with {} bytes", path, response.body.len()),
                authenticated: false,
                found_at: Utc::now(),
            });
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{AuthType, Vendor};

    fn record(ip: &str, port: u16, rtsp: bool) -> FingerprintResult {
        FingerprintResult {
            ip: ip.into(),
            port,
            vendor: Vendor::Hikvision,
            model: None,
            firmware: None,
            protocols: if rtsp {
                vec![Protocol::Http, Protocol::Rtsp]
            } else {
                vec![Protocol::Http]
            },
            server_banner: String::new(),
            auth_type: AuthType::None,
            web_ui: true,
            onvif_supported: false,
            headers: Default::default(),
        }
    }

    #[test]
    fn rtsp_owner_prefers_the_rtsp_port() {
        let targets = vec![record("192.0.2.20", 80, true), record("192.0.2.20", 554, true)];
        let owners = elect_rtsp_owners(&targets);
        assert_eq!(owners.len(), 1);
        assert!(owners.contains(&("192.0.2.20".to_string(), 554)));
    }

    #[test]
    fn rtsp_owner_is_unique_per_ip_regardless_of_order() {
        let targets = vec![
            record("192.0.2.20", 554, true),
            record("192.0.2.20", 80, true),
            record("192.0.2.21", 8080, true),
        ];
        let owners = elect_rtsp_owners(&targets);
        assert_eq!(owners.len(), 2);
        assert!(owners.contains(&("192.0.2.20".to_string(), 554)));
        assert!(owners.contains(&("192.0.2.21".to_string(), 8080)));
    }

    #[test]
    fn non_rtsp_targets_are_not_owners() {
        let targets = vec![record("192.0.2.22", 80, false)];
        assert!(elect_rtsp_owners(&targets).is_empty());
    }

    #[test]
    fn merged_paths_dedupe_keeps_vendor_order() {
        let merged = merged_paths(&["/stream1", "/live"], &["/live", "/stream2"]);
        assert_eq!(merged, vec!["/stream1", "/live", "/stream2"]);
    }

    #[test]
    fn config_severity_escalates_on_secrets() {
        assert_eq!(
            config_disclosure_severity("user=admin\npassword=12345"),
            Severity::Critical
        );
        assert_eq!(
            config_disclosure_severity("timezone=UTC\nntp=pool.ntp.org"),
            Severity::High
        );
    }

    #[test]
    fn html_bodies_are_not_config() {
        assert!(!looks_like_config("<!DOCTYPE html><html><body>page</body></html>"));
        assert!(!looks_like_config("<html>login required</html>"));
        assert!(!looks_like_config("short"));
        assert!(looks_like_config("[network]\nip=192.0.2.9\ngateway=192.0.2.1"));
    }

    #[test]
    fn severity_ordering_supports_thresholds() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
        assert_eq!(Severity::parse("high"), Some(Severity::High));
        assert_eq!(Severity::parse("urgent"), None);
    }
}
