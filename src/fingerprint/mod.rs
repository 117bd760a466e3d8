//! Fingerprinting module
//!
//! ## Responsibilities
//!
//! - Per-host vendor / model / firmware / auth-type identification
//! - HTTP header and body signature matching with vendor endpoint probes
//! - ONVIF capability detection
//! - RTSP banner cross-detection from HTTP-facing ports

mod onvif;
mod vendors;

pub use onvif::{get_device_information, probe_onvif, ws_security_header, ONVIF_TIMEOUT};
pub use vendors::{
    detect_from_banner, detect_from_body, detect_from_headers, signature_for, Vendor,
    VendorSignature, VENDOR_REGISTRY,
};

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveredHost;
use crate::error::Result;
use crate::exec::run_bounded;
use crate::net::{rtsp_options, HttpClient, RequestOptions, RTSP_PORTS};

/// Deadline for fingerprint HTTP probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(8);

/// Application protocol observed on a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Rtsp,
    Onvif,
    Telnet,
    Ssh,
}

/// Authentication scheme guarding the web UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    None,
    Basic,
    Digest,
    Form,
    Bearer,
    Unknown,
}

/// Identification result for one discovered host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintResult {
    pub ip: String,
    pub port: u16,
    pub vendor: Vendor,
    pub model: Option<String>,
    pub firmware: Option<String>,
    pub protocols: Vec<Protocol>,
    pub server_banner: String,
    pub auth_type: AuthType,
    pub web_ui: bool,
    pub onvif_supported: bool,
    pub headers: HashMap<String, String>,
}

impl FingerprintResult {
    fn new(host: &DiscoveredHost) -> Self {
        Self {
            ip: host.ip.clone(),
            port: host.port,
            vendor: Vendor::Unknown,
            model: None,
            firmware: None,
            protocols: Vec::new(),
            server_banner: host.banner.clone(),
            auth_type: AuthType::Unknown,
            web_ui: false,
            onvif_supported: false,
            headers: HashMap::new(),
        }
    }

    /// Scheme for talking HTTP to this host.
    pub fn scheme(&self) -> &'static str {
        if matches!(port_class(self.port), PortClass::Https) {
            "https"
        } else {
            "http"
        }
    }

    /// Base URL of the host's web service.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme(), self.ip, self.port)
    }

    pub fn has_protocol(&self, protocol: Protocol) -> bool {
        self.protocols.contains(&protocol)
    }

    fn add_protocol(&mut self, protocol: Protocol) {
        if !self.protocols.contains(&protocol) {
            self.protocols.push(protocol);
        }
    }
}

/// Port classification driving the probe plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortClass {
    Http,
    Https,
    Rtsp,
}

/// Classify a port: RTSP-primary, HTTPS, or plain HTTP.
pub fn port_class(port: u16) -> PortClass {
    if RTSP_PORTS.contains(&port) {
        PortClass::Rtsp
    } else if port == 443 || port == 8443 {
        PortClass::Https
    } else {
        PortClass::Http
    }
}

/// Derive the auth type from the root response.
pub fn derive_auth_type(status: u16, www_authenticate: Option<&str>, body: &str) -> AuthType {
    match status {
        401 => match www_authenticate.map(|v| v.to_ascii_lowercase()) {
            Some(value) if value.contains("digest") => AuthType::Digest,
            _ => AuthType::Basic,
        },
        200 => {
            let lower = body.to_ascii_lowercase();
            if lower.contains("<form")
                && (lower.contains("password") || lower.contains("login") || lower.contains("signin"))
            {
                AuthType::Form
            } else {
                AuthType::None
            }
        }
        _ => AuthType::Unknown,
    }
}

/// Extract a model name from a device-info response body.
pub fn extract_model(body: &str) -> Option<String> {
    extract_field(body, r#"(?i)(?:model|deviceType|deviceName)["\s:=>]+([^"<,\n\r]+)"#)
}

/// Extract a firmware version from a device-info response body.
pub fn extract_firmware(body: &str) -> Option<String> {
    extract_field(
        body,
        r#"(?i)(?:firmwareVersion|firmware|softwareVersion)["\s:=>]+([^"<,\n\r]+)"#,
    )
}

fn extract_field(body: &str, pattern: &str) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    let capture = re.captures(body)?.get(1)?;
    let value = capture.as_str().trim().trim_matches('/').trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Fingerprint runner
pub struct Fingerprinter {
    http: HttpClient,
    max_concurrent_hosts: usize,
}

impl Fingerprinter {
    pub fn new(http: HttpClient, max_concurrent_hosts: usize) -> Self {
        Self {
            http,
            max_concurrent_hosts,
        }
    }

    /// Fingerprint all discovered hosts, in parallel up to the configured cap.
    pub async fn run(&self, hosts: &[DiscoveredHost]) -> Result<Vec<FingerprintResult>> {
        let tasks: Vec<_> = hosts
            .iter()
            .cloned()
            .map(|host| {
                let http = self.http.clone();
                async move { Ok(fingerprint_host(&http, &host).await) }
            })
            .collect();

        let outcomes = run_bounded(tasks, self.max_concurrent_hosts).await;
        let results: Vec<FingerprintResult> = outcomes
            .into_iter()
            .filter_map(|o| o.fulfilled())
            .collect();

        tracing::info!(hosts = results.len(), "fingerprinting complete");
        Ok(results)
    }
}

async fn fingerprint_host(http: &HttpClient, host: &DiscoveredHost) -> FingerprintResult {
    let mut result = FingerprintResult::new(host);

    match host.service.as_str() {
        "telnet" => result.add_protocol(Protocol::Telnet),
        "ssh" => result.add_protocol(Protocol::Ssh),
        _ => {}
    }

    match port_class(host.port) {
        PortClass::Rtsp => fingerprint_rtsp_port(&mut result).await,
        class => fingerprint_web_port(http, &mut result, class).await,
    }

    result
}

async fn fingerprint_web_port(http: &HttpClient, result: &mut FingerprintResult, class: PortClass) {
    result.add_protocol(if class == PortClass::Https {
        Protocol::Https
    } else {
        Protocol::Http
    });

    let base_url = result.base_url();
    let options = RequestOptions::with_timeout(PROBE_TIMEOUT);

    match http.get(&format!("{}/", base_url), &options).await {
        Ok(response) => {
            result.web_ui = true;
            result.headers = response.headers.clone();
            if let Some(server) = response.header("server") {
                result.server_banner = server.to_string();
            }
            result.auth_type = derive_auth_type(
                response.status,
                response.header("www-authenticate"),
                &response.body,
            );

            result.vendor = detect_from_headers(response.headers.values().map(|v| v.as_str()))
                .or_else(|| detect_from_body(&response.body))
                .unwrap_or(Vendor::Unknown);
        }
        Err(e) => {
            tracing::debug!(ip = %result.ip, port = result.port, error = %e, "root probe failed");
        }
    }

    // Existence probes settle vendors that hide their identity on the root page.
    if result.vendor == Vendor::Unknown && result.web_ui {
        result.vendor = probe_vendor_paths(http, &base_url).await;
    }

    if result.vendor != Vendor::Unknown {
        if let Some((model, firmware)) = fetch_device_info(http, &base_url, result.vendor).await {
            result.model = model;
            result.firmware = firmware;
        }
    }

    if probe_onvif(http, result.scheme(), &result.ip, result.port).await {
        result.onvif_supported = true;
        result.add_protocol(Protocol::Onvif);
    }

    // Cameras that serve HTTP usually stream on 554 regardless.
    if let Ok(ip) = result.ip.parse::<IpAddr>() {
        if let Ok(response) = rtsp_options(ip, 554, None).await {
            if response.status_code != 0 {
                result.add_protocol(Protocol::Rtsp);
                if result.vendor == Vendor::Unknown {
                    if let Some(server) = response.headers.get("server") {
                        result.vendor = detect_from_banner(server).unwrap_or(Vendor::Unknown);
                    }
                }
            }
        }
    }
}

async fn fingerprint_rtsp_port(result: &mut FingerprintResult) {
    let ip: IpAddr = match result.ip.parse() {
        Ok(ip) => ip,
        Err(_) => return,
    };

    if let Ok(response) = rtsp_options(ip, result.port, None).await {
        if response.status_code != 0 {
            result.add_protocol(Protocol::Rtsp);
            if let Some(server) = response.headers.get("server") {
                result.server_banner = server.clone();
                result.vendor = detect_from_banner(server).unwrap_or(Vendor::Unknown);
            }
            result.auth_type = if response.status_code == 401 {
                AuthType::Basic
            } else {
                AuthType::None
            };
        }
    }
}

async fn probe_vendor_paths(http: &HttpClient, base_url: &str) -> Vendor {
    let options = RequestOptions::with_timeout(PROBE_TIMEOUT);
    for signature in VENDOR_REGISTRY {
        for path in signature.probe_paths {
            let url = format!("{}{}", base_url, path);
            if let Ok(response) = http.get(&url, &options).await {
                if (200..400).contains(&response.status) {
                    return signature.vendor;
                }
            }
        }
    }
    Vendor::Unknown
}

async fn fetch_device_info(
    http: &HttpClient,
    base_url: &str,
    vendor: Vendor,
) -> Option<(Option<String>, Option<String>)> {
    let signature = signature_for(vendor)?;
    let options = RequestOptions::with_timeout(PROBE_TIMEOUT);

    let mut model = None;
    let mut firmware = None;
    for path in signature.device_info_paths {
        let url = format!("{}{}", base_url, path);
        let Ok(response) = http.get(&url, &options).await else {
            continue;
        };
        if !response.is_success() {
            continue;
        }
        if model.is_none() {
            model = extract_model(&response.body);
        }
        if firmware.is_none() {
            firmware = extract_firmware(&response.body);
        }
        if model.is_some() && firmware.is_some() {
            break;
        }
    }

    Some((model, firmware))
}
