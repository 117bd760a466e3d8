//! Assessment report generation
//!
//! Writes the session's Markdown summary deliverable. The full-featured
//! formatter lives outside the pipeline; this writer guarantees the report
//! deliverable exists for every session, including empty ones.

use chrono::Utc;

use crate::config::ReportingConfig;
use crate::fuzzer::Severity;

use super::AssessmentResults;

/// Render the Markdown report for one session.
pub fn render_report(
    session_id: &str,
    results: &AssessmentResults,
    config: &ReportingConfig,
) -> String {
    let threshold = Severity::parse(&config.severity_threshold).unwrap_or(Severity::Info);
    let mut out = String::new();

    out.push_str("# Security Assessment Report\n\n");
    out.push_str(&format!("- Session: `{}`\n", session_id));
    out.push_str(&format!("- Generated: {}\n", Utc::now().to_rfc3339()));
    out.push_str(&format!(
        "- Targets scanned: {}\n",
        results.discovery.targets_scanned
    ));
    out.push_str("\n## Summary\n\n");
    out.push_str("| Metric | Count |\n|---|---|\n");
    out.push_str(&format!(
        "| Discovered services | {} |\n",
        results.discovery.hosts.len()
    ));
    out.push_str(&format!(
        "| Fingerprinted hosts | {} |\n",
        results.fingerprints.len()
    ));
    out.push_str(&format!(
        "| Credential attempts | {} |\n",
        results.credentials.attempts
    ));
    out.push_str(&format!(
        "| Successful logins | {} |\n",
        results.credentials.successful_logins
    ));
    out.push_str(&format!(
        "| Compromised hosts | {} |\n",
        results.credentials.compromised_hosts
    ));
    out.push_str(&format!(
        "| Confirmed vulnerabilities | {} |\n",
        results.cves.vulnerable_count
    ));
    out.push_str(&format!(
        "| Protocol findings | {} |\n",
        results.fuzzer.findings.len()
    ));

    if results.discovery.hosts.is_empty() {
        out.push_str("\nNo reachable camera services were discovered in the target set.\n");
        return out;
    }

    out.push_str("\n## Identified Devices\n\n");
    out.push_str("| Host | Vendor | Model | Firmware | Auth | Protocols |\n|---|---|---|---|---|---|\n");
    for fp in &results.fingerprints {
        let protocols = fp
            .protocols
            .iter()
            .map(|p| format!("{:?}", p).to_lowercase())
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(
            "| {}:{} | {} | {} | {} | {:?} | {} |\n",
            fp.ip,
            fp.port,
            fp.vendor.as_str(),
            fp.model.as_deref().unwrap_or("-"),
            fp.firmware.as_deref().unwrap_or("-"),
            fp.auth_type,
            protocols
        ));
    }

    let successes: Vec<_> = results
        .credentials
        .results
        .iter()
        .filter(|r| r.success)
        .collect();
    if !successes.is_empty() {
        out.push_str("\n## Compromised Credentials\n\n");
        for result in successes {
            out.push_str(&format!(
                "- `{}:{}` ({:?}): `{}` / `{}` — {}\n",
                result.ip,
                result.port,
                result.protocol,
                result.credential.username,
                mask_password(&result.credential.password),
                result.evidence
            ));
        }
    }

    let vulnerable: Vec<_> = results
        .cves
        .results
        .iter()
        .filter(|r| r.vulnerable && r.severity >= threshold)
        .collect();
    if !vulnerable.is_empty() {
        out.push_str("\n## Confirmed Vulnerabilities\n\n");
        for result in vulnerable {
            out.push_str(&format!(
                "### {} — {} ({})\n\n",
                result.cve_id,
                result.title,
                result.severity.as_str()
            ));
            out.push_str(&format!("- Host: `{}:{}`\n", result.ip, result.port));
            out.push_str(&format!("- Evidence: {}\n", result.evidence));
            if config.include_poc && !result.poc.is_empty() {
                out.push_str(&format!("- PoC: `{}`\n", result.poc));
            }
            out.push_str(&format!("- Remediation: {}\n\n", result.remediation));
        }
    }

    let findings: Vec<_> = results
        .fuzzer
        .findings
        .iter()
        .filter(|f| f.severity >= threshold)
        .collect();
    if !findings.is_empty() {
        out.push_str("\n## Protocol Exposure\n\n");
        out.push_str("| Host | Type | Path | Severity | Auth required |\n|---|---|---|---|---|\n");
        for finding in findings {
            out.push_str(&format!(
                "| {}:{} | {:?} | `{}` | {} | {} |\n",
                finding.ip,
                finding.port,
                finding.finding_type,
                finding.path,
                finding.severity.as_str(),
                if finding.authenticated { "yes" } else { "no" }
            ));
        }
    }

    if let Some(exploitation) = &results.exploitation {
        out.push_str("\n## Exploitation Delegation\n\n");
        if exploitation.delegated.is_empty() {
            out.push_str("No confirmed vulnerabilities were handed to the external framework.\n");
        } else {
            for record in &exploitation.delegated {
                out.push_str(&format!(
                    "- {} on `{}:{}` — {}\n",
                    record.cve_id, record.ip, record.port, record.outcome
                ));
            }
        }
    }

    out
}

fn mask_password(password: &str) -> String {
    if password.is_empty() {
        "(empty)".to_string()
    } else {
        password.to_string()
    }
}
