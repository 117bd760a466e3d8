//! CVE scanner
//!
//! ## Responsibilities
//!
//! - Run the static vulnerability check registry against fingerprinted hosts
//! - Vendor matching, category filters and safe-mode gating
//!
//! AI-augmented checks share the registry contract but are produced by an
//! external collaborator; the scanner only honors the config gate.

mod checks;

pub use checks::registry;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::{CveConfig, RateLimitConfig};
use crate::error::Result;
use crate::exec::{run_bounded, RateLimiter};
use crate::fingerprint::{FingerprintResult, Vendor};
use crate::fuzzer::Severity;
use crate::net::HttpClient;

/// Deadline for CVE probe requests.
const PROBE_TIMEOUT: Duration = Duration::from_secs(8);

/// Boxed future returned by a check probe
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = CveTestResult> + Send + 'a>>;

/// Probe entry point of a registered check
pub type ProbeFn =
    for<'a> fn(&'a CveContext, &'a FingerprintResult, &'a CveCheck) -> ProbeFuture<'a>;

/// Shared context handed to probes
pub struct CveContext {
    pub http: HttpClient,
    pub timeout: Duration,
}

/// One registered vulnerability check
pub struct CveCheck {
    pub cve_id: &'static str,
    /// `None` = generic, applies to every vendor
    pub vendor: Option<Vendor>,
    pub title: &'static str,
    pub severity: Severity,
    pub description: &'static str,
    pub category: &'static str,
    /// Safe checks are read-only and allowed under safe_mode
    pub safe: bool,
    pub affected_models: &'static [&'static str],
    pub affected_firmware: &'static [&'static str],
    pub remediation: &'static str,
    pub probe: ProbeFn,
}

impl CveCheck {
    /// Whether this check applies to a target under the given config.
    pub fn applies_to(&self, target: &FingerprintResult, config: &CveConfig) -> bool {
        if config.safe_mode && !self.safe {
            return false;
        }
        if !config.categories.is_empty()
            && !config.categories.iter().any(|c| c == self.category)
        {
            return false;
        }
        match self.vendor {
            None => true,
            Some(vendor) => vendor == target.vendor,
        }
    }
}

/// Result of one check against one host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CveTestResult {
    pub cve_id: String,
    pub ip: String,
    pub port: u16,
    pub vendor: Vendor,
    pub title: String,
    pub severity: Severity,
    pub vulnerable: bool,
    pub evidence: String,
    pub poc: String,
    pub remediation: String,
}

/// Aggregated CVE module output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CveModuleResult {
    pub total_checks: usize,
    pub vulnerable_count: usize,
    pub duration_ms: u64,
    pub results: Vec<CveTestResult>,
}

/// CVE scanning runner
pub struct CveScanner {
    context: Arc<CveContext>,
    limiter: Arc<RateLimiter>,
    config: CveConfig,
    max_concurrent_hosts: usize,
}

impl CveScanner {
    pub fn new(http: HttpClient, config: CveConfig, rate: &RateLimitConfig) -> Self {
        Self {
            context: Arc::new(CveContext {
                http,
                timeout: PROBE_TIMEOUT,
            }),
            limiter: Arc::new(RateLimiter::new(rate.requests_per_second)),
            config,
            max_concurrent_hosts: rate.max_concurrent_hosts,
        }
    }

    /// Run matching checks against every target.
    pub async fn run(&self, targets: &[FingerprintResult]) -> Result<CveModuleResult> {
        let started = Instant::now();

        if !self.config.enabled {
            tracing::info!("cve scanning disabled by configuration");
            return Ok(CveModuleResult::default());
        }

        let tasks: Vec<_> = targets
            .iter()
            .cloned()
            .map(|target| {
                let context = self.context.clone();
                let limiter = self.limiter.clone();
                let config = self.config.clone();
                async move {
                    let mut results = Vec::new();
                    for check in registry() {
                        if !check.applies_to(&target, &config) {
                            continue;
                        }
                        limiter.acquire().await;
                        let result = (check.probe)(&context, &target, &check).await;
                        results.push(result);
                    }
                    Ok(results)
                }
            })
            .collect();

        let outcomes = run_bounded(tasks, self.max_concurrent_hosts).await;

        let mut module = CveModuleResult::default();
        for outcome in outcomes {
            if let Some(results) = outcome.fulfilled() {
                for result in results {
                    module.total_checks += 1;
                    if result.vulnerable {
                        module.vulnerable_count += 1;
                    }
                    module.results.push(result);
                }
            }
        }
        module.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            checks = module.total_checks,
            vulnerable = module.vulnerable_count,
            "cve scanning complete"
        );
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{AuthType, Protocol};

    fn target(vendor: Vendor) -> FingerprintResult {
        FingerprintResult {
            ip: "192.0.2.10".into(),
            port: 80,
            vendor,
            model: None,
            firmware: None,
            protocols: vec![Protocol::Http],
            server_banner: String::new(),
            auth_type: AuthType::None,
            web_ui: true,
            onvif_supported: false,
            headers: Default::default(),
        }
    }

    fn config() -> CveConfig {
        CveConfig::default()
    }

    #[test]
    fn vendor_checks_only_match_their_vendor() {
        let checks = registry();
        let hik = checks.iter().find(|c| c.cve_id == "CVE-2017-7921").unwrap();
        assert!(hik.applies_to(&target(Vendor::Hikvision), &config()));
        assert!(!hik.applies_to(&target(Vendor::Dahua), &config()));
    }

    #[test]
    fn generic_checks_match_every_vendor() {
        let checks = registry();
        let generic = checks.iter().find(|c| c.cve_id == "CVE-2020-25078").unwrap();
        assert!(generic.applies_to(&target(Vendor::Unknown), &config()));
        assert!(generic.applies_to(&target(Vendor::Axis), &config()));
    }

    #[test]
    fn safe_mode_withholds_unsafe_checks() {
        let checks = registry();
        let unsafe_check = checks.iter().find(|c| !c.safe).unwrap();
        let mut cfg = config();
        cfg.safe_mode = true;
        assert!(!unsafe_check.applies_to(&target(Vendor::Hikvision), &cfg));
        cfg.safe_mode = false;
        assert!(unsafe_check.applies_to(&target(Vendor::Hikvision), &cfg));
    }

    #[test]
    fn category_filter_narrows_the_registry() {
        let mut cfg = config();
        cfg.categories = vec!["traversal".to_string()];
        let applicable: Vec<&'static str> = registry()
            .iter()
            .filter(|c| c.applies_to(&target(Vendor::Unknown), &cfg))
            .map(|c| c.cve_id)
            .collect();
        assert_eq!(applicable, vec!["GENERIC-TRAVERSAL"]);
    }
}
