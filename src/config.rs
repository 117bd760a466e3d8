//! Assessment configuration
//!
//! ## Responsibilities
//!
//! - Validated config record for a single assessment session
//! - Defaults matching unattended camera assessment
//! - YAML deserialization and validation

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default camera service ports probed when a target gives no explicit list.
pub const DEFAULT_CAMERA_PORTS: &[u16] = &[
    80, 81, 82, 85, 443, 554, 2020, 8080, 8081, 8443, 8554, 8555, 8888, 9000, 10554, 22, 23,
];

/// A single network target: host or CIDR range plus an explicit port list.
///
/// An empty port list means the full default camera port set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    pub target: String,
    #[serde(default)]
    pub ports: Vec<u16>,
}

impl TargetSpec {
    pub fn new(target: impl Into<String>, ports: Vec<u16>) -> Self {
        Self {
            target: target.into(),
            ports,
        }
    }

    /// Ports to assess, falling back to the default camera port set.
    pub fn effective_ports(&self) -> Vec<u16> {
        if self.ports.is_empty() {
            DEFAULT_CAMERA_PORTS.to_vec()
        } else {
            self.ports.clone()
        }
    }

    /// Whether the target is a CIDR range rather than a single host.
    pub fn is_cidr(&self) -> bool {
        self.target.contains('/')
    }
}

/// Credential testing section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    pub use_defaults: bool,
    #[serde(default)]
    pub custom: Vec<CustomCredential>,
    pub max_attempts_per_host: usize,
    pub delay_ms: u64,
}

/// Caller-supplied credential pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomCredential {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            use_defaults: true,
            custom: Vec::new(),
            max_attempts_per_host: 30,
            delay_ms: 0,
        }
    }
}

/// CVE scanning section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CveConfig {
    pub enabled: bool,
    pub safe_mode: bool,
    #[serde(default)]
    pub categories: Vec<String>,
    pub ai_enabled: bool,
    pub ai_max_cves_per_host: usize,
}

impl Default for CveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            safe_mode: true,
            categories: Vec::new(),
            ai_enabled: false,
            ai_max_cves_per_host: 5,
        }
    }
}

/// Protocol fuzzing section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub rtsp: bool,
    pub onvif: bool,
    pub http: bool,
    pub telnet: bool,
    pub ssh: bool,
    pub ai_enabled: bool,
    pub ai_max_paths_per_host: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            rtsp: true,
            onvif: true,
            http: true,
            telnet: false,
            ssh: false,
            ai_enabled: false,
            ai_max_paths_per_host: 10,
        }
    }
}

/// Exploitation delegation section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploitationConfig {
    pub enabled: bool,
    /// Seconds granted to the external tool per exploit
    pub timeout_per_exploit: u64,
    pub auto_exploit_confirmed: bool,
    /// External framework command; `None` records delegation without spawning
    #[serde(default)]
    pub command: Option<String>,
}

impl Default for ExploitationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_per_exploit: 120,
            auto_exploit_confirmed: false,
            command: None,
        }
    }
}

/// Reporting section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    pub format: String,
    pub include_poc: bool,
    pub severity_threshold: String,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            format: "markdown".to_string(),
            include_poc: false,
            severity_threshold: "info".to_string(),
        }
    }
}

/// Pacing section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_concurrent_hosts: usize,
    pub requests_per_second: f64,
    pub timeout_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent_hosts: 10,
            requests_per_second: 5.0,
            timeout_ms: 8000,
        }
    }
}

/// Validated configuration for one assessment session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentConfig {
    pub targets: Vec<TargetSpec>,
    #[serde(default)]
    pub credentials: CredentialConfig,
    #[serde(default)]
    pub cve_testing: CveConfig,
    #[serde(default)]
    pub protocols: ProtocolConfig,
    #[serde(default)]
    pub exploitation: ExploitationConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
    #[serde(default)]
    pub rate_limiting: RateLimitConfig,
}

impl AssessmentConfig {
    /// Load and validate a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: AssessmentConfig = serde_yaml::from_str(&raw)
            .map_err(|e| Error::Configuration(format!("config parse failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.requests_per_second <= 0.0 {
            return Err(Error::Configuration(
                "rate_limiting.requests_per_second must be > 0".to_string(),
            ));
        }
        if self.rate_limiting.max_concurrent_hosts == 0 {
            return Err(Error::Configuration(
                "rate_limiting.max_concurrent_hosts must be >= 1".to_string(),
            ));
        }
        if self.credentials.max_attempts_per_host == 0 {
            return Err(Error::Configuration(
                "credentials.max_attempts_per_host must be >= 1".to_string(),
            ));
        }
        match self.reporting.severity_threshold.as_str() {
            "critical" | "high" | "medium" | "low" | "info" => {}
            other => {
                return Err(Error::Configuration(format!(
                    "reporting.severity_threshold '{}' is not one of critical|high|medium|low|info",
                    other
                )))
            }
        }
        for spec in &self.targets {
            if spec.target.trim().is_empty() {
                return Err(Error::Configuration("empty target".to_string()));
            }
        }
        Ok(())
    }
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            credentials: CredentialConfig::default(),
            cve_testing: CveConfig::default(),
            protocols: ProtocolConfig::default(),
            exploitation: ExploitationConfig::default(),
            reporting: ReportingConfig::default(),
            rate_limiting: RateLimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_target() -> AssessmentConfig {
        AssessmentConfig {
            targets: vec![TargetSpec::new("192.0.2.10", vec![80, 554])],
            ..AssessmentConfig::default()
        }
    }

    #[test]
    fn default_config_validates() {
        config_with_target().validate().unwrap();
    }

    #[test]
    fn zero_rps_is_rejected() {
        let mut config = config_with_target();
        config.rate_limiting.requests_per_second = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_severity_threshold_is_rejected() {
        let mut config = config_with_target();
        config.reporting.severity_threshold = "urgent".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_port_list_expands_to_default_set() {
        let spec = TargetSpec::new("192.0.2.10", Vec::new());
        let ports = spec.effective_ports();
        assert!(ports.contains(&554));
        assert!(ports.contains(&8554));
        assert!(ports.contains(&23));
        assert_eq!(ports.len(), DEFAULT_CAMERA_PORTS.len());
    }

    #[test]
    fn cidr_detection() {
        assert!(TargetSpec::new("192.0.2.0/24", vec![]).is_cidr());
        assert!(!TargetSpec::new("192.0.2.10", vec![]).is_cidr());
    }

    #[test]
    fn yaml_round_trip_with_partial_sections() {
        let yaml = r#"
targets:
  - target: 192.0.2.0/24
credentials:
  use_defaults: true
  max_attempts_per_host: 10
  delay_ms: 100
"#;
        let config: AssessmentConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.credentials.max_attempts_per_host, 10);
        assert!(config.cve_testing.enabled);
        assert_eq!(config.rate_limiting.max_concurrent_hosts, 10);
    }
}
