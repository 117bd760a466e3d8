//! Workflow engine
//!
//! ## Responsibilities
//!
//! - Durable orchestration: Discovery → Fingerprint → (Credential ∥ CVE ∥
//!   Fuzzer) → conditional Exploitation → Report
//! - Short-circuit to reporting when discovery comes back empty
//! - Failure isolation between parallel testing branches
//! - Read-only progress query
//!
//! Discovery and fingerprint failures are terminal; a failed testing branch
//! yields a zeroed module result and the session continues. The report
//! activity always runs and `session.json` always reaches a terminal status.

mod activity;
mod report;

pub use activity::{
    run_activity, ActivityOptions, RetryPolicy, HEARTBEAT_INTERVAL, HEARTBEAT_TIMEOUT,
    START_TO_CLOSE,
};
pub use report::render_report;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::RwLock;
use tokio::time::timeout;

use crate::audit::{
    MetricsStore, ModuleStatus, SessionMetrics, SessionPaths, SessionStatus, WorkflowLog,
};
use crate::config::AssessmentConfig;
use crate::credential::{CredentialModuleResult, CredentialTester};
use crate::cve::{CveModuleResult, CveScanner};
use crate::discovery::{Discovery, DiscoveryResult};
use crate::error::Result;
use crate::exec::SessionLock;
use crate::fingerprint::{FingerprintResult, Fingerprinter};
use crate::fuzzer::{FuzzerModuleResult, ProtocolFuzzer};
use crate::net::HttpClient;

const MODULE_DISCOVERY: &str = "discovery";
const MODULE_FINGERPRINT: &str = "fingerprint";
const MODULE_CREDENTIAL: &str = "credential-tester";
const MODULE_CVE: &str = "cve-scanner";
const MODULE_FUZZER: &str = "protocol-fuzzer";
const MODULE_EXPLOITATION: &str = "exploitation";
const MODULE_REPORT: &str = "report";

/// One delegation hand-off to the external exploitation framework
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploitationRecord {
    pub cve_id: String,
    pub ip: String,
    pub port: u16,
    pub outcome: String,
}

/// Aggregated exploitation phase output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExploitationResult {
    pub attempted: usize,
    pub delegated: Vec<ExploitationRecord>,
    pub duration_ms: u64,
}

/// Everything the pipeline produced for one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentResults {
    pub discovery: DiscoveryResult,
    pub fingerprints: Vec<FingerprintResult>,
    pub credentials: CredentialModuleResult,
    pub cves: CveModuleResult,
    pub fuzzer: FuzzerModuleResult,
    pub exploitation: Option<ExploitationResult>,
}

/// Snapshot returned by the progress query
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub current_phase: String,
    pub current_module: String,
    pub completed_modules: Vec<String>,
    pub failed_modules: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

#[derive(Debug)]
struct ProgressState {
    current_phase: String,
    current_module: String,
    completed_modules: Vec<String>,
    failed_modules: Vec<String>,
    started_at: DateTime<Utc>,
}

/// Read-only handle for out-of-band progress queries
#[derive(Clone)]
pub struct WorkflowHandle {
    state: Arc<RwLock<ProgressState>>,
}

impl WorkflowHandle {
    /// Current progress; free of side effects, safe to call at any time.
    pub async fn progress(&self) -> Progress {
        let state = self.state.read().await;
        Progress {
            current_phase: state.current_phase.clone(),
            current_module: state.current_module.clone(),
            completed_modules: state.completed_modules.clone(),
            failed_modules: state.failed_modules.clone(),
            started_at: state.started_at,
            elapsed_ms: (Utc::now() - state.started_at).num_milliseconds().max(0) as u64,
        }
    }
}

/// Final outcome of one workflow run
#[derive(Debug)]
pub struct WorkflowOutcome {
    pub session_id: String,
    pub session_dir: PathBuf,
    pub status: SessionStatus,
    pub results: AssessmentResults,
}

/// Durable assessment workflow for one session
pub struct AssessmentWorkflow {
    config: AssessmentConfig,
    session_id: String,
    paths: SessionPaths,
    metrics: MetricsStore,
    log: WorkflowLog,
    http: HttpClient,
    progress: Arc<RwLock<ProgressState>>,
}

impl AssessmentWorkflow {
    /// Prepare a workflow run under `output_root/<session id>`.
    pub fn new(config: AssessmentConfig, output_root: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;
        let session_id = format!("session_{}", uuid::Uuid::new_v4().simple());
        let paths = SessionPaths::new(output_root.into().join(&session_id));
        let metrics = MetricsStore::new(
            paths.session_file(),
            SessionLock::new(paths.session_lock_file()),
        );
        let log = WorkflowLog::new(paths.workflow_log());
        let http = HttpClient::new()?;
        let progress = Arc::new(RwLock::new(ProgressState {
            current_phase: "pending".to_string(),
            current_module: String::new(),
            completed_modules: Vec::new(),
            failed_modules: Vec::new(),
            started_at: Utc::now(),
        }));

        Ok(Self {
            config,
            session_id,
            paths,
            metrics,
            log,
            http,
            progress,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn session_dir(&self) -> &std::path::Path {
        self.paths.root()
    }

    /// Handle for out-of-band progress queries.
    pub fn handle(&self) -> WorkflowHandle {
        WorkflowHandle {
            state: self.progress.clone(),
        }
    }

    /// Drive the full pipeline to a terminal session status.
    pub async fn run(&self) -> Result<WorkflowOutcome> {
        self.paths.ensure()?;
        self.metrics.init(&SessionMetrics::new(&self.session_id)).await?;
        self.log
            .message(&format!("session {} started", self.session_id))?;
        tracing::info!(session_id = %self.session_id, dir = %self.paths.root().display(), "assessment session started");

        match self.execute().await {
            Ok(results) => {
                self.finish_session(SessionStatus::Completed).await?;
                tracing::info!(session_id = %self.session_id, "assessment session completed");
                Ok(WorkflowOutcome {
                    session_id: self.session_id.clone(),
                    session_dir: self.paths.root().to_path_buf(),
                    status: SessionStatus::Completed,
                    results,
                })
            }
            Err(e) => {
                // A terminal failure still leaves a report and a terminal status.
                let _ = self.write_report(&empty_results());
                let _ = self
                    .metrics
                    .update(|m| {
                        m.status = SessionStatus::Failed;
                        m.ended_at = Some(Utc::now());
                    })
                    .await;
                let _ = self.log.message(&format!("session failed: {}", e));
                tracing::error!(session_id = %self.session_id, error = %e, "assessment session failed");
                Err(e)
            }
        }
    }

    async fn execute(&self) -> Result<AssessmentResults> {
        // Phase 1: discovery. Failure is terminal.
        self.set_phase("discovery", MODULE_DISCOVERY).await;
        let targets = self.config.targets.clone();
        let discovery = run_activity(
            &self.paths,
            &self.metrics,
            &self.log,
            &ActivityOptions::new(MODULE_DISCOVERY, "discovery"),
            || {
                let targets = targets.clone();
                async move { Discovery::run(&targets).await }
            },
        )
        .await?;
        self.note_module(MODULE_DISCOVERY, true).await;
        self.write_deliverable("discovery_results.json", &discovery)?;
        self.metrics
            .update(|m| m.summary.hosts_discovered = discovery.hosts.len())
            .await?;

        // Phase 2: empty shortcut straight to reporting.
        if discovery.hosts.is_empty() {
            self.log
                .message("no hosts discovered; short-circuiting to report")?;
            for (module, phase) in [
                (MODULE_FINGERPRINT, "fingerprint"),
                (MODULE_CREDENTIAL, "testing"),
                (MODULE_CVE, "testing"),
                (MODULE_FUZZER, "testing"),
                (MODULE_EXPLOITATION, "exploitation"),
            ] {
                self.metrics
                    .update(move |m| {
                        m.set_module_status(module, phase, ModuleStatus::Skipped, 0, None);
                    })
                    .await?;
            }
            let results = AssessmentResults {
                discovery,
                ..empty_results()
            };
            self.report_phase(&results).await?;
            return Ok(results);
        }

        // Phase 3: fingerprinting. Failure is terminal.
        self.set_phase("fingerprint", MODULE_FINGERPRINT).await;
        let fingerprinter = Fingerprinter::new(
            self.http.clone(),
            self.config.rate_limiting.max_concurrent_hosts,
        );
        let hosts = discovery.hosts.clone();
        let fingerprints = run_activity(
            &self.paths,
            &self.metrics,
            &self.log,
            &ActivityOptions::new(MODULE_FINGERPRINT, "fingerprint"),
            || {
                let hosts = hosts.clone();
                let fingerprinter = &fingerprinter;
                async move { fingerprinter.run(&hosts).await }
            },
        )
        .await?;
        self.note_module(MODULE_FINGERPRINT, true).await;
        self.write_deliverable("fingerprint_results.json", &fingerprints)?;
        self.metrics
            .update(|m| m.summary.hosts_fingerprinted = fingerprints.len())
            .await?;

        // Phase 4: the three testers run in parallel, failures isolated.
        self.set_phase(
            "testing",
            "credential-tester|cve-scanner|protocol-fuzzer",
        )
        .await;
        let credential_tester = CredentialTester::new(
            self.http.clone(),
            self.config.credentials.clone(),
            &self.config.rate_limiting,
        );
        let cve_scanner = CveScanner::new(
            self.http.clone(),
            self.config.cve_testing.clone(),
            &self.config.rate_limiting,
        );
        let fuzzer = ProtocolFuzzer::new(
            self.http.clone(),
            self.config.protocols.clone(),
            &self.config.rate_limiting,
        );

        let credential_options = ActivityOptions::new(MODULE_CREDENTIAL, "testing");
        let cve_options = ActivityOptions::new(MODULE_CVE, "testing");
        let fuzzer_options = ActivityOptions::new(MODULE_FUZZER, "testing");
        let (credential_outcome, cve_outcome, fuzzer_outcome) = tokio::join!(
            run_activity(
                &self.paths,
                &self.metrics,
                &self.log,
                &credential_options,
                || {
                    let tester = &credential_tester;
                    let targets = &fingerprints;
                    async move { tester.run(targets).await }
                },
            ),
            run_activity(
                &self.paths,
                &self.metrics,
                &self.log,
                &cve_options,
                || {
                    let scanner = &cve_scanner;
                    let targets = &fingerprints;
                    async move { scanner.run(targets).await }
                },
            ),
            run_activity(
                &self.paths,
                &self.metrics,
                &self.log,
                &fuzzer_options,
                || {
                    let fuzzer = &fuzzer;
                    let targets = &fingerprints;
                    async move { fuzzer.run(targets).await }
                },
            ),
        );

        let credentials = self
            .settle_branch(MODULE_CREDENTIAL, credential_outcome)
            .await?;
        let cves = self.settle_branch(MODULE_CVE, cve_outcome).await?;
        let fuzzer_result = self.settle_branch(MODULE_FUZZER, fuzzer_outcome).await?;

        self.write_deliverable("credential_results.json", &credentials)?;
        self.write_deliverable("cve_results.json", &cves)?;
        self.write_deliverable("fuzzer_results.json", &fuzzer_result)?;
        self.metrics
            .update(|m| {
                m.summary.credentials_found = credentials.successful_logins;
                m.summary.vulnerabilities_found = cves.vulnerable_count;
                m.summary.protocol_findings = fuzzer_result.findings.len();
            })
            .await?;

        // Phase 5: exploitation only when CVE confirmed something.
        let exploitation = if cves.vulnerable_count > 0 && self.config.exploitation.enabled {
            self.set_phase("exploitation", MODULE_EXPLOITATION).await;
            let exploitation_config = self.config.exploitation.clone();
            let cve_results = cves.clone();
            let outcome = run_activity(
                &self.paths,
                &self.metrics,
                &self.log,
                &ActivityOptions::new(MODULE_EXPLOITATION, "exploitation"),
                || {
                    let config = exploitation_config.clone();
                    let cves = cve_results.clone();
                    async move { run_exploitation(&config, &cves).await }
                },
            )
            .await;
            match outcome {
                Ok(result) => {
                    self.note_module(MODULE_EXPLOITATION, true).await;
                    self.write_deliverable("exploitation_results.json", &result)?;
                    Some(result)
                }
                Err(e) => {
                    // Exploitation failures never sink the session.
                    tracing::warn!(error = %e, "exploitation delegation failed");
                    self.note_module(MODULE_EXPLOITATION, false).await;
                    Some(ExploitationResult::default())
                }
            }
        } else {
            self.metrics
                .update(|m| {
                    m.set_module_status(
                        MODULE_EXPLOITATION,
                        "exploitation",
                        ModuleStatus::Skipped,
                        0,
                        None,
                    );
                })
                .await?;
            self.log.module_status(MODULE_EXPLOITATION, "skipped", &[])?;
            None
        };

        // Phase 6: reporting, always last.
        let results = AssessmentResults {
            discovery,
            fingerprints,
            credentials,
            cves,
            fuzzer: fuzzer_result,
            exploitation,
        };
        self.report_phase(&results).await?;
        Ok(results)
    }

    /// Fold a parallel branch outcome into its module result; terminal error
    /// kinds still fail the workflow.
    async fn settle_branch<T: Default>(&self, module: &str, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.note_module(module, true).await;
                Ok(value)
            }
            Err(e) if e.is_terminal() => Err(e),
            Err(e) => {
                tracing::warn!(module = module, error = %e, "testing branch failed; continuing with empty result");
                self.note_module(module, false).await;
                Ok(T::default())
            }
        }
    }

    async fn report_phase(&self, results: &AssessmentResults) -> Result<()> {
        self.set_phase("report", MODULE_REPORT).await;
        let report_results = results;
        run_activity(
            &self.paths,
            &self.metrics,
            &self.log,
            &ActivityOptions::new(MODULE_REPORT, "report"),
            || async move { self.write_report(report_results) },
        )
        .await?;
        self.note_module(MODULE_REPORT, true).await;
        Ok(())
    }

    fn write_report(&self, results: &AssessmentResults) -> Result<()> {
        let report = render_report(&self.session_id, results, &self.config.reporting);
        std::fs::write(self.paths.report_file(), report)?;
        Ok(())
    }

    async fn finish_session(&self, status: SessionStatus) -> Result<()> {
        self.metrics
            .update(move |m| {
                m.status = status;
                m.ended_at = Some(Utc::now());
            })
            .await?;
        self.log.message("session completed")?;
        Ok(())
    }

    fn write_deliverable<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.paths.deliverable(name);
        std::fs::write(path, serde_json::to_string_pretty(value)?)?;
        Ok(())
    }

    async fn set_phase(&self, phase: &str, module: &str) {
        {
            let mut state = self.progress.write().await;
            state.current_phase = phase.to_string();
            state.current_module = module.to_string();
        }
        let _ = self.log.phase(phase);
    }

    async fn note_module(&self, module: &str, completed: bool) {
        let mut state = self.progress.write().await;
        if completed {
            state.completed_modules.push(module.to_string());
        } else {
            state.failed_modules.push(module.to_string());
        }
    }
}

fn empty_results() -> AssessmentResults {
    AssessmentResults {
        discovery: DiscoveryResult {
            hosts: Vec::new(),
            duration_ms: 0,
            targets_scanned: 0,
        },
        fingerprints: Vec::new(),
        credentials: CredentialModuleResult::default(),
        cves: CveModuleResult::default(),
        fuzzer: FuzzerModuleResult::default(),
        exploitation: None,
    }
}

/// Delegate confirmed CVEs to the configured external framework.
async fn run_exploitation(
    config: &crate::config::ExploitationConfig,
    cves: &CveModuleResult,
) -> Result<ExploitationResult> {
    let started = Instant::now();
    let mut delegated = Vec::new();

    for result in cves.results.iter().filter(|r| r.vulnerable) {
        let outcome = match (&config.command, config.auto_exploit_confirmed) {
            (Some(command), true) => {
                let exchange = timeout(
                    Duration::from_secs(config.timeout_per_exploit),
                    Command::new(command)
                        .arg(&result.cve_id)
                        .arg(format!("{}:{}", result.ip, result.port))
                        .kill_on_drop(true)
                        .output(),
                )
                .await;
                match exchange {
                    Ok(Ok(output)) if output.status.success() => {
                        "external tool completed".to_string()
                    }
                    Ok(Ok(output)) => {
                        format!("external tool exited with {:?}", output.status.code())
                    }
                    Ok(Err(e)) => format!("external tool failed to start: {}", e),
                    Err(_) => "external tool timed out".to_string(),
                }
            }
            _ => "recorded for manual follow-up".to_string(),
        };
        delegated.push(ExploitationRecord {
            cve_id: result.cve_id.clone(),
            ip: result.ip.clone(),
            port: result.port,
            outcome,
        });
    }

    Ok(ExploitationResult {
        attempted: delegated.len(),
        delegated,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn temp_root(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("camaudit_wf_{}_{}", tag, uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn empty_discovery_short_circuits_to_report() {
        let config = AssessmentConfig::default();
        let workflow = AssessmentWorkflow::new(config, temp_root("empty")).unwrap();
        let outcome = workflow.run().await.unwrap();

        assert_eq!(outcome.status, SessionStatus::Completed);
        assert!(outcome.results.discovery.hosts.is_empty());
        assert!(outcome
            .session_dir
            .join("deliverables/security_assessment_report.md")
            .exists());
        assert!(outcome.session_dir.join("session.json").exists());
        assert!(outcome.session_dir.join("workflow.log").exists());

        let metrics: SessionMetrics = serde_json::from_str(
            &std::fs::read_to_string(outcome.session_dir.join("session.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(metrics.status, SessionStatus::Completed);
        assert!(metrics.ended_at.is_some());
        let skipped = metrics.modules_with_status(ModuleStatus::Skipped);
        assert!(skipped.contains(&"fingerprint".to_string()));
        assert!(skipped.contains(&"cve-scanner".to_string()));
        assert!(skipped.contains(&"exploitation".to_string()));
    }

    #[tokio::test]
    async fn progress_query_is_live_and_side_effect_free() {
        let config = AssessmentConfig::default();
        let workflow = AssessmentWorkflow::new(config, temp_root("progress")).unwrap();
        let handle = workflow.handle();

        let before = handle.progress().await;
        assert_eq!(before.current_phase, "pending");
        assert!(before.completed_modules.is_empty());

        workflow.run().await.unwrap();

        let after = handle.progress().await;
        assert_eq!(after.current_phase, "report");
        assert!(after
            .completed_modules
            .contains(&"discovery".to_string()));
        assert!(after.completed_modules.contains(&"report".to_string()));
        assert!(after.failed_modules.is_empty());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_up_front() {
        let mut config = AssessmentConfig::default();
        config.rate_limiting.requests_per_second = 0.0;
        assert!(matches!(
            AssessmentWorkflow::new(config, temp_root("badcfg")),
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn exploitation_without_command_records_delegation_only() {
        use crate::cve::CveTestResult;
        use crate::fingerprint::Vendor;
        use crate::fuzzer::Severity;

        let cves = CveModuleResult {
            total_checks: 1,
            vulnerable_count: 1,
            duration_ms: 5,
            results: vec![CveTestResult {
                cve_id: "CVE-2017-7921".into(),
                ip: "192.0.2.10".into(),
                port: 80,
                vendor: Vendor::Hikvision,
                title: "t".into(),
                severity: Severity::Critical,
                vulnerable: true,
                evidence: "e".into(),
                poc: "p".into(),
                remediation: "r".into(),
            }],
        };
        let config = crate::config::ExploitationConfig {
            enabled: true,
            ..Default::default()
        };
        let result = run_exploitation(&config, &cves).await.unwrap();
        assert_eq!(result.attempted, 1);
        assert_eq!(result.delegated[0].outcome, "recorded for manual follow-up");
    }
}
