//! Audit subsystem
//!
//! ## Responsibilities
//!
//! - Session directory layout
//! - Append-only per-module event logs (JSONL, fsynced per line)
//! - Append-only unified workflow log
//! - Atomically updated session metrics file
//!
//! All sinks live under one session directory:
//!
//! ```text
//! <session>/
//!   agents/<module>_attempt_<n>.jsonl
//!   workflow.log
//!   session.json
//!   deliverables/*.json
//!   deliverables/security_assessment_report.md
//! ```

mod event_log;
mod metrics;
mod workflow_log;

pub use event_log::ModuleEventLog;
pub use metrics::{
    MetricsStore, ModuleMetrics, ModuleStatus, SessionMetrics, SessionStatus, SessionSummary,
};
pub use workflow_log::WorkflowLog;

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Resolved paths inside one session directory
#[derive(Debug, Clone)]
pub struct SessionPaths {
    root: PathBuf,
}

impl SessionPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the directory skeleton.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(self.agents_dir())?;
        std::fs::create_dir_all(self.deliverables_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.root.join("agents")
    }

    pub fn deliverables_dir(&self) -> PathBuf {
        self.root.join("deliverables")
    }

    pub fn workflow_log(&self) -> PathBuf {
        self.root.join("workflow.log")
    }

    pub fn session_file(&self) -> PathBuf {
        self.root.join("session.json")
    }

    pub fn session_lock_file(&self) -> PathBuf {
        self.root.join("session.json.lock")
    }

    /// Event log for one module attempt; each attempt gets a fresh file.
    pub fn module_event_log(&self, module: &str, attempt: u32) -> PathBuf {
        self.agents_dir()
            .join(format!("{}_attempt_{}.jsonl", module, attempt))
    }

    pub fn deliverable(&self, name: &str) -> PathBuf {
        self.deliverables_dir().join(name)
    }

    pub fn report_file(&self) -> PathBuf {
        self.deliverables_dir().join("security_assessment_report.md")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_session_contract() {
        let paths = SessionPaths::new("/tmp/session-x");
        assert!(paths.workflow_log().ends_with("workflow.log"));
        assert!(paths.session_file().ends_with("session.json"));
        assert!(paths
            .module_event_log("discovery", 2)
            .ends_with("agents/discovery_attempt_2.jsonl"));
        assert!(paths
            .deliverable("discovery_results.json")
            .ends_with("deliverables/discovery_results.json"));
        assert!(paths
            .report_file()
            .ends_with("deliverables/security_assessment_report.md"));
    }
}
