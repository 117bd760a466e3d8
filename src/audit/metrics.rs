//! Session metrics
//!
//! `session.json` is the single source of truth for "where is this session".
//! Updates go through reload-then-rewrite under the session mutex: read the
//! current file, mutate in memory, write a temporary sibling, rename over the
//! original. A reader at any wall-clock moment sees either the pre-update or
//! the post-update document, never a torn one.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::exec::SessionLock;

/// Overall session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

/// Per-module status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl ModuleStatus {
    /// Completed and Failed are terminal; a terminal module is never mutated
    /// again within the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ModuleStatus::Completed | ModuleStatus::Failed)
    }
}

/// Metrics record for one module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleMetrics {
    pub name: String,
    pub phase: String,
    pub status: ModuleStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub attempt: u32,
    pub error: Option<String>,
}

impl ModuleMetrics {
    pub fn pending(name: &str, phase: &str) -> Self {
        Self {
            name: name.to_string(),
            phase: phase.to_string(),
            status: ModuleStatus::Pending,
            started_at: None,
            ended_at: None,
            duration_ms: None,
            attempt: 0,
            error: None,
        }
    }
}

/// Final summary counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    pub hosts_discovered: usize,
    pub hosts_fingerprinted: usize,
    pub credentials_found: usize,
    pub vulnerabilities_found: usize,
    pub protocol_findings: usize,
}

/// Complete session metrics document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub modules: Vec<ModuleMetrics>,
    pub summary: SessionSummary,
}

impl SessionMetrics {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            status: SessionStatus::Running,
            modules: Vec::new(),
            summary: SessionSummary::default(),
        }
    }

    fn module_mut(&mut self, name: &str, phase: &str) -> &mut ModuleMetrics {
        if let Some(i) = self.modules.iter().position(|m| m.name == name) {
            return &mut self.modules[i];
        }
        self.modules.push(ModuleMetrics::pending(name, phase));
        self.modules.last_mut().expect("just pushed")
    }

    /// Transition a module's status. Terminal modules are left untouched.
    pub fn set_module_status(
        &mut self,
        name: &str,
        phase: &str,
        status: ModuleStatus,
        attempt: u32,
        error: Option<String>,
    ) {
        let module = self.module_mut(name, phase);
        if module.status.is_terminal() {
            return;
        }
        match status {
            ModuleStatus::Running => {
                if module.started_at.is_none() {
                    module.started_at = Some(Utc::now());
                }
                module.attempt = attempt;
            }
            ModuleStatus::Completed | ModuleStatus::Failed => {
                let ended = Utc::now();
                module.ended_at = Some(ended);
                if let Some(started) = module.started_at {
                    module.duration_ms = Some((ended - started).num_milliseconds().max(0) as u64);
                }
                module.error = error.clone();
            }
            _ => {}
        }
        module.status = status;
        if error.is_some() {
            module.error = error;
        }
    }

    /// Module names grouped by status, for the progress query.
    pub fn modules_with_status(&self, status: ModuleStatus) -> Vec<String> {
        self.modules
            .iter()
            .filter(|m| m.status == status)
            .map(|m| m.name.clone())
            .collect()
    }
}

/// Store applying reload-then-rewrite updates under the session mutex
#[derive(Debug, Clone)]
pub struct MetricsStore {
    path: PathBuf,
    lock: SessionLock,
}

impl MetricsStore {
    pub fn new(path: impl Into<PathBuf>, lock: SessionLock) -> Self {
        Self {
            path: path.into(),
            lock,
        }
    }

    /// Write the initial document for a fresh session.
    pub async fn init(&self, metrics: &SessionMetrics) -> Result<()> {
        let mut guard = self.lock.acquire().await?;
        let result = self.write_atomic(metrics);
        guard.release();
        result
    }

    /// Read the current document.
    pub fn read(&self) -> Result<SessionMetrics> {
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Reload, mutate, rewrite atomically.
    pub async fn update<F>(&self, mutate: F) -> Result<SessionMetrics>
    where
        F: FnOnce(&mut SessionMetrics),
    {
        let mut guard = self.lock.acquire().await?;
        let result = (|| {
            let mut metrics = self.read()?;
            mutate(&mut metrics);
            self.write_atomic(&metrics)?;
            Ok(metrics)
        })();
        guard.release();
        result
    }

    fn write_atomic(&self, metrics: &SessionMetrics) -> Result<()> {
        let serialized = serde_json::to_string_pretty(metrics)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized.as_bytes())?;
        if std::fs::rename(&tmp, &self.path).is_err() {
            // Some filesystems lock rename targets; fall back to copy-then-delete.
            std::fs::copy(&tmp, &self.path)
                .map_err(|e| Error::Io(e))?;
            std::fs::remove_file(&tmp)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> (MetricsStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("camaudit_metrics_{}_{}", tag, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.json");
        let lock = SessionLock::new(dir.join("session.json.lock"));
        (MetricsStore::new(&path, lock), path)
    }

    #[tokio::test]
    async fn init_then_update_round_trips() {
        let (store, _path) = temp_store("roundtrip");
        store.init(&SessionMetrics::new("sess-1")).await.unwrap();

        store
            .update(|m| {
                m.set_module_status("discovery", "discovery", ModuleStatus::Running, 1, None);
            })
            .await
            .unwrap();
        store
            .update(|m| {
                m.set_module_status("discovery", "discovery", ModuleStatus::Completed, 1, None);
                m.summary.hosts_discovered = 4;
            })
            .await
            .unwrap();

        let metrics = store.read().unwrap();
        assert_eq!(metrics.session_id, "sess-1");
        assert_eq!(metrics.modules.len(), 1);
        assert_eq!(metrics.modules[0].status, ModuleStatus::Completed);
        assert!(metrics.modules[0].duration_ms.is_some());
        assert_eq!(metrics.summary.hosts_discovered, 4);
    }

    #[tokio::test]
    async fn terminal_module_is_never_mutated_again() {
        let (store, _path) = temp_store("terminal");
        store.init(&SessionMetrics::new("sess-2")).await.unwrap();

        store
            .update(|m| {
                m.set_module_status("cve-scanner", "testing", ModuleStatus::Running, 1, None);
                m.set_module_status(
                    "cve-scanner",
                    "testing",
                    ModuleStatus::Failed,
                    1,
                    Some("boom".into()),
                );
            })
            .await
            .unwrap();
        store
            .update(|m| {
                m.set_module_status("cve-scanner", "testing", ModuleStatus::Completed, 2, None);
            })
            .await
            .unwrap();

        let metrics = store.read().unwrap();
        assert_eq!(metrics.modules[0].status, ModuleStatus::Failed);
        assert_eq!(metrics.modules[0].error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn document_on_disk_is_always_schema_valid() {
        let (store, path) = temp_store("valid");
        store.init(&SessionMetrics::new("sess-3")).await.unwrap();

        for i in 0..10 {
            store
                .update(move |m| {
                    m.set_module_status("fingerprint", "fingerprint", ModuleStatus::Running, i, None);
                })
                .await
                .unwrap();
            let raw = std::fs::read_to_string(&path).unwrap();
            let parsed: SessionMetrics = serde_json::from_str(&raw).unwrap();
            assert_eq!(parsed.session_id, "sess-3");
        }
    }

    #[tokio::test]
    async fn leftover_temp_file_does_not_corrupt_reads() {
        let (store, path) = temp_store("tmpfile");
        store.init(&SessionMetrics::new("sess-4")).await.unwrap();
        // Crash-shaped partial temp sibling.
        std::fs::write(path.with_extension("json.tmp"), b"{\"trunc").unwrap();
        let metrics = store.read().unwrap();
        assert_eq!(metrics.session_id, "sess-4");
    }
}
