//! Unified workflow log
//!
//! Human-readable, append-only record of phase transitions, module status
//! transitions and free-form messages for one session.

use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;

use crate::error::Result;

/// Append-only writer for `workflow.log`
#[derive(Debug, Clone)]
pub struct WorkflowLog {
    path: PathBuf,
}

impl WorkflowLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn append(&self, line: &str) -> Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{} {}", Utc::now().to_rfc3339(), line)?;
        file.flush()?;
        Ok(())
    }

    /// Record a phase transition.
    pub fn phase(&self, phase: &str) -> Result<()> {
        self.append(&format!("[phase] {}", phase))
    }

    /// Record a module status transition with key=value details.
    pub fn module_status(&self, module: &str, status: &str, details: &[(&str, String)]) -> Result<()> {
        let mut line = format!("[module] {} status={}", module, status);
        for (key, value) in details {
            line.push_str(&format!(" {}={}", key, value));
        }
        self.append(&line)
    }

    /// Record a free-form message.
    pub fn message(&self, message: &str) -> Result<()> {
        self.append(&format!("[info] {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_appended_in_order() {
        let path = std::env::temp_dir().join(format!("camaudit_wf_{}.log", uuid::Uuid::new_v4()));
        let log = WorkflowLog::new(&path);
        log.phase("discovery").unwrap();
        log.module_status("discovery", "running", &[("attempt", "1".to_string())])
            .unwrap();
        log.module_status(
            "discovery",
            "completed",
            &[("hosts", "4".to_string()), ("duration_ms", "1520".to_string())],
        )
        .unwrap();
        log.message("short-circuit: no hosts discovered").unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("[phase] discovery"));
        assert!(lines[1].contains("status=running attempt=1"));
        assert!(lines[2].contains("hosts=4"));
        assert!(lines[3].contains("[info]"));
        std::fs::remove_file(&path).ok();
    }
}
