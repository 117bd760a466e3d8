//! Per-module event log
//!
//! Append-only JSONL, one complete record per line. Every line is flushed and
//! fsynced immediately so a crash mid-module leaves a clean truncation
//! boundary.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde_json::json;

use crate::error::Result;

/// Append-only event sink for one module attempt
pub struct ModuleEventLog {
    module: String,
    file: File,
}

impl ModuleEventLog {
    /// Open (or create) the attempt's log file in append mode.
    pub fn open(path: impl AsRef<Path>, module: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            module: module.to_string(),
            file,
        })
    }

    /// Append one event record and fsync it to disk.
    pub fn record(&mut self, event: &str, data: serde_json::Value) -> Result<()> {
        let line = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "module": self.module,
            "event": event,
            "data": data,
        });
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}
