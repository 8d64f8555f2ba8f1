//! Run reporting and the on-disk run log
//!
//! Stage- and record-level failures never abort the run; they are captured
//! here, written to a timestamped log file with sensitive values redacted,
//! and surfaced to the operator as warnings. Only fatal failures propagate
//! as errors.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use log::warn;
use serde_json::Value;

/// Keys whose values are masked in the run log
const SENSITIVE_KEYS: &[&str] = &["password", "token", "access_token", "refresh_token", "email"];

/// Result of one pipeline stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Ok,
    Skipped(String),
    Failed(String),
}

/// One named stage with its outcome
#[derive(Debug, Clone)]
pub struct StageReport {
    pub name: String,
    pub outcome: StageOutcome,
}

/// Per-run summary of all stages plus operator warnings
#[derive(Debug, Default)]
pub struct RunReport {
    pub stages: Vec<StageReport>,
    pub warnings: Vec<String>,
}

impl RunReport {
    pub fn record(&mut self, name: impl Into<String>, outcome: StageOutcome) {
        self.stages.push(StageReport {
            name: name.into(),
            outcome,
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn failed_stages(&self) -> Vec<&StageReport> {
        self.stages
            .iter()
            .filter(|s| matches!(s.outcome, StageOutcome::Failed(_)))
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed_stages().is_empty()
    }
}

/// Append-only run log file, created per invocation
#[derive(Debug)]
pub struct RunLog {
    file: Mutex<File>,
    path: PathBuf,
}

impl RunLog {
    /// Create `template-cli-run-<timestamp>.log` under `dir`
    pub fn create(dir: &Path) -> Result<Self> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
        let path = dir.join(format!("template-cli-run-{}.log", stamp));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to create run log {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line. Logging failures are reported but
    /// never fail the transfer.
    pub fn write(&self, message: &str) {
        let line = format!("{} {}\n", Utc::now().to_rfc3339(), message);
        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = file.write_all(line.as_bytes()) {
            warn!("Failed to write run log: {}", err);
        }
    }
}

/// Copy of `value` with sensitive field values masked, recursively
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                if SENSITIVE_KEYS.contains(&key.as_str()) && !value.is_null() {
                    out.insert(key.clone(), Value::String("<redacted>".to_string()));
                } else {
                    out.insert(key.clone(), redact(value));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redact_masks_sensitive_keys() {
        let value = json!({
            "email": "admin@example.com",
            "password": "hunter2",
            "name": "Admin",
            "nested": {"token": "abc", "role": "x"},
            "list": [{"access_token": "t"}]
        });

        let redacted = redact(&value);
        assert_eq!(redacted["email"], json!("<redacted>"));
        assert_eq!(redacted["password"], json!("<redacted>"));
        assert_eq!(redacted["name"], json!("Admin"));
        assert_eq!(redacted["nested"]["token"], json!("<redacted>"));
        assert_eq!(redacted["nested"]["role"], json!("x"));
        assert_eq!(redacted["list"][0]["access_token"], json!("<redacted>"));
    }

    #[test]
    fn test_redact_leaves_null_sensitive_values() {
        let redacted = redact(&json!({"email": null}));
        assert_eq!(redacted["email"], Value::Null);
    }

    #[test]
    fn test_report_tracks_failures() {
        let mut report = RunReport::default();
        report.record("roles", StageOutcome::Ok);
        report.record("files", StageOutcome::Failed("boom".to_string()));
        report.record("flows", StageOutcome::Skipped("disabled".to_string()));

        assert!(report.has_failures());
        assert_eq!(report.failed_stages().len(), 1);
        assert_eq!(report.failed_stages()[0].name, "files");
    }

    #[test]
    fn test_run_log_writes_lines() {
        let dir = std::env::temp_dir().join(format!("template-cli-log-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let log = RunLog::create(&dir).unwrap();
        log.write("stage roles: ok");
        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert!(contents.contains("stage roles: ok"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
