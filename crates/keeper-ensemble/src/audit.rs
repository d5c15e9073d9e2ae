//! Append-only audit log.
//!
//! One line per security-relevant action:
//! `2026-10-19T10:30:00Z | store_rotated | scope=quorum | kind=truststore`

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

const AUDIT_FILENAME: &str = "keeper-audit.log";

pub fn audit_log_path(state_dir: &Path) -> PathBuf {
    state_dir.join(AUDIT_FILENAME)
}

/// Append an entry to the log at `path`.
pub fn append_entry_to(
    path: &Path,
    event: &str,
    fields: &[(&str, &str)],
) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let mut line = format!("{timestamp} | {event}");
    for (key, value) in fields {
        line.push_str(&format!(" | {key}={value}"));
    }
    line.push('\n');

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(line.as_bytes())?;

    tracing::debug!(event, "Audit log entry written");
    Ok(())
}

/// Audit sink bound to a state directory. Failures are logged, not raised.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: audit_log_path(state_dir),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, event: &str, fields: &[(&str, &str)]) {
        if let Err(e) = append_entry_to(&self.path, event, fields) {
            tracing::warn!(event, error = %e, "Failed to write audit entry");
        }
    }
}
