use crate::organizer::paths::VaultPaths;
use anyhow::{Context, Result};
use chrono::{Local, SecondsFormat};
use serde::Serialize;
use std::fs;
use std::io::Write;

/// One line of `Logs/System/audit.log`.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent<'a> {
    pub at: String,
    pub phase: &'a str,
    pub status: &'a str,
    pub message: &'a str,
}

pub fn append_event(paths: &VaultPaths, phase: &str, status: &str, message: &str) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let event = AuditEvent {
        at: Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
        phase,
        status,
        message,
    };
    let path = paths.audit_log();
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(format!("{}\n", serde_json::to_string(&event)?).as_bytes())
        .with_context(|| format!("failed to append {}", path.display()))?;
    Ok(())
}

/// Audit failures must never change the outcome of the operation they describe.
pub fn record(paths: &VaultPaths, phase: &str, status: &str, message: &str) {
    if let Err(err) = append_event(paths, phase, status, message) {
        tracing::warn!(phase, status, error = %format!("{err:#}"), "audit append failed");
    }
}
