pub mod goals;
pub mod ingest;
pub mod review;
pub mod status;

use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::fmt;

/// What a subcommand prints. Any issue makes the process exit non-zero.
#[derive(Debug, Clone)]
pub struct CommandReport {
    pub command: &'static str,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: &'static str) -> Self {
        Self {
            command,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.issues.push(text.into());
    }

    /// Turns outstanding issues into an error for the exit code.
    pub fn into_result(self) -> anyhow::Result<()> {
        if self.is_ok() {
            return Ok(());
        }
        anyhow::bail!(
            "{} finished with {} issue(s)",
            self.command,
            self.issues.len()
        )
    }
}

impl Serialize for CommandReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("CommandReport", 4)?;
        s.serialize_field("command", self.command)?;
        s.serialize_field("ok", &self.is_ok())?;
        s.serialize_field("details", &self.details)?;
        s.serialize_field("issues", &self.issues)?;
        s.end()
    }
}

impl fmt::Display for CommandReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_ok() { "ok" } else { "issues" };
        writeln!(f, "{}: {state}", self.command)?;
        for line in &self.details {
            writeln!(f, "  {line}")?;
        }
        for line in &self.issues {
            writeln!(f, "  ! {line}")?;
        }
        Ok(())
    }
}
