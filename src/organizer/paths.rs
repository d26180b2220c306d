use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct VaultPaths {
    pub vault_root: PathBuf,
    pub inbox_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub daily_dir: PathBuf,
    pub weekly_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub state_file: PathBuf,
    pub ledger_file: PathBuf,
}

impl VaultPaths {
    pub fn new(vault_root: impl Into<PathBuf>, inbox_dir: impl Into<PathBuf>) -> Self {
        let vault_root = vault_root.into();
        Self {
            inbox_dir: inbox_dir.into(),
            archive_dir: vault_root.join("Archive"),
            daily_dir: vault_root.join("Logs").join("Daily"),
            weekly_dir: vault_root.join("Logs").join("Weekly"),
            logs_dir: vault_root.join("Logs").join("System"),
            state_file: vault_root.join("system_memory.json"),
            ledger_file: vault_root.join("archive_ledger.jsonl"),
            vault_root,
        }
    }

    /// Creates every directory the pipeline writes into. Safe to repeat.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [
            &self.vault_root,
            &self.inbox_dir,
            &self.archive_dir,
            &self.daily_dir,
            &self.weekly_dir,
            &self.logs_dir,
        ] {
            fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn audit_log(&self) -> PathBuf {
        self.logs_dir.join("audit.log")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.logs_dir.join("organizer.lock")
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub vault: Option<PathBuf>,
    pub inbox: Option<PathBuf>,
}

pub fn resolve_paths(overrides: &PathOverrides) -> Result<VaultPaths> {
    let home = required_home_dir()?;
    let vault_root = match &overrides.vault {
        Some(path) => path.clone(),
        None => env_or_default_path("ORGANIZER_VAULT_DIR", home.join("My_Knowledge_Vault")),
    };
    let inbox_dir = match &overrides.inbox {
        Some(path) => path.clone(),
        None => env_or_default_path("ORGANIZER_INBOX_DIR", home.join("Inbox_Camera_Uploads")),
    };
    Ok(VaultPaths::new(vault_root, inbox_dir))
}

pub fn display_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::{VaultPaths, display_relative};
    use std::path::Path;
    use tempfile::tempdir;

    #[test]
    fn layout_follows_vault_conventions() {
        let paths = VaultPaths::new("/v", "/in");
        assert_eq!(paths.archive_dir, Path::new("/v/Archive"));
        assert_eq!(paths.daily_dir, Path::new("/v/Logs/Daily"));
        assert_eq!(paths.weekly_dir, Path::new("/v/Logs/Weekly"));
        assert_eq!(paths.state_file, Path::new("/v/system_memory.json"));
        assert_eq!(paths.inbox_dir, Path::new("/in"));
    }

    #[test]
    fn ensure_layout_is_idempotent() {
        let tmp = tempdir().expect("tempdir");
        let paths = VaultPaths::new(tmp.path().join("vault"), tmp.path().join("inbox"));
        paths.ensure_layout().expect("first");
        paths.ensure_layout().expect("second");
        assert!(paths.daily_dir.is_dir());
        assert!(paths.inbox_dir.is_dir());
    }

    #[test]
    fn display_relative_strips_root() {
        assert_eq!(
            display_relative(Path::new("/v"), Path::new("/v/Archive/a.jpg")),
            "Archive/a.jpg"
        );
    }
}
