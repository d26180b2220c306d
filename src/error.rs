use std::path::PathBuf;
use thiserror::Error;

/// The external classification service failed or answered with something
/// that is not a usable classification document.
#[derive(Debug, Error)]
#[error("classification failed: {0}")]
pub struct ClassificationError(pub String);

impl ClassificationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A classification asked for a destination outside the archive root.
#[derive(Debug, Error)]
#[error("folder path `{folder_path}` escapes archive root {}", root.display())]
pub struct PathEscapeError {
    pub folder_path: String,
    pub root: PathBuf,
}

/// Persisted state exists but cannot be trusted. Fatal for the run.
#[derive(Debug, Error)]
#[error("state file {} is corrupt: {reason}", path.display())]
pub struct StateCorruptionError {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Error)]
#[error("invalid organizer configuration: {0}")]
pub struct ConfigInvalidError(pub String);

#[derive(Debug, Error)]
#[error("vault is locked by another organizer run ({})", lock_path.display())]
pub struct VaultLockedError {
    pub lock_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrganizerErrorCode {
    E001Locked,
    E002ConfigInvalid,
    E003StateCorrupt,
    E004ClassifierUnavailable,
}

impl OrganizerErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Locked => "E001_LOCKED",
            Self::E002ConfigInvalid => "E002_CONFIG_INVALID",
            Self::E003StateCorrupt => "E003_STATE_CORRUPT",
            Self::E004ClassifierUnavailable => "E004_CLASSIFIER_UNAVAILABLE",
        }
    }

    /// Maps a top-level error chain onto a stable code for the CLI.
    pub fn from_error(err: &anyhow::Error) -> Option<Self> {
        for cause in err.chain() {
            if cause.is::<VaultLockedError>() {
                return Some(Self::E001Locked);
            }
            if cause.is::<ConfigInvalidError>() {
                return Some(Self::E002ConfigInvalid);
            }
            if cause.is::<StateCorruptionError>() {
                return Some(Self::E003StateCorrupt);
            }
            if cause.is::<ClassificationError>() {
                return Some(Self::E004ClassifierUnavailable);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{OrganizerErrorCode, StateCorruptionError};
    use anyhow::Context;
    use std::path::PathBuf;

    #[test]
    fn error_code_survives_context_wrapping() {
        let err: anyhow::Result<()> = Err(StateCorruptionError {
            path: PathBuf::from("/vault/system_memory.json"),
            reason: "expected value".to_string(),
        }
        .into());
        let wrapped = err.context("failed to load trajectory").unwrap_err();
        assert_eq!(
            OrganizerErrorCode::from_error(&wrapped),
            Some(OrganizerErrorCode::E003StateCorrupt)
        );
    }

    #[test]
    fn plain_io_errors_have_no_code() {
        let err = anyhow::anyhow!("disk full");
        assert_eq!(OrganizerErrorCode::from_error(&err), None);
    }
}
