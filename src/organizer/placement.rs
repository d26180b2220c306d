use crate::error::PathEscapeError;
use crate::organizer::classify::ClassificationRecord;
use crate::organizer::dedupe::ArchiveEntry;
use crate::organizer::fingerprint::{self, FileFingerprint};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Resolves classification folders under the archive root and moves files there.
#[derive(Debug, Clone)]
pub struct ArchivePlacer {
    root: PathBuf,
}

impl ArchivePlacer {
    pub fn new(archive_root: impl Into<PathBuf>) -> Self {
        Self {
            root: archive_root.into(),
        }
    }

    /// Lexical resolution only; `..` may not climb above the root and
    /// absolute or prefixed paths are refused outright.
    pub fn resolve_folder(&self, folder_path: &str) -> Result<PathBuf, PathEscapeError> {
        let escape = || PathEscapeError {
            folder_path: folder_path.to_string(),
            root: self.root.clone(),
        };
        let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
        for component in Path::new(folder_path.trim()).components() {
            match component {
                Component::Normal(part) => parts.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(escape());
                    }
                }
                Component::RootDir | Component::Prefix(_) => return Err(escape()),
            }
        }
        let mut out = self.root.clone();
        out.extend(parts);
        Ok(out)
    }

    /// Symlinked folders inside the archive must not lead outside it. Checks
    /// the deepest part of `dir` that already exists.
    fn confirm_inside_root(&self, dir: &Path, folder_path: &str) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        let root = fs::canonicalize(&self.root)
            .with_context(|| format!("failed to resolve {}", self.root.display()))?;
        let existing = dir
            .ancestors()
            .find(|p| p.exists())
            .unwrap_or(self.root.as_path());
        let resolved = fs::canonicalize(existing)
            .with_context(|| format!("failed to resolve {}", existing.display()))?;
        if !resolved.starts_with(&root) {
            return Err(PathEscapeError {
                folder_path: folder_path.to_string(),
                root: self.root.clone(),
            }
            .into());
        }
        Ok(())
    }

    pub fn place(
        &self,
        source: &Path,
        fingerprint: &FileFingerprint,
        classification: &ClassificationRecord,
        at: DateTime<Local>,
    ) -> Result<ArchiveEntry> {
        let target_dir = self.resolve_folder(&classification.folder_path)?;
        self.confirm_inside_root(&target_dir, &classification.folder_path)?;
        fs::create_dir_all(&target_dir)
            .with_context(|| format!("failed to create {}", target_dir.display()))?;
        self.confirm_inside_root(&target_dir, &classification.folder_path)?;

        let file_name = source
            .file_name()
            .with_context(|| format!("source has no file name: {}", source.display()))?;
        let target = free_target_path(&target_dir, Path::new(file_name), fingerprint);
        move_file(source, &target, fingerprint)?;

        Ok(ArchiveEntry {
            fingerprint: fingerprint.clone(),
            vault_path: target,
            source_filename: file_name.to_string_lossy().into_owned(),
            ingested_at: at,
        })
    }
}

/// `name.ext`, then `name-<fp12>.ext`, then `name-<fp12>-2.ext`, ...
pub fn free_target_path(dir: &Path, file_name: &Path, fingerprint: &FileFingerprint) -> PathBuf {
    let direct = dir.join(file_name);
    if !direct.exists() {
        return direct;
    }

    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let ext = file_name
        .extension()
        .map(|s| format!(".{}", s.to_string_lossy()))
        .unwrap_or_default();

    let mut attempt = 1usize;
    loop {
        let suffix = if attempt == 1 {
            fingerprint.short().to_string()
        } else {
            format!("{}-{attempt}", fingerprint.short())
        };
        let candidate = dir.join(format!("{stem}-{suffix}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        attempt += 1;
    }
}

fn move_file(from: &Path, to: &Path, fingerprint: &FileFingerprint) -> Result<()> {
    match fs::rename(from, to) {
        Ok(_) => Ok(()),
        Err(rename_err) if rename_err.kind() == ErrorKind::CrossesDevices => {
            copy_verify_remove(from, to, fingerprint)
        }
        Err(rename_err) => Err(rename_err)
            .with_context(|| format!("failed to move {} to {}", from.display(), to.display())),
    }
}

/// Cross-volume move: the destination only appears under its final name once
/// the copied bytes hash to the source fingerprint, and the source goes last.
fn copy_verify_remove(from: &Path, to: &Path, fingerprint: &FileFingerprint) -> Result<()> {
    let dir = to
        .parent()
        .with_context(|| format!("target has no parent: {}", to.display()))?;
    let staging = tempfile::Builder::new()
        .prefix(".organizer-partial-")
        .tempfile_in(dir)
        .with_context(|| format!("failed to stage copy in {}", dir.display()))?;
    fs::copy(from, staging.path())
        .with_context(|| format!("failed to copy {} to {}", from.display(), dir.display()))?;
    staging.as_file().sync_all()?;

    let copied = fingerprint::fingerprint(staging.path())?;
    if &copied != fingerprint {
        anyhow::bail!(
            "copy of {} failed verification (expected {}, got {})",
            from.display(),
            fingerprint,
            copied
        );
    }

    staging
        .persist_noclobber(to)
        .with_context(|| format!("failed to finalize {}", to.display()))?;
    fs::remove_file(from).with_context(|| format!("failed to remove {}", from.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ArchivePlacer, copy_verify_remove, free_target_path};
    use crate::error::PathEscapeError;
    use crate::organizer::classify::{ClassificationRecord, StrategicInsight};
    use crate::organizer::fingerprint::{FileFingerprint, fingerprint};
    use chrono::Local;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn record(folder: &str) -> ClassificationRecord {
        ClassificationRecord {
            summary: "s".to_string(),
            folder_path: folder.to_string(),
            tags: vec!["#a".to_string()],
            urgency: "Normal".to_string(),
            strategic_insight: StrategicInsight::default(),
            tasks: Vec::new(),
        }
    }

    #[test]
    fn resolve_folder_normalizes_inside_root() {
        let placer = ArchivePlacer::new("/vault/Archive");
        assert_eq!(
            placer.resolve_folder("Projects/X").expect("plain"),
            Path::new("/vault/Archive/Projects/X")
        );
        assert_eq!(
            placer.resolve_folder("./Projects/../X/").expect("dots"),
            Path::new("/vault/Archive/X")
        );
    }

    #[test]
    fn resolve_folder_rejects_escapes() {
        let placer = ArchivePlacer::new("/vault/Archive");
        assert!(placer.resolve_folder("../../etc").is_err());
        assert!(placer.resolve_folder("Projects/../../x").is_err());
        assert!(placer.resolve_folder("/etc").is_err());
    }

    #[test]
    fn place_moves_file_and_creates_folders() {
        let tmp = tempdir().expect("tempdir");
        let inbox = tmp.path().join("inbox");
        fs::create_dir_all(&inbox).expect("mkdir");
        let source = inbox.join("IMG_001.jpg");
        fs::write(&source, "A").expect("write");
        let fp = fingerprint(&source).expect("fp");

        let placer = ArchivePlacer::new(tmp.path().join("Archive"));
        let entry = placer
            .place(&source, &fp, &record("Projects/X"), Local::now())
            .expect("place");

        let expected = tmp.path().join("Archive/Projects/X/IMG_001.jpg");
        assert_eq!(entry.vault_path, expected);
        assert_eq!(fs::read_to_string(&expected).expect("read"), "A");
        assert!(!source.exists());
    }

    #[test]
    fn escape_leaves_source_untouched() {
        let tmp = tempdir().expect("tempdir");
        let source = tmp.path().join("IMG_002.jpg");
        fs::write(&source, "B").expect("write");
        let fp = fingerprint(&source).expect("fp");

        let placer = ArchivePlacer::new(tmp.path().join("vault/Archive"));
        let err = placer
            .place(&source, &fp, &record("../../etc"), Local::now())
            .expect_err("should reject");

        assert!(err.chain().any(|c| c.is::<PathEscapeError>()));
        assert_eq!(fs::read_to_string(&source).expect("read"), "B");
        assert!(!tmp.path().join("etc").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_folder_out_of_root_is_rejected() {
        let tmp = tempdir().expect("tempdir");
        let archive = tmp.path().join("Archive");
        let outside = tmp.path().join("outside");
        fs::create_dir_all(&archive).expect("mkdir");
        fs::create_dir_all(&outside).expect("mkdir");
        std::os::unix::fs::symlink(&outside, archive.join("Link")).expect("symlink");
        let source = tmp.path().join("a.txt");
        fs::write(&source, "A").expect("write");
        let fp = fingerprint(&source).expect("fp");

        let err = ArchivePlacer::new(&archive)
            .place(&source, &fp, &record("Link/deeper"), Local::now())
            .expect_err("should reject");
        assert!(err.chain().any(|c| c.is::<PathEscapeError>()));
        assert!(source.exists());
        assert!(!outside.join("deeper").exists());
    }

    #[test]
    fn name_conflicts_get_fingerprint_suffix() {
        let tmp = tempdir().expect("tempdir");
        let fp = FileFingerprint::of_bytes(b"new");
        fs::write(tmp.path().join("IMG.jpg"), "old").expect("write");

        let first = free_target_path(tmp.path(), Path::new("IMG.jpg"), &fp);
        assert_eq!(first, tmp.path().join(format!("IMG-{}.jpg", fp.short())));

        fs::write(&first, "other").expect("write");
        let second = free_target_path(tmp.path(), Path::new("IMG.jpg"), &fp);
        assert_eq!(second, tmp.path().join(format!("IMG-{}-2.jpg", fp.short())));
    }

    #[test]
    fn conflicting_place_never_overwrites() {
        let tmp = tempdir().expect("tempdir");
        let archive = tmp.path().join("Archive");
        fs::create_dir_all(archive.join("Notes")).expect("mkdir");
        fs::write(archive.join("Notes/todo.md"), "existing").expect("write");
        let source = tmp.path().join("todo.md");
        fs::write(&source, "incoming").expect("write");
        let fp = fingerprint(&source).expect("fp");

        let entry = ArchivePlacer::new(&archive)
            .place(&source, &fp, &record("Notes"), Local::now())
            .expect("place");

        assert_eq!(
            fs::read_to_string(archive.join("Notes/todo.md")).expect("read"),
            "existing"
        );
        assert_eq!(fs::read_to_string(&entry.vault_path).expect("read"), "incoming");
    }

    #[test]
    fn copy_path_verifies_before_removing_source() {
        let tmp = tempdir().expect("tempdir");
        let source = tmp.path().join("clip.mov");
        fs::write(&source, "frames").expect("write");
        let target = tmp.path().join("dest.mov");

        let wrong = FileFingerprint::of_bytes(b"something else");
        assert!(copy_verify_remove(&source, &target, &wrong).is_err());
        assert!(source.exists());
        assert!(!target.exists());

        let right = fingerprint(&source).expect("fp");
        copy_verify_remove(&source, &target, &right).expect("copy");
        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&target).expect("read"), "frames");
    }
}
