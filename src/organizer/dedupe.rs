use crate::error::StateCorruptionError;
use crate::organizer::fingerprint::FileFingerprint;
use crate::organizer::warn::Incident;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One archived artifact. Written once per fingerprint, never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub fingerprint: FileFingerprint,
    pub vault_path: PathBuf,
    pub source_filename: String,
    pub ingested_at: DateTime<Local>,
}

/// Fingerprint ledger backed by an append-only JSONL file.
#[derive(Debug)]
pub struct DuplicateIndex {
    ledger: PathBuf,
    entries: HashMap<FileFingerprint, ArchiveEntry>,
}

impl DuplicateIndex {
    pub fn open(ledger: &Path) -> Result<Self> {
        let (entries, repair) = read_ledger(ledger)?;
        match repair {
            Some(TailRepair::Truncate(valid_len)) => truncate_ledger(ledger, valid_len)?,
            Some(TailRepair::Terminate) => terminate_ledger(ledger)?,
            None => {}
        }
        Ok(Self {
            ledger: ledger.to_path_buf(),
            entries,
        })
    }

    /// Loads without repairing a torn tail; for read-only callers.
    pub fn inspect(ledger: &Path) -> Result<Self> {
        let (entries, _) = read_ledger(ledger)?;
        Ok(Self {
            ledger: ledger.to_path_buf(),
            entries,
        })
    }

    pub fn contains(&self, fingerprint: &FileFingerprint) -> bool {
        self.entries.contains_key(fingerprint)
    }

    pub fn get(&self, fingerprint: &FileFingerprint) -> Option<&ArchiveEntry> {
        self.entries.get(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `false` when the fingerprint was already recorded; the ledger
    /// is left untouched in that case.
    pub fn record(&mut self, entry: ArchiveEntry) -> Result<bool> {
        if self.entries.contains_key(&entry.fingerprint) {
            return Ok(false);
        }
        append_ledger(&self.ledger, &entry)?;
        self.entries.insert(entry.fingerprint.clone(), entry);
        Ok(true)
    }
}

fn append_ledger(path: &Path, entry: &ArchiveEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let line = format!("{}\n", serde_json::to_string(entry)?);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("failed to append {}", path.display()))?;
    file.sync_data()?;
    Ok(())
}

fn truncate_ledger(path: &Path, valid_len: u64) -> Result<()> {
    let file = fs::OpenOptions::new()
        .write(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.set_len(valid_len)
        .with_context(|| format!("failed to truncate {}", path.display()))?;
    file.sync_all()?;
    Ok(())
}

/// What `open` has to do to an unterminated final line before appending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TailRepair {
    /// Torn record: cut the file back to this many bytes.
    Truncate(u64),
    /// Complete record missing only its newline.
    Terminate,
}

fn terminate_ledger(path: &Path) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("failed to terminate {}", path.display()))?;
    file.sync_data()?;
    Ok(())
}

type LedgerContents = (HashMap<FileFingerprint, ArchiveEntry>, Option<TailRepair>);

fn corrupt(path: &Path, reason: String) -> anyhow::Error {
    StateCorruptionError {
        path: path.to_path_buf(),
        reason,
    }
    .into()
}

/// Loads every entry. Terminated lines must all parse; bytes after the last
/// newline come from an interrupted append and are judged on their own.
fn read_ledger(path: &Path) -> Result<LedgerContents> {
    let mut out = HashMap::new();
    if !path.exists() {
        return Ok((out, None));
    }
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let body_len = raw.iter().rposition(|b| *b == b'\n').map_or(0, |pos| pos + 1);
    let (body, tail) = raw.split_at(body_len);

    let body = std::str::from_utf8(body)
        .map_err(|err| corrupt(path, format!("ledger is not valid UTF-8: {err}")))?;
    for (idx, line) in body.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let entry: ArchiveEntry = serde_json::from_str(trimmed)
            .map_err(|err| corrupt(path, format!("ledger line {}: {err}", idx + 1)))?;
        out.entry(entry.fingerprint.clone()).or_insert(entry);
    }

    if tail.is_empty() {
        return Ok((out, None));
    }
    let parsed = std::str::from_utf8(tail)
        .map_err(|err| err.to_string())
        .map(str::trim)
        .and_then(|text| {
            if text.is_empty() {
                Err("blank".to_string())
            } else {
                serde_json::from_str::<ArchiveEntry>(text).map_err(|err| err.to_string())
            }
        });
    let repair = match parsed {
        Ok(entry) => {
            out.entry(entry.fingerprint.clone()).or_insert(entry);
            TailRepair::Terminate
        }
        Err(err) => {
            Incident::new("LEDGER_TORN_TAIL")
                .with("file", path.display().to_string())
                .with("action", "skip-line")
                .with("err", err)
                .emit();
            TailRepair::Truncate(body_len as u64)
        }
    };
    Ok((out, Some(repair)))
}

#[cfg(test)]
mod tests {
    use super::{ArchiveEntry, DuplicateIndex};
    use crate::error::StateCorruptionError;
    use crate::organizer::fingerprint::FileFingerprint;
    use chrono::Local;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn entry(content: &[u8], name: &str) -> ArchiveEntry {
        ArchiveEntry {
            fingerprint: FileFingerprint::of_bytes(content),
            vault_path: PathBuf::from(format!("/vault/Archive/{name}")),
            source_filename: name.to_string(),
            ingested_at: Local::now(),
        }
    }

    #[test]
    fn record_is_idempotent_and_survives_reopen() {
        let tmp = tempdir().expect("tempdir");
        let ledger = tmp.path().join("archive_ledger.jsonl");

        let mut index = DuplicateIndex::open(&ledger).expect("open");
        assert!(index.is_empty());
        assert!(index.record(entry(b"A", "a.jpg")).expect("first"));
        assert!(!index.record(entry(b"A", "again.jpg")).expect("second"));
        assert_eq!(index.len(), 1);

        let raw = fs::read_to_string(&ledger).expect("read");
        assert_eq!(raw.lines().count(), 1);

        let reopened = DuplicateIndex::open(&ledger).expect("reopen");
        let fp = FileFingerprint::of_bytes(b"A");
        assert!(reopened.contains(&fp));
        assert_eq!(
            reopened.get(&fp).map(|e| e.source_filename.as_str()),
            Some("a.jpg")
        );
    }

    #[test]
    fn torn_final_line_is_skipped() {
        let tmp = tempdir().expect("tempdir");
        let ledger = tmp.path().join("archive_ledger.jsonl");
        let good = serde_json::to_string(&entry(b"A", "a.jpg")).expect("json");
        fs::write(&ledger, format!("{good}\n{{\"fingerprint\":\"ab")).expect("write");

        let mut index = DuplicateIndex::open(&ledger).expect("open");
        assert_eq!(index.len(), 1);
        assert_eq!(fs::read_to_string(&ledger).expect("read"), format!("{good}\n"));

        assert!(index.record(entry(b"B", "b.jpg")).expect("append"));
        let reopened = DuplicateIndex::open(&ledger).expect("reopen");
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn malformed_interior_line_is_state_corruption() {
        let tmp = tempdir().expect("tempdir");
        let ledger = tmp.path().join("archive_ledger.jsonl");
        let good = serde_json::to_string(&entry(b"A", "a.jpg")).expect("json");
        fs::write(&ledger, format!("not json\n{good}\n")).expect("write");

        let err = DuplicateIndex::open(&ledger).expect_err("should fail");
        assert!(err.chain().any(|c| c.is::<StateCorruptionError>()));
    }

    #[test]
    fn complete_but_unterminated_line_is_kept_and_terminated() {
        let tmp = tempdir().expect("tempdir");
        let ledger = tmp.path().join("archive_ledger.jsonl");
        let good = serde_json::to_string(&entry(b"A", "a.jpg")).expect("json");
        fs::write(&ledger, &good).expect("write");

        let mut index = DuplicateIndex::open(&ledger).expect("open");
        assert!(index.contains(&FileFingerprint::of_bytes(b"A")));
        assert_eq!(fs::read_to_string(&ledger).expect("read"), format!("{good}\n"));

        assert!(index.record(entry(b"B", "b.jpg")).expect("append"));
        let reopened = DuplicateIndex::open(&ledger).expect("reopen");
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn tail_cut_inside_multibyte_char_is_dropped() {
        let tmp = tempdir().expect("tempdir");
        let ledger = tmp.path().join("archive_ledger.jsonl");
        let good = serde_json::to_string(&entry(b"A", "a.jpg")).expect("json");
        let accented = serde_json::to_string(&entry(b"B", "caf\u{e9}.jpg")).expect("json");
        let cut = accented.find('\u{e9}').expect("accent") + 1;
        let mut raw = format!("{good}\n").into_bytes();
        raw.extend_from_slice(&accented.as_bytes()[..cut]);
        fs::write(&ledger, &raw).expect("write");

        let mut index = DuplicateIndex::open(&ledger).expect("open");
        assert_eq!(index.len(), 1);
        assert_eq!(fs::read_to_string(&ledger).expect("read"), format!("{good}\n"));

        assert!(index.record(entry(b"B", "caf\u{e9}.jpg")).expect("append"));
        assert_eq!(DuplicateIndex::open(&ledger).expect("reopen").len(), 2);
    }

    #[test]
    fn inspect_reads_unterminated_entry_without_writing() {
        let tmp = tempdir().expect("tempdir");
        let ledger = tmp.path().join("archive_ledger.jsonl");
        let good = serde_json::to_string(&entry(b"A", "a.jpg")).expect("json");
        fs::write(&ledger, &good).expect("write");

        assert_eq!(DuplicateIndex::inspect(&ledger).expect("inspect").len(), 1);
        assert_eq!(fs::read_to_string(&ledger).expect("read"), good);
    }
}
