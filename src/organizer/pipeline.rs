use crate::error::{ClassificationError, PathEscapeError};
use crate::organizer::audit;
use crate::organizer::classify::Classifier;
use crate::organizer::config::DedupeMode;
use crate::organizer::dedupe::{ArchiveEntry, DuplicateIndex};
use crate::organizer::fingerprint::{self, FileFingerprint};
use crate::organizer::journal::{JournalEntry, JournalWriter};
use crate::organizer::lock::VaultLock;
use crate::organizer::paths::{VaultPaths, display_relative};
use crate::organizer::placement::ArchivePlacer;
use crate::organizer::trajectory::TrajectoryStore;
use crate::organizer::warn::Incident;
use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Where a file was when its run stopped. A file reaching `Placed` has left
/// the inbox, so anything failing after that is a logging gap, not a loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovered,
    Fingerprinted,
    Classified,
    Placed,
    Indexed,
    Logged,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Discovered => "discovered",
            Stage::Fingerprinted => "fingerprinted",
            Stage::Classified => "classified",
            Stage::Placed => "placed",
            Stage::Indexed => "indexed",
            Stage::Logged => "logged",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Io,
    Classification,
    PathEscape,
}

impl FailureKind {
    pub fn of(err: &anyhow::Error) -> Self {
        if err.chain().any(|c| c.is::<PathEscapeError>()) {
            FailureKind::PathEscape
        } else if err.chain().any(|c| c.is::<ClassificationError>()) {
            FailureKind::Classification
        } else {
            FailureKind::Io
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Io => "io",
            FailureKind::Classification => "classification",
            FailureKind::PathEscape => "path_escape",
        }
    }
}

/// `stage` is the last state the file reached before the error.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub file: String,
    pub fingerprint: Option<FileFingerprint>,
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} kind={} stage={} fingerprint={} error={}",
            self.file,
            self.kind.as_str(),
            self.stage.as_str(),
            self.fingerprint
                .as_ref()
                .map(FileFingerprint::as_str)
                .unwrap_or("-"),
            self.message
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    Done {
        file: String,
        entry: ArchiveEntry,
        journal_path: PathBuf,
    },
    Duplicate {
        file: String,
        fingerprint: FileFingerprint,
        existing: PathBuf,
    },
    /// Dry-run: fingerprinted, unknown to the index, left alone.
    Pending {
        file: String,
        fingerprint: FileFingerprint,
    },
    /// Moved into the archive but a later bookkeeping step failed.
    PlacedUnlogged {
        entry: ArchiveEntry,
        failure: FileFailure,
    },
    Failed(FileFailure),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub discovered: usize,
    pub processed: usize,
    pub duplicates: usize,
    pub pending: usize,
    pub failed: usize,
    pub unlogged: usize,
    pub outcomes: Vec<FileOutcome>,
    /// Run-level bookkeeping failures; the per-file outcomes still stand.
    pub run_errors: Vec<String>,
}

impl RunSummary {
    fn push(&mut self, outcome: FileOutcome) {
        match &outcome {
            FileOutcome::Done { .. } => self.processed += 1,
            FileOutcome::Duplicate { .. } => self.duplicates += 1,
            FileOutcome::Pending { .. } => self.pending += 1,
            FileOutcome::PlacedUnlogged { .. } => {
                self.processed += 1;
                self.unlogged += 1;
            }
            FileOutcome::Failed(_) => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    pub dry_run: bool,
}

/// Snapshot of regular, non-hidden files directly in the inbox, by name.
pub fn list_inbox(inbox: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries =
        fs::read_dir(inbox).with_context(|| format!("failed to read {}", inbox.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden || !entry.file_type()?.is_file() {
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

pub struct IngestionPipeline<'a> {
    paths: &'a VaultPaths,
    classifier: &'a dyn Classifier,
    mode: DedupeMode,
    index: DuplicateIndex,
    placer: ArchivePlacer,
    journal: JournalWriter,
    trajectory: TrajectoryStore,
}

impl<'a> IngestionPipeline<'a> {
    /// Loads the ledger and trajectory state. Either being corrupt stops
    /// the run here, before any inbox file is touched.
    pub fn open(
        paths: &'a VaultPaths,
        classifier: &'a dyn Classifier,
        mode: DedupeMode,
    ) -> Result<Self> {
        let index = DuplicateIndex::open(&paths.ledger_file)
            .context("failed to load duplicate index")?;
        let trajectory =
            TrajectoryStore::load(&paths.state_file).context("failed to load trajectory state")?;
        Ok(Self {
            paths,
            classifier,
            mode,
            index,
            placer: ArchivePlacer::new(&paths.archive_dir),
            journal: JournalWriter::new(&paths.daily_dir),
            trajectory,
        })
    }

    #[cfg(test)]
    pub fn index(&self) -> &DuplicateIndex {
        &self.index
    }

    pub fn run(&mut self, opts: IngestOptions) -> Result<RunSummary> {
        let files = list_inbox(&self.paths.inbox_dir)?;
        let mut summary = RunSummary {
            discovered: files.len(),
            ..RunSummary::default()
        };
        tracing::info!(
            inbox = %self.paths.inbox_dir.display(),
            files = files.len(),
            dry_run = opts.dry_run,
            "scanning inbox"
        );

        for file in files {
            let outcome = self.process_file(&file, opts);
            self.report(&outcome);
            summary.push(outcome);
        }

        if !opts.dry_run {
            self.trajectory.mark_run(Local::now());
            if let Err(err) = self
                .trajectory
                .save()
                .context("failed to persist last_run at end of run")
            {
                tracing::error!(error = %format!("{err:#}"), "end-of-run save failed");
                summary.run_errors.push(format!("{err:#}"));
            }
        }

        audit::record(
            self.paths,
            "ingest",
            if summary.failed == 0 && summary.unlogged == 0 && summary.run_errors.is_empty() {
                "ok"
            } else {
                "partial"
            },
            &format!(
                "discovered={} processed={} duplicates={} pending={} failed={} unlogged={}",
                summary.discovered,
                summary.processed,
                summary.duplicates,
                summary.pending,
                summary.failed,
                summary.unlogged
            ),
        );
        Ok(summary)
    }

    fn process_file(&mut self, path: &Path, opts: IngestOptions) -> FileOutcome {
        let file = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let fail = |stage: Stage, fingerprint: Option<&FileFingerprint>, err: anyhow::Error| {
            FileOutcome::Failed(FileFailure {
                file: file.clone(),
                fingerprint: fingerprint.cloned(),
                stage,
                kind: FailureKind::of(&err),
                message: format!("{err:#}"),
            })
        };

        let fp = match fingerprint::fingerprint(path) {
            Ok(fp) => fp,
            Err(err) => return fail(Stage::Discovered, None, err),
        };

        if self.mode == DedupeMode::Index
            && let Some(existing) = self.index.get(&fp)
        {
            return FileOutcome::Duplicate {
                file,
                fingerprint: fp,
                existing: existing.vault_path.clone(),
            };
        }

        if opts.dry_run {
            return FileOutcome::Pending {
                file,
                fingerprint: fp,
            };
        }

        let classification = match self.classifier.classify(path) {
            Ok(record) => record,
            Err(err) => {
                let err = if err.chain().any(|c| c.is::<ClassificationError>()) {
                    err
                } else {
                    err.context(ClassificationError::new(format!(
                        "{} classifier failed",
                        self.classifier.label()
                    )))
                };
                return fail(Stage::Fingerprinted, Some(&fp), err);
            }
        };

        let now = Local::now();
        let entry = match self.placer.place(path, &fp, &classification, now) {
            Ok(entry) => entry,
            Err(err) => return fail(Stage::Classified, Some(&fp), err),
        };

        // The file now lives in the archive; failures below leave it there.
        let unlogged = |stage: Stage, err: anyhow::Error, entry: ArchiveEntry| {
            FileOutcome::PlacedUnlogged {
                failure: FileFailure {
                    file: file.clone(),
                    fingerprint: Some(entry.fingerprint.clone()),
                    stage,
                    kind: FailureKind::Io,
                    message: format!("{err:#}"),
                },
                entry,
            }
        };

        if let Err(err) = self.index.record(entry.clone()) {
            return unlogged(Stage::Placed, err, entry);
        }

        let archived_as = display_relative(&self.paths.vault_root, &entry.vault_path);
        let day = now.date_naive();
        let journal_path = match self.journal.append(
            day,
            &JournalEntry {
                timestamp: now,
                source_filename: &file,
                archived_as: Some(&archived_as),
                classification: &classification,
            },
        ) {
            Ok(path) => path,
            Err(err) => return unlogged(Stage::Indexed, err, entry),
        };

        self.trajectory.record_summary(day, &classification.summary);
        if let Err(err) = self.trajectory.save() {
            return unlogged(Stage::Logged, err, entry);
        }

        FileOutcome::Done {
            file,
            entry,
            journal_path,
        }
    }

    fn report(&self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Done { file, entry, .. } => {
                let target = display_relative(&self.paths.vault_root, &entry.vault_path);
                tracing::info!(file = %file, target = %target, "ingested");
                audit::record(self.paths, "ingest", "done", &format!("{file} -> {target}"));
            }
            FileOutcome::Duplicate {
                file,
                fingerprint,
                existing,
            } => {
                tracing::info!(
                    file = %file,
                    fingerprint = %fingerprint,
                    existing = %existing.display(),
                    "duplicate skipped"
                );
                audit::record(
                    self.paths,
                    "ingest",
                    "duplicate",
                    &format!("{file} matches {}", existing.display()),
                );
            }
            FileOutcome::Pending { file, fingerprint } => {
                tracing::info!(file = %file, fingerprint = %fingerprint, "would ingest");
            }
            FileOutcome::Failed(failure) => {
                tracing::warn!(
                    file = %failure.file,
                    stage = failure.stage.as_str(),
                    kind = failure.kind.as_str(),
                    error = %failure.message,
                    "left in inbox"
                );
                if failure.kind == FailureKind::PathEscape {
                    Incident::new("PATH_ESCAPE")
                        .with("stage", failure.stage.as_str())
                        .with("action", "reject-placement")
                        .with("file", &failure.file)
                        .with(
                            "fingerprint",
                            failure
                                .fingerprint
                                .as_ref()
                                .map(FileFingerprint::as_str)
                                .unwrap_or(""),
                        )
                        .with("retry", "manual-review")
                        .with("err", &failure.message)
                        .emit();
                }
                audit::record(self.paths, "ingest", "failed", &failure.to_string());
            }
            FileOutcome::PlacedUnlogged { entry, failure } => {
                Incident::new("MOVED_UNLOGGED")
                    .with("stage", failure.stage.as_str())
                    .with("file", &failure.file)
                    .with("fingerprint", entry.fingerprint.as_str())
                    .with("target", entry.vault_path.display().to_string())
                    .with("retry", "manual-journal-entry")
                    .with("err", &failure.message)
                    .emit();
                audit::record(self.paths, "ingest", "unlogged", &failure.to_string());
            }
        }
    }
}

/// One locked ingestion run over the inbox snapshot.
pub fn run_once(
    paths: &VaultPaths,
    classifier: &dyn Classifier,
    mode: DedupeMode,
    opts: IngestOptions,
) -> Result<RunSummary> {
    paths.ensure_layout()?;
    let _lock = VaultLock::acquire(&paths.lock_file())?;
    let mut pipeline = IngestionPipeline::open(paths, classifier, mode)?;
    pipeline.run(opts)
}
