use anyhow::Result;

use crate::commands::CommandReport;
use crate::organizer::classify::{Classifier, LocalClassifier, build_classifier};
use crate::organizer::config::load_config;
use crate::organizer::paths::{VaultPaths, display_relative};
use crate::organizer::pipeline::{self, FileOutcome, IngestOptions, RunSummary};

pub fn run(paths: &VaultPaths, opts: IngestOptions) -> Result<CommandReport> {
    let cfg = load_config(paths)?;
    let mut report = CommandReport::new("ingest");
    report.detail(format!("vault_root={}", paths.vault_root.display()));
    report.detail(format!("inbox_dir={}", paths.inbox_dir.display()));
    report.detail(format!("dedupe_mode={}", cfg.dedupe.mode.label()));

    // Dry runs stop before classification.
    let classifier: Box<dyn Classifier> = if opts.dry_run {
        Box::new(LocalClassifier)
    } else {
        build_classifier(&cfg.classifier)?
    };
    if !opts.dry_run {
        report.detail(format!("classifier={}", classifier.label()));
    }

    let summary = pipeline::run_once(paths, classifier.as_ref(), cfg.dedupe.mode, opts)?;
    summarize(paths, &summary, &mut report);
    Ok(report)
}

fn summarize(paths: &VaultPaths, summary: &RunSummary, report: &mut CommandReport) {
    report.detail(format!(
        "discovered={} processed={} duplicates={} failed={} unlogged={}",
        summary.discovered, summary.processed, summary.duplicates, summary.failed, summary.unlogged
    ));
    if summary.pending > 0 {
        report.detail(format!("dry-run: {} files would be ingested", summary.pending));
    }

    for outcome in &summary.outcomes {
        match outcome {
            FileOutcome::Done { file, entry, .. } => report.detail(format!(
                "archived {file} -> {}",
                display_relative(&paths.vault_root, &entry.vault_path)
            )),
            FileOutcome::Duplicate { file, existing, .. } => report.detail(format!(
                "duplicate {file} (already at {})",
                display_relative(&paths.vault_root, existing)
            )),
            FileOutcome::Pending { file, fingerprint } => {
                report.detail(format!("pending {file} fingerprint={}", fingerprint.short()))
            }
            FileOutcome::Failed(failure) => report.issue(format!("failed {failure}")),
            FileOutcome::PlacedUnlogged { entry, failure } => report.issue(format!(
                "moved-but-unlogged {} at {}: {}",
                failure.file,
                display_relative(&paths.vault_root, &entry.vault_path),
                failure.message
            )),
        }
    }
    for err in &summary.run_errors {
        report.issue(err.clone());
    }
}
