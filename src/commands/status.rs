use anyhow::Result;
use std::env;

use crate::commands::CommandReport;
use crate::organizer::config::load_config;
use crate::organizer::dedupe::DuplicateIndex;
use crate::organizer::lock::VaultLock;
use crate::organizer::paths::VaultPaths;
use crate::organizer::pipeline::list_inbox;
use crate::organizer::trajectory::load_state;

include!(concat!(env!("OUT_DIR"), "/organizer_env_allowlist.rs"));

fn active_env_overrides() -> Vec<&'static str> {
    GENERATED_ENV_ALLOWLIST
        .iter()
        .copied()
        .filter(|key| env::var_os(key).is_some_and(|v| !v.is_empty()))
        .collect()
}

pub fn run(paths: &VaultPaths) -> Result<CommandReport> {
    let mut report = CommandReport::new("status");

    report.detail(format!("vault_root={}", paths.vault_root.display()));
    report.detail(format!("inbox_dir={}", paths.inbox_dir.display()));
    report.detail(format!("archive_dir={}", paths.archive_dir.display()));
    report.detail(format!("daily_dir={}", paths.daily_dir.display()));
    report.detail(format!("weekly_dir={}", paths.weekly_dir.display()));
    report.detail(format!("state_file={}", paths.state_file.display()));
    report.detail(format!("ledger_file={}", paths.ledger_file.display()));

    let overrides = active_env_overrides();
    if !overrides.is_empty() {
        report.detail(format!("env_overrides={}", overrides.join(",")));
    }

    match load_config(paths) {
        Ok(cfg) => {
            report.detail(format!("dedupe_mode={}", cfg.dedupe.mode.label()));
            report.detail(format!("classifier={}", cfg.classifier.provider));
            report.detail(format!("review_window_days={}", cfg.review.window_days));
        }
        Err(err) => report.issue(format!("{err:#}")),
    }

    for (label, dir) in [
        ("vault root", &paths.vault_root),
        ("inbox", &paths.inbox_dir),
        ("archive", &paths.archive_dir),
        ("daily journal", &paths.daily_dir),
    ] {
        if !dir.is_dir() {
            report.issue(format!("missing {label} dir ({})", dir.display()));
        }
    }

    if paths.inbox_dir.is_dir() {
        match list_inbox(&paths.inbox_dir) {
            Ok(files) => report.detail(format!("inbox_files={}", files.len())),
            Err(err) => report.issue(format!("{err:#}")),
        }
    }

    match DuplicateIndex::inspect(&paths.ledger_file) {
        Ok(index) => report.detail(format!("ledger_entries={}", index.len())),
        Err(err) => report.issue(format!("{err:#}")),
    }

    match load_state(&paths.state_file) {
        Ok(state) => {
            report.detail(format!("goals={}", state.current_goals.len()));
            report.detail(format!(
                "trajectory_days={}",
                state.project_trajectories.len()
            ));
            report.detail(format!(
                "last_run={}",
                state.last_run.as_deref().unwrap_or("never")
            ));
        }
        Err(err) => report.issue(format!("{err:#}")),
    }

    let lock_file = paths.lock_file();
    if lock_file.parent().is_some_and(|dir| dir.is_dir()) {
        match VaultLock::acquire(&lock_file) {
            Ok(lock) => report.detail(format!("lock={} (free)", lock.path().display())),
            Err(err) => report.issue(format!("{err:#}")),
        }
    }

    Ok(report)
}
