use anyhow::Result;
use chrono::{Local, NaiveDate};

use crate::commands::CommandReport;
use crate::organizer::config::{MAX_REVIEW_WINDOW_DAYS, load_config};
use crate::organizer::paths::{VaultPaths, display_relative};
use crate::organizer::review::run_review;

#[derive(Debug, Clone, Default)]
pub struct ReviewOptions {
    pub date: Option<NaiveDate>,
    pub days: Option<u32>,
}

pub fn run(paths: &VaultPaths, opts: &ReviewOptions) -> Result<CommandReport> {
    let cfg = load_config(paths)?;
    let period_end = opts.date.unwrap_or_else(|| Local::now().date_naive());
    let window_days = opts.days.unwrap_or(cfg.review.window_days);
    let mut report = CommandReport::new("review");

    if !(1..=MAX_REVIEW_WINDOW_DAYS).contains(&window_days) {
        report.issue(format!(
            "--days must be between 1 and {MAX_REVIEW_WINDOW_DAYS} (got {window_days})"
        ));
        return Ok(report);
    }

    let (review, path) = run_review(paths, period_end, window_days)?;
    report.detail(format!("period_end={}", period_end.format("%Y-%m-%d")));
    report.detail(format!("window_days={window_days}"));
    report.detail(format!(
        "entries={} days_with_entries={} open_tasks={}",
        review.entry_count, review.days_with_entries, review.open_tasks
    ));
    report.detail(format!(
        "report={}",
        display_relative(&paths.vault_root, &path)
    ));
    Ok(report)
}
