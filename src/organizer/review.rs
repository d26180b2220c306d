use crate::organizer::journal::{ParsedEntry, read_day};
use crate::organizer::lock::VaultLock;
use crate::organizer::paths::VaultPaths;
use crate::organizer::trajectory::load_state;
use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const QUIET_URGENCY: &[&str] = &["", "normal", "none", "low"];
const EMPTY_INSIGHT: &[&str] = &["", "none", "n/a", "-"];

#[derive(Debug, Clone)]
pub struct DayLog {
    pub day: NaiveDate,
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug, Clone)]
pub struct WeeklyReview {
    pub period_end: NaiveDate,
    pub days_with_entries: usize,
    pub entry_count: usize,
    pub open_tasks: usize,
    pub text: String,
}

pub struct WeeklyReviewGenerator<'a> {
    paths: &'a VaultPaths,
    window_days: u32,
}

impl<'a> WeeklyReviewGenerator<'a> {
    pub fn new(paths: &'a VaultPaths, window_days: u32) -> Self {
        Self {
            paths,
            window_days: window_days.max(1),
        }
    }

    pub fn report_path(&self, period_end: NaiveDate) -> PathBuf {
        self.paths
            .weekly_dir
            .join(format!("Review_{}.md", period_end.format("%Y-%m-%d")))
    }

    /// First day of the window ending on `period_end`, inclusive.
    pub fn period_start(&self, period_end: NaiveDate) -> Result<NaiveDate> {
        period_end
            .checked_sub_days(Days::new(u64::from(self.window_days - 1)))
            .with_context(|| {
                format!(
                    "a {}-day review window ending {period_end} starts before the earliest date",
                    self.window_days
                )
            })
    }

    /// Oldest day first; days without a journal file are left out.
    pub fn collect(&self, period_end: NaiveDate) -> Result<Vec<DayLog>> {
        let start = self.period_start(period_end)?;
        let mut logs = Vec::new();
        for day in start.iter_days().take_while(|day| *day <= period_end) {
            if let Some(entries) = read_day(&self.paths.daily_dir, day)? {
                logs.push(DayLog { day, entries });
            }
        }
        Ok(logs)
    }

    pub fn generate(&self, period_end: NaiveDate) -> Result<WeeklyReview> {
        let logs = self.collect(period_end)?;
        let goals = load_state(&self.paths.state_file)
            .context("failed to load trajectory state for review")?
            .current_goals;
        let period_start = self.period_start(period_end)?;
        let text = render_review(period_start, period_end, &logs, &goals);
        Ok(WeeklyReview {
            period_end,
            days_with_entries: logs.len(),
            entry_count: logs.iter().map(|l| l.entries.len()).sum(),
            open_tasks: logs
                .iter()
                .flat_map(|l| &l.entries)
                .map(|e| e.tasks.len())
                .sum(),
            text,
        })
    }

    /// Same date, same file: a rerun replaces the earlier report whole.
    pub fn write(&self, review: &WeeklyReview) -> Result<PathBuf> {
        let path = self.report_path(review.period_end);
        write_atomic(&path, &review.text)?;
        Ok(path)
    }
}

fn write_atomic(path: &Path, text: &str) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("report has no parent: {}", path.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to stage report in {}", dir.display()))?;
    tmp.write_all(text.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn goal_keywords(goal: &str) -> Vec<String> {
    goal.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 4)
        .map(str::to_lowercase)
        .collect()
}

fn entry_haystack(entry: &ParsedEntry) -> String {
    format!(
        "{} {} {} {} {}",
        entry.summary,
        entry.tags.join(" "),
        entry.runway,
        entry.opportunity,
        entry.tasks.join(" ")
    )
    .to_lowercase()
}

fn related_entries(goal: &str, entries: &[&ParsedEntry]) -> usize {
    let keywords = goal_keywords(goal);
    if keywords.is_empty() {
        return 0;
    }
    entries
        .iter()
        .filter(|e| {
            let hay = entry_haystack(e);
            keywords.iter().any(|k| hay.contains(k.as_str()))
        })
        .count()
}

fn meaningful(value: &str, empty: &[&str]) -> bool {
    !empty.contains(&value.trim().to_lowercase().as_str())
}

pub fn render_review(
    period_start: NaiveDate,
    period_end: NaiveDate,
    logs: &[DayLog],
    goals: &[String],
) -> String {
    let entries: Vec<&ParsedEntry> = logs.iter().flat_map(|l| &l.entries).collect();
    let mut out = String::new();

    out.push_str("# Weekly Trajectory Report\n");
    out.push_str(&format!("**Date:** {}\n", period_end.format("%Y-%m-%d")));
    out.push_str(&format!(
        "**Period:** {} to {}\n",
        period_start.format("%Y-%m-%d"),
        period_end.format("%Y-%m-%d")
    ));

    out.push_str("\n## What We Built\n");
    if entries.is_empty() {
        out.push_str("No journal entries in this period.\n");
    }
    for log in logs.iter().filter(|l| !l.entries.is_empty()) {
        out.push_str(&format!("\n### {}\n", log.day.format("%Y-%m-%d")));
        for entry in &log.entries {
            out.push_str(&format!("- {}: {}\n", entry.source_filename, entry.summary));
        }
    }

    out.push_str("\n## Trajectory Analysis\n");
    out.push_str("**Goal Alignment:**\n");
    if goals.is_empty() {
        out.push_str("- No current goals recorded.\n");
    }
    let mut idle_goals = Vec::new();
    for goal in goals {
        let related = related_entries(goal, &entries);
        if related == 0 {
            idle_goals.push(goal.as_str());
        }
        out.push_str(&format!("- {goal}: {related} related entries\n"));
    }

    let runways: BTreeSet<&str> = entries
        .iter()
        .map(|e| e.runway.as_str())
        .filter(|r| meaningful(r, EMPTY_INSIGHT))
        .collect();
    out.push_str("**Runway Discovery:**\n");
    if runways.is_empty() {
        out.push_str("- Nothing identified.\n");
    }
    for runway in &runways {
        out.push_str(&format!("- {runway}\n"));
    }

    let opportunities: BTreeSet<&str> = entries
        .iter()
        .map(|e| e.opportunity.as_str())
        .filter(|o| meaningful(o, EMPTY_INSIGHT))
        .collect();
    let urgent: Vec<&&ParsedEntry> = entries
        .iter()
        .filter(|e| meaningful(&e.urgency, QUIET_URGENCY))
        .collect();
    out.push_str("**Pain Points:**\n");
    if opportunities.is_empty() && urgent.is_empty() {
        out.push_str("- None recorded.\n");
    }
    for opportunity in &opportunities {
        out.push_str(&format!("- {opportunity}\n"));
    }
    for entry in &urgent {
        out.push_str(&format!(
            "- {} flagged {}\n",
            entry.source_filename, entry.urgency
        ));
    }

    out.push_str("\n## Open Tasks\n");
    let mut task_count = 0usize;
    for log in logs {
        for entry in &log.entries {
            for task in &entry.tasks {
                task_count += 1;
                out.push_str(&format!(
                    "- [ ] {task} ({}, {})\n",
                    entry.source_filename,
                    log.day.format("%Y-%m-%d")
                ));
            }
        }
    }
    if task_count == 0 {
        out.push_str("- None.\n");
    }

    out.push_str("\n## Next Week's Directives\n");
    let mut directives = Vec::new();
    if !urgent.is_empty() {
        directives.push(format!("Follow up on {} urgent items.", urgent.len()));
    }
    if task_count > 0 {
        directives.push(format!("Close out {task_count} open tasks."));
    }
    for goal in idle_goals {
        directives.push(format!("Make visible progress on: {goal}."));
    }
    if entries.is_empty() {
        directives.push("Capture work into the inbox so it reaches the journal.".to_string());
    }
    if directives.is_empty() {
        directives.push("Keep the current trajectory.".to_string());
    }
    for directive in directives {
        out.push_str(&format!("- {directive}\n"));
    }
    out
}

/// Generates and writes the report under the vault lock.
pub fn run_review(
    paths: &VaultPaths,
    period_end: NaiveDate,
    window_days: u32,
) -> Result<(WeeklyReview, PathBuf)> {
    paths.ensure_layout()?;
    let _lock = VaultLock::acquire(&paths.lock_file())?;
    let generator = WeeklyReviewGenerator::new(paths, window_days);
    let review = generator.generate(period_end)?;
    let path = generator.write(&review)?;
    tracing::info!(
        report = %path.display(),
        entries = review.entry_count,
        days = review.days_with_entries,
        "weekly review written"
    );
    Ok((review, path))
}

#[cfg(test)]
mod tests {
    use super::{WeeklyReviewGenerator, run_review};
    use crate::organizer::classify::{ClassificationRecord, StrategicInsight};
    use crate::organizer::journal::{JournalEntry, JournalWriter};
    use crate::organizer::paths::VaultPaths;
    use crate::organizer::trajectory::TrajectoryStore;
    use chrono::{Local, NaiveDate, TimeZone};
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn vault() -> (TempDir, VaultPaths) {
        let tmp = tempdir().expect("tempdir");
        let paths = VaultPaths::new(tmp.path().join("vault"), tmp.path().join("inbox"));
        paths.ensure_layout().expect("layout");
        (tmp, paths)
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).expect("date")
    }

    fn log(paths: &VaultPaths, day: NaiveDate, name: &str, summary: &str, tasks: &[&str]) {
        let record = ClassificationRecord {
            summary: summary.to_string(),
            folder_path: "Projects/X".to_string(),
            tags: vec!["#dev".to_string()],
            urgency: if tasks.is_empty() { "Normal" } else { "Action" }.to_string(),
            strategic_insight: StrategicInsight {
                runway: "Mac utility".to_string(),
                audience: "creators".to_string(),
                pain_point: "messy camera rolls".to_string(),
            },
            tasks: tasks.iter().map(|t| t.to_string()).collect(),
        };
        let ts = Local
            .from_local_datetime(&day.and_hms_opt(10, 0, 0).expect("time"))
            .single()
            .expect("ts");
        JournalWriter::new(&paths.daily_dir)
            .append(
                day,
                &JournalEntry {
                    timestamp: ts,
                    source_filename: name,
                    archived_as: None,
                    classification: &record,
                },
            )
            .expect("append");
    }

    #[test]
    fn report_rolls_up_window_only() {
        let (_tmp, paths) = vault();
        log(&paths, date(10), "old.jpg", "Too old", &[]);
        log(&paths, date(12), "a.jpg", "Built the hasher", &["Benchmark hashing"]);
        log(&paths, date(18), "b.md", "Drafted landing page", &[]);

        let review = WeeklyReviewGenerator::new(&paths, 7)
            .generate(date(18))
            .expect("generate");

        assert_eq!(review.entry_count, 2);
        assert_eq!(review.open_tasks, 1);
        let text = &review.text;
        assert!(text.starts_with("# Weekly Trajectory Report\n**Date:** 2026-10-18\n"));
        assert!(text.contains("**Period:** 2026-10-12 to 2026-10-18"));
        assert!(text.contains("- a.jpg: Built the hasher"));
        assert!(!text.contains("Too old"));
        assert!(text.contains("- [ ] Benchmark hashing (a.jpg, 2026-10-12)"));
        assert!(text.contains("- Mac utility"));
        assert!(text.contains("- a.jpg flagged Action"));
        assert!(text.find("## What We Built") < text.find("## Trajectory Analysis"));
        assert!(text.find("## Open Tasks") < text.find("## Next Week's Directives"));
    }

    #[test]
    fn goals_are_scored_against_entries() {
        let (_tmp, paths) = vault();
        let mut store = TrajectoryStore::load(&paths.state_file).expect("load");
        store.add_goal("Efficient file hashing");
        store.add_goal("Launch marketing site");
        store.save().expect("save");
        log(&paths, date(18), "a.jpg", "Faster hashing of videos", &[]);

        let text = WeeklyReviewGenerator::new(&paths, 7)
            .generate(date(18))
            .expect("generate")
            .text;
        assert!(text.contains("- Efficient file hashing: 1 related entries"));
        assert!(text.contains("- Launch marketing site: 0 related entries"));
        assert!(text.contains("- Make visible progress on: Launch marketing site."));
    }

    #[test]
    fn empty_window_still_has_every_section() {
        let (_tmp, paths) = vault();
        let text = WeeklyReviewGenerator::new(&paths, 7)
            .generate(date(18))
            .expect("generate")
            .text;
        for heading in [
            "## What We Built",
            "## Trajectory Analysis",
            "## Open Tasks",
            "## Next Week's Directives",
        ] {
            assert!(text.contains(heading), "missing {heading}");
        }
        assert!(text.contains("No journal entries in this period."));
    }

    #[test]
    fn rerun_for_same_date_overwrites() {
        let (_tmp, paths) = vault();
        log(&paths, date(18), "a.jpg", "First", &[]);
        let (_, path) = run_review(&paths, date(18), 7).expect("first");
        let first = fs::read_to_string(&path).expect("read");

        let (_, again) = run_review(&paths, date(18), 7).expect("same inputs");
        assert_eq!(again, path);
        assert_eq!(fs::read_to_string(&path).expect("read"), first);

        log(&paths, date(18), "b.jpg", "Second", &[]);
        run_review(&paths, date(18), 7).expect("rerun");
        let latest = fs::read_to_string(&path).expect("read");
        assert!(latest.contains("- b.jpg: Second"));
        assert_eq!(fs::read_dir(&paths.weekly_dir).expect("weekly").count(), 1);
        assert!(path.ends_with("Review_2026-10-18.md"));
    }

    #[test]
    fn window_past_the_calendar_start_is_an_error() {
        let (_tmp, paths) = vault();
        let generator = WeeklyReviewGenerator::new(&paths, 400_000_000);
        let err = generator.generate(date(18)).expect_err("should fail");
        assert!(err.to_string().contains("earliest date"));

        let year = WeeklyReviewGenerator::new(&paths, 366);
        assert_eq!(
            year.period_start(date(18)).expect("start"),
            NaiveDate::from_ymd_opt(2025, 10, 18).expect("date")
        );
    }
}
