use crate::organizer::classify::{ClassificationRecord, clean_tag};
use crate::organizer::util::single_line;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const ENTRY_SEPARATOR: &str = "\n---\n";

#[derive(Debug, Clone)]
pub struct JournalEntry<'a> {
    pub timestamp: DateTime<Local>,
    pub source_filename: &'a str,
    pub archived_as: Option<&'a str>,
    pub classification: &'a ClassificationRecord,
}

/// An entry read back from a daily file. Fields missing from hand-edited
/// blocks come back empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEntry {
    pub time: String,
    pub source_filename: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub urgency: String,
    pub runway: String,
    pub opportunity: String,
    pub tasks: Vec<String>,
}

pub fn render_entry(entry: &JournalEntry<'_>) -> String {
    let record = entry.classification;
    let insight = &record.strategic_insight;
    let mut out = String::new();
    out.push_str(&format!(
        "\n## Update: {} - {}\n",
        entry.timestamp.format("%H:%M"),
        single_line(entry.source_filename)
    ));
    out.push_str(&format!("**Summary:** {}\n", single_line(&record.summary)));
    let tags = record
        .tags
        .iter()
        .map(|tag| clean_tag(tag))
        .filter(|tag| !tag.is_empty())
        .collect::<Vec<_>>();
    out.push_str(&format!("**Tags:** {}\n", tags.join(", ")));
    if !record.urgency.is_empty() {
        out.push_str(&format!("**Urgency:** {}\n", single_line(&record.urgency)));
    }
    if let Some(archived_as) = entry.archived_as {
        out.push_str(&format!("**Archived:** {}\n", single_line(archived_as)));
    }
    out.push_str(&format!(
        "**Strategic Runway:** {}\n",
        single_line(&insight.runway)
    ));
    out.push_str(&format!(
        "**Opportunity:** Target {} solving {}\n",
        single_line(&insight.audience),
        single_line(&insight.pain_point)
    ));
    if !record.tasks.is_empty() {
        out.push_str("**Tasks:**\n");
        for task in &record.tasks {
            out.push_str(&format!("- [ ] {}\n", single_line(task)));
        }
    }
    out.push_str(ENTRY_SEPARATOR);
    out
}

/// Append-only per-day markdown journal under `Logs/Daily`.
#[derive(Debug, Clone)]
pub struct JournalWriter {
    daily_dir: PathBuf,
}

impl JournalWriter {
    pub fn new(daily_dir: impl Into<PathBuf>) -> Self {
        Self {
            daily_dir: daily_dir.into(),
        }
    }

    pub fn day_path(&self, day: NaiveDate) -> PathBuf {
        day_file(&self.daily_dir, day)
    }

    /// One `write_all` on an append-mode handle: earlier entries are never
    /// rewritten, whatever happens to this one.
    pub fn append(&self, day: NaiveDate, entry: &JournalEntry<'_>) -> Result<PathBuf> {
        fs::create_dir_all(&self.daily_dir)
            .with_context(|| format!("failed to create {}", self.daily_dir.display()))?;
        let path = self.day_path(day);
        let text = render_entry(entry);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        file.write_all(text.as_bytes())
            .with_context(|| format!("failed to append {}", path.display()))?;
        file.sync_data()?;
        Ok(path)
    }
}

pub fn day_file(daily_dir: &Path, day: NaiveDate) -> PathBuf {
    daily_dir.join(format!("{}.md", day.format("%Y-%m-%d")))
}

fn field<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    line.strip_prefix("**")?
        .strip_prefix(label)?
        .strip_prefix(":**")
        .map(str::trim)
}

pub fn parse_entries(raw: &str) -> Vec<ParsedEntry> {
    let mut out = Vec::new();
    for block in raw.split(ENTRY_SEPARATOR) {
        let mut entry = ParsedEntry::default();
        let mut in_tasks = false;
        let mut seen_header = false;
        for line in block.lines().map(str::trim) {
            if let Some(header) = line.strip_prefix("## Update: ") {
                let (time, name) = header.split_once(" - ").unwrap_or(("", header));
                entry.time = time.trim().to_string();
                entry.source_filename = name.trim().to_string();
                seen_header = true;
                in_tasks = false;
            } else if let Some(v) = field(line, "Summary") {
                entry.summary = v.to_string();
            } else if let Some(v) = field(line, "Tags") {
                entry.tags = v
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(ToOwned::to_owned)
                    .collect();
            } else if let Some(v) = field(line, "Urgency") {
                entry.urgency = v.to_string();
            } else if let Some(v) = field(line, "Strategic Runway") {
                entry.runway = v.to_string();
            } else if let Some(v) = field(line, "Opportunity") {
                entry.opportunity = v.to_string();
            } else if field(line, "Tasks").is_some() {
                in_tasks = true;
            } else if in_tasks && let Some(task) = line.strip_prefix("- [ ] ") {
                entry.tasks.push(task.trim().to_string());
            }
        }
        if seen_header {
            out.push(entry);
        }
    }
    out
}

pub fn read_day(daily_dir: &Path, day: NaiveDate) -> Result<Option<Vec<ParsedEntry>>> {
    let path = day_file(daily_dir, day);
    if !path.exists() {
        return Ok(None);
    }
    let raw =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Some(parse_entries(&raw)))
}

#[cfg(test)]
mod tests {
    use super::{JournalEntry, JournalWriter, parse_entries, read_day, render_entry};
    use crate::organizer::classify::{ClassificationRecord, StrategicInsight};
    use chrono::{Local, NaiveDate, TimeZone};
    use std::fs;
    use tempfile::tempdir;

    fn record(summary: &str) -> ClassificationRecord {
        ClassificationRecord {
            summary: summary.to_string(),
            folder_path: "Projects/X".to_string(),
            tags: vec!["#dev".to_string(), "#automation".to_string()],
            urgency: "Urgent-1".to_string(),
            strategic_insight: StrategicInsight {
                runway: "Standalone Mac utility".to_string(),
                audience: "Power users".to_string(),
                pain_point: "manual sorting".to_string(),
            },
            tasks: vec!["Update README".to_string()],
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).expect("date")
    }

    #[test]
    fn render_matches_journal_template() {
        let rec = record("Analyzed IMG_001.jpg");
        let ts = Local
            .with_ymd_and_hms(2026, 10, 18, 9, 5, 0)
            .single()
            .expect("ts");
        let text = render_entry(&JournalEntry {
            timestamp: ts,
            source_filename: "IMG_001.jpg",
            archived_as: None,
            classification: &rec,
        });
        assert!(text.starts_with("\n## Update: 09:05 - IMG_001.jpg\n"));
        assert!(text.contains("**Tags:** #dev, #automation\n"));
        assert!(text.contains("**Strategic Runway:** Standalone Mac utility\n"));
        assert!(text.contains("**Opportunity:** Target Power users solving manual sorting\n"));
        assert!(text.ends_with("\n---\n"));
    }

    #[test]
    fn appends_accumulate_without_touching_prior_bytes() {
        let tmp = tempdir().expect("tempdir");
        let writer = JournalWriter::new(tmp.path().join("Daily"));
        let rec = record("first");
        let path = writer
            .append(
                day(),
                &JournalEntry {
                    timestamp: Local::now(),
                    source_filename: "a.jpg",
                    archived_as: Some("Archive/Projects/X/a.jpg"),
                    classification: &rec,
                },
            )
            .expect("append");
        let before = fs::read(&path).expect("read");

        for name in ["b.jpg", "c.jpg"] {
            let rec = record(&format!("summary of {name}"));
            writer
                .append(
                    day(),
                    &JournalEntry {
                        timestamp: Local::now(),
                        source_filename: name,
                        archived_as: None,
                        classification: &rec,
                    },
                )
                .expect("append");
        }

        let after = fs::read(&path).expect("read");
        assert_eq!(&after[..before.len()], before.as_slice());

        let entries = read_day(&tmp.path().join("Daily"), day())
            .expect("read day")
            .expect("exists");
        let names = entries
            .iter()
            .map(|e| e.source_filename.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
        assert_eq!(entries[1].summary, "summary of b.jpg");
        assert_eq!(entries[0].tasks, vec!["Update README"]);
        assert_eq!(entries[0].urgency, "Urgent-1");
    }

    #[test]
    fn parses_legacy_entries_without_optional_fields() {
        let raw = "\n## Update: 10:00 - scan.pdf\n**Summary:** Tax form\n**Tags:** #finance\n**Strategic Runway:** none\n**Opportunity:** Target me solving taxes\n\n---\n";
        let entries = parse_entries(raw);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].time, "10:00");
        assert_eq!(entries[0].tags, vec!["#finance"]);
        assert!(entries[0].tasks.is_empty());
    }

    #[test]
    fn hostile_tags_stay_inside_one_entry() {
        let mut rec = record("one file");
        rec.tags = vec![
            "#a\n\n---\n## Update: 00:00 - ghost.jpg".to_string(),
            "#x,#y".to_string(),
        ];
        let text = render_entry(&JournalEntry {
            timestamp: Local::now(),
            source_filename: "real.jpg",
            archived_as: None,
            classification: &rec,
        });

        let entries = parse_entries(&text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source_filename, "real.jpg");
        assert_eq!(
            entries[0].tags,
            vec!["#a --- ## Update: 00:00 - ghost.jpg", "#x #y"]
        );
    }

    #[test]
    fn missing_day_reads_as_none() {
        let tmp = tempdir().expect("tempdir");
        assert!(read_day(tmp.path(), day()).expect("read").is_none());
    }
}
