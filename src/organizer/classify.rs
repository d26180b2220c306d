use crate::error::ClassificationError;
use crate::organizer::config::ClassifierConfig;
use crate::organizer::remote::{self, RemoteClassifier};
use crate::organizer::util::{run_with_deadline, single_line};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategicInsight {
    pub runway: String,
    pub audience: String,
    pub pain_point: String,
}

/// What the classification service decided about one file. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationRecord {
    pub summary: String,
    pub folder_path: String,
    pub tags: Vec<String>,
    pub urgency: String,
    pub strategic_insight: StrategicInsight,
    pub tasks: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AnalysisDocument {
    #[serde(default)]
    summary: String,
    classification: ClassificationSection,
    #[serde(default)]
    strategic_insight: StrategicInsight,
    #[serde(default)]
    tasks: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClassificationSection {
    folder_path: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    urgency: String,
}

pub trait Classifier {
    fn label(&self) -> &str;
    fn classify(&self, file: &Path) -> Result<ClassificationRecord>;
}

/// Filename, size and (for text files) a leading excerpt: everything a
/// classifier gets to see.
#[derive(Debug, Clone)]
pub struct FileSample {
    pub filename: String,
    pub extension: String,
    pub size_bytes: u64,
    pub excerpt: Option<String>,
}

pub fn sample_file(path: &Path, max_excerpt_bytes: usize) -> Result<FileSample> {
    let filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("unnamed")
        .to_string();
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let meta = path
        .metadata()
        .with_context(|| format!("failed to stat {}", path.display()))?;

    let mut head = Vec::with_capacity(max_excerpt_bytes.min(64 * 1024));
    File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .take(max_excerpt_bytes as u64)
        .read_to_end(&mut head)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let excerpt = match std::str::from_utf8(&head) {
        Ok(text) if !text.contains('\0') && !text.trim().is_empty() => Some(text.to_string()),
        // a multi-byte char cut at the excerpt boundary
        Err(err) if err.error_len().is_none() && err.valid_up_to() > 0 => {
            Some(String::from_utf8_lossy(&head[..err.valid_up_to()]).into_owned())
        }
        _ => None,
    };

    Ok(FileSample {
        filename,
        extension,
        size_bytes: meta.len(),
        excerpt,
    })
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn json_object_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// A tag as it can appear in the comma-joined journal line: one line, no
/// commas, whitespace collapsed.
pub fn clean_tag(tag: &str) -> String {
    single_line(&tag.replace(',', " "))
}

fn dedupe_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|tag| clean_tag(tag))
        .filter(|tag| !tag.is_empty() && seen.insert(tag.clone()))
        .collect()
}

/// Parses the service's analysis document. Anything unusable is a
/// `ClassificationError` so the file stays in the inbox.
pub fn parse_classification(raw: &str) -> Result<ClassificationRecord, ClassificationError> {
    let body = strip_code_fence(raw);
    let json = json_object_span(body)
        .ok_or_else(|| ClassificationError::new("response contains no JSON object"))?;
    let doc: AnalysisDocument = serde_json::from_str(json)
        .map_err(|err| ClassificationError::new(format!("malformed analysis document: {err}")))?;

    let folder_path = doc.classification.folder_path.trim().to_string();
    if folder_path.is_empty() {
        return Err(ClassificationError::new("analysis document has empty folder_path"));
    }

    Ok(ClassificationRecord {
        summary: doc.summary.trim().to_string(),
        folder_path,
        tags: dedupe_tags(doc.classification.tags),
        urgency: doc.classification.urgency.trim().to_string(),
        strategic_insight: doc.strategic_insight,
        tasks: doc
            .tasks
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
    })
}

/// Offline classifier: sorts by file type, never fails on readable files.
pub struct LocalClassifier;

fn local_category(extension: &str) -> (&'static str, &'static str) {
    match extension {
        "jpg" | "jpeg" | "png" | "heic" | "gif" | "webp" | "tiff" | "raw" => {
            ("Media/Images", "#image")
        }
        "mov" | "mp4" | "m4v" | "avi" | "mkv" => ("Media/Video", "#video"),
        "mp3" | "m4a" | "wav" | "flac" | "aac" => ("Media/Audio", "#audio"),
        "pdf" | "doc" | "docx" | "pages" | "odt" | "rtf" => ("Documents", "#document"),
        "md" | "txt" | "org" => ("Notes", "#note"),
        "csv" | "xlsx" | "xls" | "numbers" | "json" => ("Data", "#data"),
        "rs" | "py" | "js" | "ts" | "go" | "sh" | "swift" => ("Projects/Code", "#dev"),
        "zip" | "tar" | "gz" | "7z" | "dmg" => ("Bundles", "#bundle"),
        _ => ("Unsorted", "#misc"),
    }
}

impl Classifier for LocalClassifier {
    fn label(&self) -> &str {
        "local"
    }

    fn classify(&self, file: &Path) -> Result<ClassificationRecord> {
        let sample = sample_file(file, 4 * 1024)?;
        let (folder, tag) = local_category(&sample.extension);
        let mut tasks = Vec::new();
        if let Some(excerpt) = &sample.excerpt {
            for line in excerpt.lines() {
                let trimmed = line.trim();
                let task = trimmed
                    .strip_prefix("- [ ] ")
                    .or_else(|| trimmed.strip_prefix("TODO:"))
                    .or_else(|| trimmed.strip_prefix("TODO "));
                if let Some(task) = task.map(str::trim).filter(|t| !t.is_empty()) {
                    tasks.push(task.to_string());
                }
            }
        }
        let urgency = if tasks.is_empty() { "Normal" } else { "Action" };

        Ok(ClassificationRecord {
            summary: format!(
                "Analyzed content of {} ({} bytes)",
                sample.filename, sample.size_bytes
            ),
            folder_path: folder.to_string(),
            tags: dedupe_tags(vec![tag.to_string(), "#inbox".to_string()]),
            urgency: urgency.to_string(),
            strategic_insight: StrategicInsight::default(),
            tasks,
        })
    }
}

/// Hands the file path to an external program and reads the analysis
/// document from its stdout.
pub struct CommandClassifier {
    pub command: String,
    pub timeout: Duration,
}

impl Classifier for CommandClassifier {
    fn label(&self) -> &str {
        "command"
    }

    fn classify(&self, file: &Path) -> Result<ClassificationRecord> {
        let mut cmd = Command::new(&self.command);
        cmd.arg(file);
        let output = run_with_deadline(&mut cmd, self.timeout).map_err(|err| {
            ClassificationError::new(format!("failed to run {}: {err:#}", self.command))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClassificationError::new(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            ))
            .into());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_classification(&stdout)?)
    }
}

pub fn build_classifier(cfg: &ClassifierConfig) -> Result<Box<dyn Classifier>> {
    let timeout = Duration::from_secs(cfg.timeout_secs);
    match cfg.provider.as_str() {
        "local" => Ok(Box::new(LocalClassifier)),
        "command" => {
            let command = cfg
                .command
                .clone()
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| ClassificationError::new("no classifier command configured"))?;
            Ok(Box::new(CommandClassifier { command, timeout }))
        }
        "auto" => match remote::resolve_auto(cfg) {
            Some(remote) => Ok(Box::new(RemoteClassifier::new(remote, cfg)?)),
            None => Ok(Box::new(LocalClassifier)),
        },
        other => {
            let remote = remote::resolve_named(other, cfg)?;
            Ok(Box::new(RemoteClassifier::new(remote, cfg)?))
        }
    }
}
