use crate::error::StateCorruptionError;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Cross-run memory: goals, per-day summaries, and when the last run ended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryState {
    pub current_goals: Vec<String>,
    pub project_trajectories: BTreeMap<String, Vec<String>>,
    pub last_run: Option<String>,
    /// Keys written by other tools are carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl TrajectoryState {
    pub fn summaries_for(&self, day: NaiveDate) -> &[String] {
        self.project_trajectories
            .get(&day_key(day))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

pub fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

#[derive(Debug)]
pub struct TrajectoryStore {
    path: PathBuf,
    state: TrajectoryState,
}

impl TrajectoryStore {
    /// Missing file means a fresh vault; an unreadable one is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let state = load_state(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    pub fn state(&self) -> &TrajectoryState {
        &self.state
    }

    pub fn record_summary(&mut self, day: NaiveDate, summary: &str) {
        self.state
            .project_trajectories
            .entry(day_key(day))
            .or_default()
            .push(summary.to_string());
    }

    pub fn mark_run(&mut self, at: DateTime<Local>) {
        self.state.last_run = Some(at.to_rfc3339_opts(SecondsFormat::Secs, false));
    }

    pub fn add_goal(&mut self, goal: &str) -> bool {
        let goal = goal.trim();
        if goal.is_empty() || self.state.current_goals.iter().any(|g| g == goal) {
            return false;
        }
        self.state.current_goals.push(goal.to_string());
        true
    }

    pub fn clear_goals(&mut self) -> usize {
        let removed = self.state.current_goals.len();
        self.state.current_goals.clear();
        removed
    }

    pub fn save(&self) -> Result<()> {
        save_state(&self.path, &self.state)
    }
}

pub fn load_state(path: &Path) -> Result<TrajectoryState> {
    if !path.exists() {
        return Ok(TrajectoryState::default());
    }

    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: TrajectoryState =
        serde_json::from_str(&raw).map_err(|err| StateCorruptionError {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    Ok(parsed)
}

/// Writes a sibling temp file and renames it over the old state, so a crash
/// leaves either the previous document or the new one.
pub fn save_state(path: &Path, state: &TrajectoryState) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;

    let data = serde_json::to_string_pretty(state)?;
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    tmp.write_all(format!("{data}\n").as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}
