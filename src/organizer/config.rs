use crate::error::ConfigInvalidError;
use crate::organizer::paths::VaultPaths;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Longest weekly-review window accepted from config or the command line.
pub const MAX_REVIEW_WINDOW_DAYS: u32 = 366;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupeMode {
    /// Consult the fingerprint ledger and skip known content.
    Index,
    /// Record fingerprints but never skip; every inbox file is archived.
    Legacy,
}

impl DedupeMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "index" | "enforce" | "on" => Some(Self::Index),
            "legacy" | "off" | "none" => Some(Self::Legacy),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Legacy => "legacy",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupeConfig {
    pub mode: DedupeMode,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            mode: DedupeMode::Index,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub provider: String,
    pub model: Option<String>,
    pub command: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_excerpt_bytes: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: "auto".to_string(),
            model: None,
            command: None,
            base_url: None,
            timeout_secs: 45,
            max_excerpt_bytes: 8 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub window_days: u32,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self { window_days: 7 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrganizerConfig {
    pub dedupe: DedupeConfig,
    pub classifier: ClassifierConfig,
    pub review: ReviewConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialOrganizerConfig {
    dedupe: Option<DedupeConfig>,
    classifier: Option<ClassifierConfig>,
    review: Option<ReviewConfig>,
}

const KNOWN_PROVIDERS: [&str; 7] = [
    "auto",
    "local",
    "command",
    "openai",
    "anthropic",
    "gemini",
    "openai-compatible",
];

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_optional(var: &str, fallback: Option<String>) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => fallback,
    }
}

fn validate(cfg: &OrganizerConfig) -> Result<()> {
    let provider = cfg.classifier.provider.as_str();
    if !KNOWN_PROVIDERS.contains(&provider) {
        return Err(anyhow!(
            "invalid classifier provider `{provider}`; use one of {}",
            KNOWN_PROVIDERS.join(", ")
        ));
    }
    if provider == "command"
        && cfg
            .classifier
            .command
            .as_deref()
            .is_none_or(|c| c.trim().is_empty())
    {
        return Err(anyhow!(
            "classifier provider `command` requires classifier.command or ORGANIZER_CLASSIFIER_COMMAND"
        ));
    }
    if cfg.classifier.timeout_secs == 0 {
        return Err(anyhow!("invalid classifier timeout: must be >= 1 second"));
    }
    if !(1..=MAX_REVIEW_WINDOW_DAYS).contains(&cfg.review.window_days) {
        return Err(anyhow!(
            "invalid review window {}: must be 1..={MAX_REVIEW_WINDOW_DAYS} days",
            cfg.review.window_days
        ));
    }
    Ok(())
}

fn resolve_config_path(paths: &VaultPaths) -> PathBuf {
    if let Ok(custom) = env::var("ORGANIZER_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    paths.vault_root.join("organizer.toml")
}

fn merge_file_config(base: &mut OrganizerConfig, paths: &VaultPaths) -> Result<()> {
    let path = resolve_config_path(paths);
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)
        .map_err(|err| anyhow!("failed to read organizer config {}: {err}", path.display()))?;
    merge_toml(base, &raw)
        .map_err(|err| anyhow!("failed to parse organizer config {}: {err}", path.display()))
}

fn merge_toml(base: &mut OrganizerConfig, raw: &str) -> Result<()> {
    let parsed: PartialOrganizerConfig = toml::from_str(raw)?;
    if let Some(dedupe) = parsed.dedupe {
        base.dedupe = dedupe;
    }
    if let Some(classifier) = parsed.classifier {
        base.classifier = classifier;
    }
    if let Some(review) = parsed.review {
        base.review = review;
    }
    Ok(())
}

/// Defaults, then `organizer.toml`, then `ORGANIZER_*` env overrides.
pub fn load_config(paths: &VaultPaths) -> Result<OrganizerConfig> {
    layered_config(paths).map_err(|err| ConfigInvalidError(format!("{err:#}")).into())
}

fn layered_config(paths: &VaultPaths) -> Result<OrganizerConfig> {
    let mut cfg = OrganizerConfig::default();
    merge_file_config(&mut cfg, paths)?;

    if let Ok(raw) = env::var("ORGANIZER_DEDUPE_MODE") {
        cfg.dedupe.mode = DedupeMode::parse(&raw)
            .ok_or_else(|| anyhow!("invalid ORGANIZER_DEDUPE_MODE `{raw}`; use `index` or `legacy`"))?;
    }
    cfg.classifier.provider = env_or_string("ORGANIZER_CLASSIFIER", &cfg.classifier.provider)
        .to_ascii_lowercase();
    cfg.classifier.model = env_or_optional("ORGANIZER_CLASSIFIER_MODEL", cfg.classifier.model);
    cfg.classifier.command =
        env_or_optional("ORGANIZER_CLASSIFIER_COMMAND", cfg.classifier.command);
    cfg.classifier.base_url =
        env_or_optional("ORGANIZER_CLASSIFIER_BASE_URL", cfg.classifier.base_url);
    cfg.classifier.timeout_secs =
        env_or_u64("ORGANIZER_CLASSIFIER_TIMEOUT_SECS", cfg.classifier.timeout_secs);
    cfg.review.window_days =
        env_or_u64("ORGANIZER_REVIEW_WINDOW_DAYS", u64::from(cfg.review.window_days))
            .min(u64::from(u32::MAX)) as u32;

    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::{DedupeMode, OrganizerConfig, load_config, merge_toml, validate};
    use crate::error::ConfigInvalidError;
    use crate::organizer::paths::VaultPaths;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn toml_sections_override_defaults() {
        let mut cfg = OrganizerConfig::default();
        merge_toml(
            &mut cfg,
            "[dedupe]\nmode = \"legacy\"\n\n[classifier]\nprovider = \"local\"\n\n[review]\nwindow_days = 14\n",
        )
        .expect("parse");
        assert_eq!(cfg.dedupe.mode, DedupeMode::Legacy);
        assert_eq!(cfg.classifier.provider, "local");
        assert_eq!(cfg.classifier.timeout_secs, 45);
        assert_eq!(cfg.review.window_days, 14);
        validate(&cfg).expect("valid");
    }

    #[test]
    fn command_provider_requires_command() {
        let mut cfg = OrganizerConfig::default();
        cfg.classifier.provider = "command".to_string();
        assert!(validate(&cfg).is_err());
        cfg.classifier.command = Some("/usr/local/bin/classify".to_string());
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let mut cfg = OrganizerConfig::default();
        cfg.classifier.provider = "oracle".to_string();
        let err = validate(&cfg).expect_err("should reject");
        assert!(err.to_string().contains("invalid classifier provider"));
    }

    #[test]
    fn review_window_is_bounded() {
        let mut cfg = OrganizerConfig::default();
        cfg.review.window_days = 0;
        assert!(validate(&cfg).is_err());
        cfg.review.window_days = 400_000_000;
        let err = validate(&cfg).expect_err("should reject");
        assert!(err.to_string().contains("invalid review window"));
        cfg.review.window_days = 366;
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn dedupe_mode_aliases() {
        assert_eq!(DedupeMode::parse("Index"), Some(DedupeMode::Index));
        assert_eq!(DedupeMode::parse("off"), Some(DedupeMode::Legacy));
        assert_eq!(DedupeMode::parse("maybe"), None);
    }

    #[test]
    fn malformed_file_is_reported_as_invalid_config() {
        let tmp = tempdir().expect("tempdir");
        let paths = VaultPaths::new(tmp.path().join("vault"), tmp.path().join("inbox"));
        fs::create_dir_all(&paths.vault_root).expect("mkdir");
        fs::write(paths.vault_root.join("organizer.toml"), "[review]\nwindow_days = \"soon\"\n")
            .expect("write");

        let err = load_config(&paths).expect_err("should reject");
        assert!(err.chain().any(|c| c.is::<ConfigInvalidError>()));
    }
}
