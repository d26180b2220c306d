use crate::error::ClassificationError;
use crate::organizer::classify::{
    ClassificationRecord, Classifier, FileSample, parse_classification, sample_file,
};
use crate::organizer::config::ClassifierConfig;
use crate::organizer::util::clip_chars;
use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{Value, json};
use std::env;
use std::path::Path;
use std::time::Duration;

const PROMPT_EXCERPT_CHARS: usize = 6_000;
const TEMPERATURE: f64 = 0.2;

const INSTRUCTIONS: &str = "You file incoming documents into a personal knowledge vault. \
Answer with one JSON object and nothing else, shaped like:\n\
{\"summary\": string, \"classification\": {\"folder_path\": string, \"tags\": [\"#tag\"], \"urgency\": string}, \
\"strategic_insight\": {\"runway\": string, \"audience\": string, \"pain_point\": string}, \"tasks\": [string]}\n\
folder_path is relative to the archive, for example \"Projects/Active/Name\".\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Gemini,
    OpenAiCompatible,
}

impl Provider {
    /// Probe order for `auto`.
    const AUTO_ORDER: [Provider; 4] = [
        Provider::OpenAiCompatible,
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Gemini,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            "gemini" => Some(Self::Gemini),
            "openai-compatible" => Some(Self::OpenAiCompatible),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::OpenAiCompatible => "openai-compatible",
        }
    }

    /// Variables checked for a key, most specific first.
    fn key_vars(self) -> &'static [&'static str] {
        match self {
            Self::OpenAi => &["OPENAI_API_KEY", "AI_API_KEY"],
            Self::Anthropic => &["ANTHROPIC_API_KEY", "AI_API_KEY"],
            Self::Gemini => &["GEMINI_API_KEY", "AI_API_KEY"],
            Self::OpenAiCompatible => &["AI_API_KEY", "DEEPSEEK_API_KEY", "OPENAI_API_KEY"],
        }
    }

    /// The variable whose presence selects this provider under `auto`.
    fn own_key_var(self) -> &'static str {
        match self {
            Self::OpenAiCompatible => "AI_API_KEY",
            other => other.key_vars()[0],
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4.1-mini",
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::Gemini => "gemini-2.5-flash-lite",
            Self::OpenAiCompatible => "deepseek-chat",
        }
    }
}

fn env_value(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub provider: Provider,
    pub model: String,
    api_key: String,
    base_url: String,
}

impl Endpoint {
    fn from_config(provider: Provider, cfg: &ClassifierConfig) -> Option<Self> {
        let api_key = provider.key_vars().iter().find_map(|var| env_value(var))?;
        let model = cfg
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(provider.default_model())
            .to_string();
        let base_url = match provider {
            Provider::OpenAi => "https://api.openai.com".to_string(),
            Provider::Anthropic => "https://api.anthropic.com".to_string(),
            Provider::Gemini => "https://generativelanguage.googleapis.com".to_string(),
            Provider::OpenAiCompatible => cfg
                .base_url
                .clone()
                .or_else(|| env_value("AI_BASE_URL"))
                .unwrap_or_else(|| compatible_base_for(&model).to_string()),
        };
        Some(Self {
            provider,
            model,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, client: &Client, prompt: &str) -> RequestBuilder {
        let base = &self.base_url;
        let model = &self.model;
        match self.provider {
            Provider::OpenAi => client
                .post(format!("{base}/v1/responses"))
                .bearer_auth(&self.api_key)
                .json(&json!({"model": model, "input": prompt, "temperature": TEMPERATURE})),
            Provider::Anthropic => client
                .post(format!("{base}/v1/messages"))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&json!({
                    "model": model,
                    "max_tokens": 1200,
                    "temperature": TEMPERATURE,
                    "messages": [{"role": "user", "content": prompt}]
                })),
            Provider::Gemini => client
                .post(format!("{base}/v1beta/models/{model}:generateContent"))
                .query(&[("key", self.api_key.as_str())])
                .json(&json!({"contents": [{"parts": [{"text": prompt}]}]})),
            Provider::OpenAiCompatible => client
                .post(format!("{base}/v1/chat/completions"))
                .bearer_auth(&self.api_key)
                .json(&json!({
                    "model": model,
                    "messages": [{"role": "user", "content": prompt}],
                    "temperature": TEMPERATURE
                })),
        }
    }
}

fn compatible_base_for(model: &str) -> &'static str {
    if model.to_ascii_lowercase().starts_with("deepseek-") {
        "https://api.deepseek.com"
    } else {
        "https://api.openai.com"
    }
}

/// `auto`: the first provider whose own key is set, or `None` to run offline.
pub fn resolve_auto(cfg: &ClassifierConfig) -> Option<Endpoint> {
    let provider = Provider::AUTO_ORDER
        .into_iter()
        .find(|p| env_value(p.own_key_var()).is_some())?;
    Endpoint::from_config(provider, cfg)
}

pub fn resolve_named(name: &str, cfg: &ClassifierConfig) -> Result<Endpoint> {
    let provider = Provider::from_name(name)
        .ok_or_else(|| ClassificationError::new(format!("unknown classifier provider `{name}`")))?;
    Endpoint::from_config(provider, cfg).ok_or_else(|| {
        ClassificationError::new(format!(
            "no API key set for classifier provider {} (tried {})",
            provider.name(),
            provider.key_vars().join(", ")
        ))
        .into()
    })
}

fn render_prompt(sample: &FileSample) -> String {
    let body = match &sample.excerpt {
        Some(excerpt) => format!(
            "content excerpt:\n<<<\n{}\n>>>\n",
            clip_chars(excerpt, PROMPT_EXCERPT_CHARS)
        ),
        None => "content: binary, classify from the filename and size\n".to_string(),
    };
    format!(
        "{INSTRUCTIONS}\nfilename: {}\nsize_bytes: {}\n{body}",
        sample.filename, sample.size_bytes
    )
}

fn joined_texts<'a>(parts: impl Iterator<Item = &'a Value>) -> Option<String> {
    let texts = parts
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>();
    (!texts.is_empty()).then(|| texts.join("\n"))
}

/// Pulls the model's reply out of a provider response body.
fn reply_text(provider: Provider, body: &Value) -> Option<String> {
    match provider {
        Provider::OpenAi => {
            if let Some(text) = body.get("output_text").and_then(Value::as_str) {
                return Some(text.to_string());
            }
            let items = body.get("output")?.as_array()?;
            joined_texts(
                items
                    .iter()
                    .filter_map(|item| item.get("content").and_then(Value::as_array))
                    .flatten(),
            )
        }
        Provider::Anthropic => joined_texts(body.get("content")?.as_array()?.iter()),
        Provider::Gemini => body
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
        Provider::OpenAiCompatible => match body.pointer("/choices/0/message/content")? {
            Value::String(text) => Some(text.clone()),
            Value::Array(parts) => joined_texts(parts.iter()),
            _ => None,
        },
    }
}

/// Classifies through a hosted model API.
pub struct RemoteClassifier {
    endpoint: Endpoint,
    client: Client,
    max_excerpt_bytes: usize,
}

impl RemoteClassifier {
    pub fn new(endpoint: Endpoint, cfg: &ClassifierConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            endpoint,
            client,
            max_excerpt_bytes: cfg.max_excerpt_bytes,
        })
    }

    fn ask(&self, prompt: &str) -> Result<String> {
        let provider = self.endpoint.provider;
        let response = self
            .endpoint
            .request(&self.client, prompt)
            .send()
            .with_context(|| format!("{} request failed", provider.name()))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("{} returned status {status}", provider.name());
        }
        let body: Value = response
            .json()
            .with_context(|| format!("{} returned a non-JSON body", provider.name()))?;
        reply_text(provider, &body)
            .with_context(|| format!("{} response has no text content", provider.name()))
    }
}

impl Classifier for RemoteClassifier {
    fn label(&self) -> &str {
        self.endpoint.provider.name()
    }

    fn classify(&self, file: &Path) -> Result<ClassificationRecord> {
        let sample = sample_file(file, self.max_excerpt_bytes)?;
        let reply = self
            .ask(&render_prompt(&sample))
            .map_err(|err| ClassificationError::new(format!("{err:#}")))?;
        tracing::debug!(
            provider = self.label(),
            model = %self.endpoint.model,
            file = %sample.filename,
            "classifier replied"
        );
        Ok(parse_classification(&reply)?)
    }
}
