use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

fn default_port() -> u16 {
    3000
}

fn default_openai_model() -> String {
    "gpt-4o".into()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".into()
}

fn default_openai_api_base() -> String {
    "https://api.openai.com".into()
}

fn default_gemini_api_base() -> String {
    "https://generativelanguage.googleapis.com".into()
}

fn default_youtube_api_base() -> String {
    "https://www.googleapis.com".into()
}

fn default_sheets_api_base() -> String {
    "https://sheets.googleapis.com".into()
}

fn default_students_data_file() -> String {
    "data/students-data.json".into()
}

fn default_upstream_timeout_secs() -> u64 {
    60
}

/// Which chat backend answers `/api/analyze`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackendKind {
    #[default]
    OpenAi,
    Gemini,
}

impl LlmBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmBackendKind::OpenAi => "openai",
            LlmBackendKind::Gemini => "gemini",
        }
    }
}

/// Service configuration, read once from the process environment.
///
/// Keys are the upper-case environment variable names lowered by
/// [`config::Environment`], e.g. `OPENAI_API_KEY` becomes `openai_api_key`.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub vite_openai_api_key: Option<String>,
    #[serde(default)]
    pub youtube_api_key: Option<String>,
    #[serde(default)]
    pub google_api_key: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default)]
    pub google_form_url: Option<String>,
    #[serde(default)]
    pub google_sheets_id: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub llm_backend: LlmBackendKind,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_openai_api_base")]
    pub openai_api_base: String,
    #[serde(default = "default_gemini_api_base")]
    pub gemini_api_base: String,
    #[serde(default = "default_youtube_api_base")]
    pub youtube_api_base: String,
    #[serde(default = "default_sheets_api_base")]
    pub sheets_api_base: String,
    #[serde(default = "default_students_data_file")]
    pub students_data_file: String,
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize()
    }

    /// Builds settings from an explicit variable map instead of the process
    /// environment.
    pub fn from_map(vars: HashMap<String, String>) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default().source(Some(vars)))
            .build()?
            .try_deserialize()
    }

    /// `VITE_OPENAI_API_KEY` wins over `OPENAI_API_KEY` so the front-end's
    /// `.env` can be shared with the backend.
    pub fn openai_key(&self) -> Option<&str> {
        non_empty(&self.vite_openai_api_key).or_else(|| non_empty(&self.openai_api_key))
    }

    pub fn youtube_key(&self) -> Option<&str> {
        non_empty(&self.youtube_api_key).or_else(|| non_empty(&self.google_api_key))
    }

    pub fn sheets_key(&self) -> Option<&str> {
        non_empty(&self.google_api_key).or_else(|| non_empty(&self.youtube_api_key))
    }

    pub fn gemini_key(&self) -> Option<&str> {
        non_empty(&self.gemini_api_key)
    }

    pub fn form_url(&self) -> Option<&str> {
        non_empty(&self.google_form_url)
    }

    pub fn sheets_id(&self) -> Option<&str> {
        non_empty(&self.google_sheets_id)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs.max(1))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
