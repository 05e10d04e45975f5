//! Google Generative Language (Gemini) backend, the alternative to OpenAI.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::AppError;
use crate::llm::{or_fallback, ChatBackend, CompletionRequest, DEFAULT_TEMPERATURE};
use crate::retry::RetryPolicy;
use crate::upstream::{send_with_retry, UpstreamRequest};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

pub struct GeminiChat {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
    policy: RetryPolicy,
}

impl GeminiChat {
    pub fn new(client: Client, settings: &Settings) -> Self {
        Self {
            client,
            api_key: settings.gemini_key().map(str::to_string),
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                settings.gemini_api_base.trim_end_matches('/'),
                settings.gemini_model
            ),
            model: settings.gemini_model.clone(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn payload(request: &CompletionRequest) -> Value {
        let body = GenerateContentRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: &request.system_instruction,
                }],
            },
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart {
                    text: &request.user_prompt,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: DEFAULT_TEMPERATURE,
                response_mime_type: request.json_output.then_some("application/json"),
            },
        };
        serde_json::to_value(&body).unwrap_or_default()
    }
}

/// `candidates[0].content.parts[0].text` of a generateContent response.
pub fn extract_answer(body: &Value) -> String {
    or_fallback(
        body.pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str),
    )
}

#[async_trait]
impl ChatBackend for GeminiChat {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, AppError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(AppError::NotConfigured("GEMINI_API_KEY"))?;

        debug!("\u{2192} Gemini request: model = {}", self.model);
        let upstream = UpstreamRequest::post_json(&self.endpoint, Self::payload(request))
            .with_query("key", key);
        let body = send_with_retry(&self.client, &upstream, &self.policy).await?;

        let answer = extract_answer(&body);
        info!(
            model = %self.model,
            "Gemini answer: {}",
            answer.chars().take(200).collect::<String>()
        );
        Ok(answer)
    }
}
