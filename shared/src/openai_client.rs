use async_trait::async_trait;
use openai::chat::{ChatCompletionMessage, ChatCompletionMessageRole};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::AppError;
use crate::llm::{or_fallback, ChatBackend, CompletionRequest, DEFAULT_TEMPERATURE};
use crate::retry::RetryPolicy;
use crate::upstream::{send_with_retry, UpstreamRequest};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatCompletionMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

fn msg(role: ChatCompletionMessageRole, txt: &str) -> ChatCompletionMessage {
    ChatCompletionMessage {
        role,
        content: Some(txt.to_string()),
        ..Default::default()
    }
}

/// OpenAI Chat Completions backend.
pub struct OpenAiChat {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
    policy: RetryPolicy,
}

impl OpenAiChat {
    pub fn new(client: Client, settings: &Settings) -> Self {
        Self {
            client,
            api_key: settings.openai_key().map(str::to_string),
            endpoint: format!(
                "{}/v1/chat/completions",
                settings.openai_api_base.trim_end_matches('/')
            ),
            model: settings.openai_model.clone(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn payload(&self, request: &CompletionRequest) -> Value {
        let messages = vec![
            msg(ChatCompletionMessageRole::System, &request.system_instruction),
            msg(ChatCompletionMessageRole::User, &request.user_prompt),
        ];
        let body = ChatRequest {
            model: &self.model,
            messages: &messages,
            temperature: DEFAULT_TEMPERATURE,
            response_format: request
                .json_output
                .then_some(ResponseFormat { kind: "json_object" }),
        };
        // only strings and numbers, serialization cannot fail
        serde_json::to_value(&body).unwrap_or_default()
    }
}

/// `choices[0].message.content` of a chat completion.
pub fn extract_answer(body: &Value) -> String {
    or_fallback(
        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str),
    )
}

#[async_trait]
impl ChatBackend for OpenAiChat {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, AppError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(AppError::NotConfigured("OPENAI_API_KEY"))?;

        debug!("\u{2192} OpenAI request: model = {}", self.model);
        let upstream = UpstreamRequest::post_json(&self.endpoint, self.payload(request))
            .with_header("Authorization", format!("Bearer {key}"));
        let body = send_with_retry(&self.client, &upstream, &self.policy).await?;

        let answer = extract_answer(&body);
        info!(
            model = %self.model,
            "OpenAI answer: {}",
            answer.chars().take(200).collect::<String>()
        );
        Ok(answer)
    }
}
