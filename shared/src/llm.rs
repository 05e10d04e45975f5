//! One completion contract, several chat backends.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::{LlmBackendKind, Settings};
use crate::error::AppError;
use crate::gemini_client::GeminiChat;
use crate::openai_client::OpenAiChat;
use crate::retry::RetryPolicy;

/// Returned to the client when the model answered without any text.
pub const FALLBACK_ANSWER: &str = "AI 분석에 실패했습니다.";

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_instruction: String,
    pub user_prompt: String,
    /// Ask the model for a single JSON object.
    pub json_output: bool,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the model's text, or [`FALLBACK_ANSWER`] when the response
    /// carried none.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AppError>;
}

/// Picks the backend named by `LLM_BACKEND`.
pub fn backend_from_settings(
    settings: &Settings,
    client: Client,
    policy: RetryPolicy,
) -> Arc<dyn ChatBackend> {
    match settings.llm_backend {
        LlmBackendKind::OpenAi => Arc::new(OpenAiChat::new(client, settings).with_policy(policy)),
        LlmBackendKind::Gemini => Arc::new(GeminiChat::new(client, settings).with_policy(policy)),
    }
}

pub(crate) fn or_fallback(answer: Option<&str>) -> String {
    answer
        .filter(|a| !a.is_empty())
        .unwrap_or(FALLBACK_ANSWER)
        .to_string()
}
