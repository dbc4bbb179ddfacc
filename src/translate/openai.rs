// OpenAI-compatible chat completions endpoint (`/chat/completions`)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::TranslationConfig;
use crate::error::{Result, SubversesError};
use crate::openai::ApiClient;
use super::{
    TranslationService,
    common::{TranslationRequest, build_system_prompt, build_user_prompt, parse_translated_lines},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

pub struct OpenAITranslator {
    api: ApiClient,
}

impl OpenAITranslator {
    pub fn new(config: &TranslationConfig) -> Result<Self> {
        let api = ApiClient::new(
            &config.base_url,
            config.api_key.clone(),
            config.organization.clone(),
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(Self { api })
    }

    fn build_body(request: &TranslationRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: request.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: build_system_prompt(&request.target_language),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_user_prompt(request),
                },
            ],
            temperature: request.temperature,
            response_format: ResponseFormat {
                kind: "json_object".to_string(),
            },
        }
    }
}

/// Translated lines from a completion. A reply that cannot be read as lines is fatal.
pub fn lines_from_completion(response: ChatCompletionResponse, chunk_index: usize) -> Result<Vec<String>> {
    let choice = response.choices.into_iter().next().ok_or_else(|| {
        SubversesError::FatalRemote(format!("chunk {}: completion has no choices", chunk_index))
    })?;

    if choice.finish_reason.as_deref() == Some("length") {
        return Err(SubversesError::FatalRemote(format!(
            "chunk {}: completion was cut off at the token limit",
            chunk_index
        )));
    }

    parse_translated_lines(&choice.message.content).ok_or_else(|| {
        SubversesError::FatalRemote(format!(
            "chunk {}: reply is not a JSON object with a \"lines\" array: {}",
            chunk_index,
            choice.message.content.trim()
        ))
    })
}

#[async_trait]
impl TranslationService for OpenAITranslator {
    async fn translate(&self, request: &TranslationRequest) -> Result<Vec<String>> {
        info!(
            "Translating chunk {} ({} line(s)) to {} with {}",
            request.chunk_index,
            request.lines.len(),
            request.target_language,
            request.model
        );

        let body = Self::build_body(request);
        let response = self
            .api
            .send(self.api.post("chat/completions").json(&body), "Translation")
            .await?;

        let text = response
            .text()
            .await
            .map_err(|e| SubversesError::TransientRemote(format!("Failed to read translation response: {}", e)))?;
        debug!("Raw translation response: {}", text);

        let completion: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| SubversesError::FatalRemote(format!("Failed to parse translation response: {}", e)))?;

        lines_from_completion(completion, request.chunk_index)
    }
}
