//! OpenAI-compatible chat-completions client.
//!
//! Speaks the `/chat/completions` wire format directly over `reqwest`, so it
//! works against OpenAI, OpenRouter, vLLM and any other compatible gateway.

use crate::llm::client::LLMClient;
use crate::types::{AppError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transport-level timeout; stage code applies its own tighter per-call limit.
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

pub struct OpenAIClient {
    client: reqwest::Client,
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl OpenAIClient {
    pub fn new(api_key: String, api_base: String, model: String) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !api_key.is_empty() {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| AppError::Configuration("Invalid API key format".to_string()))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
            temperature: 0.7,
            max_tokens: None,
        })
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = (max_tokens > 0).then_some(max_tokens);
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    async fn chat(&self, messages: Vec<ApiMessage>) -> Result<String> {
        let request = ChatApiRequest {
            model: &self.model,
            messages: &messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(self.chat_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::LLM(format!("OpenAI request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::LLM(format!("OpenAI response unreadable: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ChatApiResponse>(&body)
                .ok()
                .and_then(|parsed| parsed.error)
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(AppError::LLM(format!(
                "OpenAI error ({}): {}",
                status.as_u16(),
                message
            )));
        }

        let parsed: ChatApiResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::LLM(format!("OpenAI response malformed: {}", e)))?;

        if let Some(error) = parsed.error {
            return Err(AppError::LLM(format!(
                "OpenAI error: {}",
                error.message.unwrap_or_default()
            )));
        }

        parsed
            .choices
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or_else(|| AppError::LLM("OpenAI response had no content".to_string()))
    }
}

// ============= Wire Types =============

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

impl ApiMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ChatApiResponse {
    choices: Option<Vec<Choice>>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.chat(vec![ApiMessage::new("user", prompt)]).await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.chat(vec![
            ApiMessage::new("system", system),
            ApiMessage::new("user", prompt),
        ])
        .await
    }

    async fn generate_with_history(&self, messages: &[(String, String)]) -> Result<String> {
        let messages = messages
            .iter()
            .map(|(role, content)| {
                let role = match role.as_str() {
                    "system" | "assistant" => role.as_str(),
                    _ => "user",
                };
                ApiMessage::new(role, content)
            })
            .collect();
        self.chat(messages).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
