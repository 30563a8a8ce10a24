use crate::core::assistant::{AiProvider, AssistantConfig, AssistantError, ChatMessage};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Attribution headers OpenRouter shows on its dashboard.
const REFERER: &str = "https://script.google.com/";
const APP_TITLE: &str = "Google Docs Gemini Sidebar";

pub struct OpenRouterClient {
    client: Client,
    url: String,
}

impl OpenRouterClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            url: OPENROUTER_URL.to_string(),
        }
    }
}

impl Default for OpenRouterClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AiProvider for OpenRouterClient {
    async fn chat_complete(
        &self,
        api_key: &str,
        messages: &[ChatMessage],
        config: &AssistantConfig,
    ) -> Result<String, AssistantError> {
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("HTTP-Referer", REFERER)
            .header("X-Title", APP_TITLE)
            .json(&build_payload(messages, config))
            .send()
            .await
            .map_err(|e| AssistantError::Connection(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AssistantError::Connection(e.to_string()))?;

        if status.as_u16() != 200 {
            return Err(AssistantError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let body: Value =
            serde_json::from_str(&text).map_err(|e| AssistantError::Connection(e.to_string()))?;
        parse_completion(&body)
    }
}

fn build_payload(messages: &[ChatMessage], config: &AssistantConfig) -> Value {
    let mut payload = json!({
        "model": config.model,
        "messages": messages,
    });

    if let Some(sort) = &config.provider_sort {
        payload["provider"] = json!({ "sort": sort });
    }
    if let Some(temperature) = config.temperature {
        payload["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = config.max_tokens {
        payload["max_tokens"] = json!(max_tokens);
    }

    payload
}

/// A 200 response can still carry an `error` object.
fn parse_completion(body: &Value) -> Result<String, AssistantError> {
    if let Some(error) = body.get("error") {
        let message = error["message"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(AssistantError::Provider(message));
    }

    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AssistantError::Provider("Failed to parse response content".to_string()))
}
