use serde::{Deserialize, Serialize};

/// Model used when `OPENROUTER_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-exp:free";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub model: String,
    /// Sent as `provider.sort` so OpenRouter routes to the fastest host.
    pub provider_sort: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider_sort: Some("throughput".to_string()),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Which kind of Workspace file the assistant is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Document,
    Spreadsheet,
}

impl ContainerKind {
    pub fn label(&self) -> &'static str {
        match self {
            ContainerKind::Document => "document",
            ContainerKind::Spreadsheet => "spreadsheet",
        }
    }
}
