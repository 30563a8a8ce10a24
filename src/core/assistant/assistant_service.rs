use async_trait::async_trait;
use thiserror::Error;

use super::models::{AssistantConfig, ChatMessage, ContainerKind};
use super::secret_store::{SecretStore, SecretStoreError, OPENROUTER_API_KEY_PROPERTY};

/// Container content beyond this many characters is cut before it is sent.
const MAX_CONTEXT_CHARS: usize = 100_000;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("API key is missing")]
    MissingApiKey,
    #[error("API key must not be empty")]
    EmptyApiKey,
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("{0}")]
    Provider(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("workspace error: {0}")]
    Workspace(String),
    #[error(transparent)]
    Secrets(#[from] SecretStoreError),
}

impl AssistantError {
    /// Text shown to the user in place of a reply.
    pub fn user_message(&self) -> String {
        match self {
            AssistantError::MissingApiKey => "Error: API Key is missing. Please click the Settings icon and enter your OpenRouter API Key.".to_string(),
            AssistantError::Api { status, body } => format!("API Error ({}): {}", status, body),
            AssistantError::Provider(message) => format!("Error: {}", message),
            AssistantError::Connection(detail) => format!("Connection Error: {}", detail),
            other => format!("Error: {}", other),
        }
    }
}

/// Chat-completion backend.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Sends the conversation and returns the assistant's text.
    async fn chat_complete(
        &self,
        api_key: &str,
        messages: &[ChatMessage],
        config: &AssistantConfig,
    ) -> Result<String, AssistantError>;
}

/// The Workspace file the assistant works on.
///
/// Documents and spreadsheets differ in how content is read and where a reply
/// goes, so each has its own implementation instead of branching on a tag.
#[async_trait]
pub trait WorkspaceContext: Send + Sync {
    fn kind(&self) -> ContainerKind;

    /// Current content rendered as plain text.
    async fn content(&self) -> Result<String, AssistantError>;

    /// Inserts text at the cursor, or appends it when there is no cursor.
    async fn insert_at_cursor(&self, text: &str) -> Result<(), AssistantError>;
}

pub struct AssistantService<P: AiProvider, S: SecretStore> {
    provider: P,
    secrets: S,
    config: AssistantConfig,
}

impl<P: AiProvider, S: SecretStore> AssistantService<P, S> {
    pub fn new(provider: P, secrets: S, config: AssistantConfig) -> Self {
        Self {
            provider,
            secrets,
            config,
        }
    }

    pub async fn save_api_key(&self, key: &str) -> Result<(), AssistantError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AssistantError::EmptyApiKey);
        }
        self.secrets.set(OPENROUTER_API_KEY_PROPERTY, key).await?;
        tracing::info!("Saved OpenRouter API key");
        Ok(())
    }

    pub async fn has_api_key(&self) -> Result<bool, AssistantError> {
        Ok(self.api_key().await?.is_some())
    }

    /// Answers the latest user turn in `history` using the container content
    /// as context.
    pub async fn ask(
        &self,
        context: &dyn WorkspaceContext,
        history: &[ChatMessage],
    ) -> Result<String, AssistantError> {
        let api_key = self.api_key().await?.ok_or(AssistantError::MissingApiKey)?;

        let content = context.content().await?;
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(system_prompt(context.kind(), &content)));
        messages.extend(history.iter().cloned());

        tracing::debug!(
            kind = context.kind().label(),
            content_chars = content.chars().count(),
            turns = history.len(),
            model = %self.config.model,
            "Sending assistant request"
        );

        self.provider
            .chat_complete(&api_key, &messages, &self.config)
            .await
    }

    pub async fn insert_reply(
        &self,
        context: &dyn WorkspaceContext,
        text: &str,
    ) -> Result<(), AssistantError> {
        context.insert_at_cursor(text).await
    }

    async fn api_key(&self) -> Result<Option<String>, AssistantError> {
        Ok(self
            .secrets
            .get(OPENROUTER_API_KEY_PROPERTY)
            .await?
            .filter(|key| !key.trim().is_empty()))
    }
}

fn system_prompt(kind: ContainerKind, content: &str) -> String {
    let mut content = content.to_string();
    if content.chars().count() > MAX_CONTEXT_CHARS {
        content = content.chars().take(MAX_CONTEXT_CHARS).collect();
        content.push_str("\n...");
    }

    format!(
        "You are a helpful assistant working inside a Google {kind}. \
         The current {kind} content is given between <content> tags. \
         Use it to answer the user's questions.\n\n<content>\n{content}\n</content>",
        kind = kind.label(),
        content = content,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySecrets {
        values: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl SecretStore for MemorySecrets {
        async fn get(&self, key: &str) -> Result<Option<String>, SecretStoreError> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), SecretStoreError> {
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingProvider {
        calls: Mutex<Vec<(String, Vec<ChatMessage>)>>,
    }

    #[async_trait]
    impl AiProvider for RecordingProvider {
        async fn chat_complete(
            &self,
            api_key: &str,
            messages: &[ChatMessage],
            _config: &AssistantConfig,
        ) -> Result<String, AssistantError> {
            self.calls
                .lock()
                .unwrap()
                .push((api_key.to_string(), messages.to_vec()));
            Ok("Sure thing".to_string())
        }
    }

    struct FakeDocument {
        text: String,
        inserted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WorkspaceContext for FakeDocument {
        fn kind(&self) -> ContainerKind {
            ContainerKind::Document
        }

        async fn content(&self) -> Result<String, AssistantError> {
            Ok(self.text.clone())
        }

        async fn insert_at_cursor(&self, text: &str) -> Result<(), AssistantError> {
            self.inserted.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn document(text: &str) -> FakeDocument {
        FakeDocument {
            text: text.to_string(),
            inserted: Mutex::new(Vec::new()),
        }
    }

    fn service() -> AssistantService<RecordingProvider, MemorySecrets> {
        AssistantService::new(
            RecordingProvider::default(),
            MemorySecrets::default(),
            AssistantConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_missing_key_short_circuits() {
        let service = service();
        let doc = document("Quarterly plan");

        let err = service
            .ask(&doc, &[ChatMessage::user("Summarise")])
            .await
            .unwrap_err();

        assert!(matches!(err, AssistantError::MissingApiKey));
        assert!(err.user_message().starts_with("Error: API Key is missing."));
        assert!(service.provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_saved_key_is_used_and_content_is_in_system_prompt() {
        let service = service();
        service.save_api_key("  sk-or-123  ").await.unwrap();
        assert!(service.has_api_key().await.unwrap());

        let doc = document("Quarterly plan: ship v2");
        let reply = service
            .ask(&doc, &[ChatMessage::user("What ships?")])
            .await
            .unwrap();
        assert_eq!(reply, "Sure thing");

        let calls = service.provider.calls.lock().unwrap();
        let (key, messages) = &calls[0];
        assert_eq!(key, "sk-or-123");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("Google document"));
        assert!(messages[0].content.contains("Quarterly plan: ship v2"));
        assert_eq!(messages[1], ChatMessage::user("What ships?"));
    }

    #[tokio::test]
    async fn test_empty_key_is_rejected() {
        let service = service();
        let err = service.save_api_key("   ").await.unwrap_err();
        assert!(matches!(err, AssistantError::EmptyApiKey));
        assert!(!service.has_api_key().await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_reply_goes_to_context() {
        let service = service();
        let doc = document("");
        service.insert_reply(&doc, "Inserted text").await.unwrap();
        assert_eq!(*doc.inserted.lock().unwrap(), vec!["Inserted text"]);
    }

    #[test]
    fn test_user_messages_match_sidebar_wording() {
        let api = AssistantError::Api {
            status: 401,
            body: "Unauthorized".to_string(),
        };
        assert_eq!(api.user_message(), "API Error (401): Unauthorized");
        assert_eq!(
            AssistantError::Provider("rate limited".to_string()).user_message(),
            "Error: rate limited"
        );
        assert_eq!(
            AssistantError::Connection("timed out".to_string()).user_message(),
            "Connection Error: timed out"
        );
    }

    #[test]
    fn test_long_content_is_truncated() {
        let content = "x".repeat(MAX_CONTEXT_CHARS + 10);
        let prompt = system_prompt(ContainerKind::Spreadsheet, &content);
        assert!(prompt.contains("Google spreadsheet"));
        assert!(prompt.contains("\n...\n</content>"));
        assert!(prompt.len() < content.len() + 400);
    }
}
