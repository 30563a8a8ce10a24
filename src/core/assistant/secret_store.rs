use async_trait::async_trait;
use thiserror::Error;

/// Property under which the OpenRouter key is stored.
pub const OPENROUTER_API_KEY_PROPERTY: &str = "OPENROUTER_API_KEY";

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("Secret store error: {0}")]
    Storage(String),
}

/// Per-user key/value properties that survive restarts.
///
/// The core only reads and writes through this port; the backing storage
/// lives in the infra layer.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, SecretStoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), SecretStoreError>;
}
