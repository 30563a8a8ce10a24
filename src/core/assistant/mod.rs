pub mod assistant_service;
pub mod models;
pub mod secret_store;

pub use assistant_service::{AiProvider, AssistantError, AssistantService, WorkspaceContext};
pub use models::{AssistantConfig, ChatMessage, ContainerKind};
pub use secret_store::{SecretStore, SecretStoreError};
