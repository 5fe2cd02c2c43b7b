use thiserror::Error;

use crate::genai::GenerationError;
use crate::models::Channel;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No tenant found for {channel} address {address}")]
    TenantNotFound { channel: Channel, address: String },

    #[error("Conversation {0} not found")]
    ConversationNotFound(uuid::Uuid),

    /// Per-tenant credentials missing for the requested operation.
    #[error("{0}")]
    MissingCredential(String),

    #[error("{provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("Malformed payload: {0}")]
    Parse(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("AI generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl RelayError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}
