//! Chat provider trait — the abstraction over the model endpoint.
//!
//! The control loop posts one request per step and needs exactly one thing
//! back: the model's output text. Everything transport-shaped (HTTP, auth,
//! response navigation) lives behind this trait so the loop can be driven by
//! the real client in `pagemind-providers` or a test stub.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Message roles the request body uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    System,
}

/// One message in the request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// A complete request body for the model endpoint.
///
/// Message order is a pinned contract: the per-phase state message first,
/// the system message (carrying the memory snapshot) second. The model in
/// use is prompt-primed on the later-in-array content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f64,
    pub messages: Vec<ChatMessage>,
}

/// The model endpoint capability.
///
/// `complete` resolves to the output text at `choices[0].message.content`;
/// navigation failures surface as [`ProviderError::MalformedResponse`].
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// A human-readable name for logs.
    fn name(&self) -> &str;

    /// Post the request and return the model's output text.
    async fn complete(&self, request: ChatRequest) -> Result<String, ProviderError>;
}
