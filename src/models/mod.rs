//! Language model discovery, resolution and streaming generation.
//!
//! This module provides:
//! - The [`ModelBackend`] seam used by the analysis pipeline
//! - An OpenAI-compatible HTTP backend with server-sent-event streaming
//! - Cached model discovery with tiered name resolution

mod backend;
mod resolver;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::Result;

pub use backend::{GenerationOptions, OpenAiCompatBackend, SseDecoder, SseEvent};
pub use resolver::{match_model, MatchTier, ModelResolver, Resolution, KNOWN_VENDORS};

/// Rough characters-per-token ratio used to turn token limits into character budgets.
pub const APPROX_CHARS_PER_TOKEN: usize = 3;

/// Incremental text produced by a backend.
pub type TextStream = BoxStream<'static, Result<String>>;

/// A model advertised by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Opaque identifier passed back to the backend.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Family/version tag used for matching, e.g. `claude-sonnet-4.6`.
    pub family: String,
    /// Publisher or vendor, possibly empty.
    pub vendor: String,
    /// Input limit in tokens, when the backend reports one.
    pub max_input_tokens: Option<usize>,
}

impl ModelInfo {
    /// Create a model whose id, name and family are all `family`.
    pub fn new(family: impl Into<String>) -> Self {
        let family = family.into();
        Self {
            id: family.clone(),
            name: family.clone(),
            family,
            vendor: String::new(),
            max_input_tokens: None,
        }
    }

    /// Set the opaque identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the vendor.
    #[must_use]
    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    /// Set the input token limit.
    #[must_use]
    pub const fn with_max_input_tokens(mut self, tokens: usize) -> Self {
        self.max_input_tokens = Some(tokens);
        self
    }

    /// Character budget for document text: the configured budget, capped by
    /// what the model's advertised token limit can hold.
    #[must_use]
    pub fn context_budget(&self, configured_chars: usize) -> usize {
        self.max_input_tokens.map_or(configured_chars, |tokens| {
            configured_chars.min(tokens.saturating_mul(APPROX_CHARS_PER_TOKEN))
        })
    }
}

/// Chat role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// System message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// User message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Model discovery and streamed generation.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// List the models the backend currently offers, optionally restricted to one vendor.
    async fn list_models(&self, vendor_filter: Option<&str>) -> Result<Vec<ModelInfo>>;

    /// Start a streamed completion.
    ///
    /// The returned stream may fail mid-way. Implementations should stop
    /// producing chunks once `cancel` fires.
    async fn generate(
        &self,
        model: &ModelInfo,
        messages: &[ChatMessage],
        cancel: CancellationToken,
    ) -> Result<TextStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_info_builders() {
        let model = ModelInfo::new("gpt-4o")
            .with_id("azureml://gpt-4o/2")
            .with_name("OpenAI GPT-4o")
            .with_vendor("OpenAI")
            .with_max_input_tokens(128_000);

        assert_eq!(model.family, "gpt-4o");
        assert_eq!(model.id, "azureml://gpt-4o/2");
        assert_eq!(model.name, "OpenAI GPT-4o");
        assert_eq!(model.vendor, "OpenAI");
        assert_eq!(model.max_input_tokens, Some(128_000));
    }

    #[test]
    fn test_context_budget_without_limit() {
        assert_eq!(ModelInfo::new("gpt-4o").context_budget(60_000), 60_000);
    }

    #[test]
    fn test_context_budget_capped_by_token_limit() {
        let small = ModelInfo::new("gpt-4o-mini").with_max_input_tokens(8_000);
        assert_eq!(small.context_budget(60_000), 24_000);

        let large = ModelInfo::new("claude-sonnet-4.6").with_max_input_tokens(200_000);
        assert_eq!(large.context_budget(60_000), 60_000);
    }

    #[test]
    fn test_chat_message_serializes_lowercase_role() {
        let json = serde_json::to_string(&ChatMessage::system("be brief")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"be brief"}"#);
    }
}
