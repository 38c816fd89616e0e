//! Provider trait: the abstraction over language-model backends.
//!
//! A Provider knows how to send a transcript to a model and get back either
//! an assistant message (text plus optional capability calls) or, when the
//! backend supports it, a structured JSON object matching a schema.
//!
//! Vendor integrations live outside this workspace; the engine only ever
//! sees this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

use crate::capability::CapabilityDefinition;
use crate::error::ProviderError;
use crate::message::{CapabilityCall, Message};

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "anthropic/claude-sonnet-4", "gpt-4o")
    pub model: String,

    /// The transcript so far
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Capabilities the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<CapabilityDefinition>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderRequest {
    /// A request with default sampling settings and no capabilities.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_tokens: None,
            capabilities: Vec::new(),
        }
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated assistant message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

impl ProviderResponse {
    pub fn text(&self) -> &str {
        &self.message.content
    }

    pub fn capability_calls(&self) -> &[CapabilityCall] {
        &self.message.capability_calls
    }
}

/// A structured-output response: JSON data that the backend claims matches
/// the requested schema. Callers still validate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredResponse {
    pub data: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Token usage information. Sums saturate at `u32::MAX`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

impl Add for Usage {
    type Output = Usage;

    fn add(self, rhs: Usage) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens.saturating_add(rhs.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_add(rhs.completion_tokens),
            total_tokens: self.total_tokens.saturating_add(rhs.total_tokens),
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Usage) {
        *self = *self + rhs;
    }
}

/// The core Provider trait.
///
/// The agent loop and the pipeline stages call `complete()` without knowing
/// which vendor is behind it. Implementations must be re-entrant: one handle
/// is shared by reference between an outer agent and its subagents.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter", "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Ask for a JSON object conforming to `schema`.
    ///
    /// Default implementation reports the feature as unsupported; callers then
    /// fall back to `complete()` and extract JSON from the text themselves.
    async fn complete_structured(
        &self,
        _request: ProviderRequest,
        _schema: &serde_json::Value,
    ) -> Result<StructuredResponse, ProviderError> {
        Err(ProviderError::StructuredOutputUnsupported(
            self.name().to_string(),
        ))
    }
}
