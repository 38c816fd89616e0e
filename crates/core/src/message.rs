//! Message and Transcript domain types.
//!
//! These are the value objects that flow through an agent run:
//! caller input → model request → capability calls → capability results → final answer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System instructions
    System,
    /// The caller (or the outer agent, for a subagent)
    User,
    /// The model
    Assistant,
    /// Output of a capability call, fed back to the model
    CapabilityResult,
}

/// A capability invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityCall {
    /// Correlates the call with its eventual result
    pub id: String,

    /// Name of the capability to invoke
    pub name: String,

    /// Input as a JSON value
    #[serde(default)]
    pub input: serde_json::Value,
}

impl CapabilityCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// A single message in a transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Capability calls requested by the assistant, in emission order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capability_calls: Vec<CapabilityCall>,

    /// If this is a capability result, which call it answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,

    /// Set on capability results whose content is an error text
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            capability_calls: Vec::new(),
            call_id: None,
            is_error: false,
            timestamp: Utc::now(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create an assistant message carrying capability calls.
    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<CapabilityCall>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content);
        msg.capability_calls = calls;
        msg
    }

    /// Create a capability result message.
    pub fn capability_result(
        call_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        let mut msg = Self::with_role(Role::CapabilityResult, content);
        msg.call_id = Some(call_id.into());
        msg.is_error = is_error;
        msg
    }

    pub fn has_capability_calls(&self) -> bool {
        !self.capability_calls.is_empty()
    }
}

/// An append-only, ordered sequence of messages owned by one agent run.
///
/// Messages cannot be edited or removed once pushed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Unique transcript ID
    pub id: String,

    messages: Vec<Message>,

    /// When this transcript was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Transcript {
    /// Create a new empty transcript.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Consume the transcript, yielding its messages.
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Get the total token count estimate (rough: 4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.messages.iter().map(|m| m.content.len() / 4).sum()
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert!(!msg.has_capability_calls());
        assert!(!msg.is_error);
    }

    #[test]
    fn capability_result_links_call() {
        let msg = Message::capability_result("call_7", "Error: boom", true);
        assert_eq!(msg.role, Role::CapabilityResult);
        assert_eq!(msg.call_id.as_deref(), Some("call_7"));
        assert!(msg.is_error);
    }

    #[test]
    fn transcript_tracks_updates() {
        let mut transcript = Transcript::new();
        let created = transcript.created_at;

        transcript.push(Message::user("First message"));
        assert_eq!(transcript.len(), 1);
        assert!(transcript.updated_at >= created);
        assert_eq!(transcript.last().map(|m| m.role), Some(Role::User));
    }

    #[test]
    fn role_serializes_snake_case() {
        let json = serde_json::to_string(&Role::CapabilityResult).unwrap();
        assert_eq!(json, r#""capability_result""#);
    }

    #[test]
    fn transcript_token_estimate() {
        let mut transcript = Transcript::new();
        // 20 chars ≈ 5 tokens
        transcript.push(Message::user("12345678901234567890"));
        assert_eq!(transcript.estimated_tokens(), 5);
    }
}
