//! Stage identifiers, the transition table, and the [`Stage`] contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use waypoint_core::error::StageError;
use waypoint_core::provider::Provider;

use crate::context::ConversationContext;

/// The fixed, ordered set of stages a conversation moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Discovery,
    Requirements,
    Design,
    Complete,
}

impl StageId {
    /// Every stage, in transition order.
    pub const ALL: [StageId; 4] = [
        StageId::Discovery,
        StageId::Requirements,
        StageId::Design,
        StageId::Complete,
    ];

    /// The transition table. `None` marks the terminal stage.
    pub fn next(self) -> Option<StageId> {
        match self {
            StageId::Discovery => Some(StageId::Requirements),
            StageId::Requirements => Some(StageId::Design),
            StageId::Design => Some(StageId::Complete),
            StageId::Complete => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    /// Index in [`StageId::ALL`].
    pub fn position(self) -> usize {
        match self {
            StageId::Discovery => 0,
            StageId::Requirements => 1,
            StageId::Design => 2,
            StageId::Complete => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StageId::Discovery => "discovery",
            StageId::Requirements => "requirements",
            StageId::Design => "design",
            StageId::Complete => "complete",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "discovery" => Ok(StageId::Discovery),
            "requirements" => Ok(StageId::Requirements),
            "design" => Ok(StageId::Design),
            "complete" => Ok(StageId::Complete),
            other => Err(format!(
                "Unknown stage '{other}'. Expected one of: discovery, requirements, design, complete"
            )),
        }
    }
}

/// What a stage produced for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Text shown to the user
    pub message: String,

    /// Whether the stage considers itself done
    pub advance: bool,

    /// Findings to merge into the context under this stage's key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_findings: Option<serde_json::Value>,

    /// Clarifications the user still owes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_questions: Vec<String>,

    /// The final deliverable; ends the conversation when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_artifact: Option<serde_json::Value>,
}

impl StageResult {
    /// A non-advancing reply.
    pub fn reply(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn advancing(mut self, advance: bool) -> Self {
        self.advance = advance;
        self
    }

    pub fn with_findings(mut self, findings: serde_json::Value) -> Self {
        self.partial_findings = Some(findings);
        self
    }

    pub fn with_questions(mut self, questions: Vec<String>) -> Self {
        self.pending_questions = questions;
        self
    }

    pub fn with_artifact(mut self, artifact: serde_json::Value) -> Self {
        self.terminal_artifact = Some(artifact);
        self
    }
}

/// One state of the staged conversation.
///
/// `process` sees the context as it stands before this turn's result is
/// merged; the turn counter for this stage already includes the current turn.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    async fn process(
        &self,
        context: &ConversationContext,
        input: &str,
        model: &Arc<dyn Provider>,
    ) -> Result<StageResult, StageError>;

    /// Whether the machine may move past this stage after `result`.
    fn can_advance(&self, result: &StageResult) -> bool {
        result.advance
    }
}
