//! Conversation context carried across turns of a staged conversation.
//!
//! The context is plain data owned by the caller. Callers may serialize it
//! between turns; the pipeline only ever hands back an updated copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use waypoint_core::error::StageError;

use crate::stage::StageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: ChatRole,
    pub content: String,
    /// The stage that was active when the entry was recorded
    pub stage: StageId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    id: String,
    stage: StageId,
    #[serde(default)]
    findings: BTreeMap<StageId, serde_json::Value>,
    #[serde(default)]
    history: Vec<ChatEntry>,
    #[serde(default)]
    pending_questions: Vec<String>,
    #[serde(default)]
    stage_turns: BTreeMap<StageId, u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    artifact: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConversationContext {
    /// A fresh conversation at the first stage.
    pub fn new() -> Self {
        Self::starting_at(StageId::Discovery)
    }

    /// A fresh conversation that skips the stages before `stage`.
    pub fn starting_at(stage: StageId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            stage,
            findings: BTreeMap::new(),
            history: Vec::new(),
            pending_questions: Vec::new(),
            stage_turns: BTreeMap::new(),
            artifact: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stage(&self) -> StageId {
        self.stage
    }

    pub fn is_complete(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn findings(&self) -> &BTreeMap<StageId, serde_json::Value> {
        &self.findings
    }

    pub fn findings_for(&self, stage: StageId) -> Option<&serde_json::Value> {
        self.findings.get(&stage)
    }

    pub fn history(&self) -> &[ChatEntry] {
        &self.history
    }

    /// The last `n` history entries, oldest first.
    pub fn recent_history(&self, n: usize) -> &[ChatEntry] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    pub fn pending_questions(&self) -> &[String] {
        &self.pending_questions
    }

    /// Turns `stage` has processed so far.
    pub fn turns(&self, stage: StageId) -> u32 {
        self.stage_turns.get(&stage).copied().unwrap_or(0)
    }

    pub fn artifact(&self) -> Option<&serde_json::Value> {
        self.artifact.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // ── Mutation (pipeline only) ───────────────────────────────────────

    pub(crate) fn record(&mut self, role: ChatRole, content: impl Into<String>) {
        self.history.push(ChatEntry {
            role,
            content: content.into(),
            stage: self.stage,
            timestamp: Utc::now(),
        });
        self.touch();
    }

    pub(crate) fn bump_turns(&mut self, stage: StageId) -> u32 {
        let turns = self.stage_turns.entry(stage).or_insert(0);
        *turns += 1;
        *turns
    }

    /// Deep-merge `partial` into the findings for `stage`. Objects merge key
    /// by key; arrays and scalars replace what was there.
    pub(crate) fn merge_findings(&mut self, stage: StageId, partial: serde_json::Value) {
        match self.findings.get_mut(&stage) {
            Some(existing) => merge_json(existing, partial),
            None => {
                self.findings.insert(stage, partial);
            }
        }
        self.touch();
    }

    pub(crate) fn set_pending_questions(&mut self, questions: Vec<String>) {
        self.pending_questions = questions;
    }

    /// Move to the next stage. Returns the transition, or `None` at the
    /// terminal stage.
    pub(crate) fn advance(&mut self) -> Option<(StageId, StageId)> {
        let from = self.stage;
        let to = from.next()?;
        self.stage = to;
        self.touch();
        Some((from, to))
    }

    /// Store the final artifact and take the last step into the terminal
    /// stage. Only the stage directly before [`StageId::Complete`] may do
    /// this; anything earlier would skip stages.
    pub(crate) fn complete_with(
        &mut self,
        artifact: serde_json::Value,
    ) -> Result<(StageId, StageId), StageError> {
        let from = self.stage;
        if from.next() != Some(StageId::Complete) {
            return Err(StageError::Internal(format!(
                "stage '{from}' produced a final artifact, but only the stage before '{}' may",
                StageId::Complete
            )));
        }
        self.artifact = Some(artifact);
        self.pending_questions.clear();
        self.stage = StageId::Complete;
        self.touch();
        Ok((from, StageId::Complete))
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_json(target: &mut serde_json::Value, patch: serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(existing), serde_json::Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
