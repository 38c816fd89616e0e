//! The stage state machine.
//!
//! Each turn is processed by the context's current stage. When the stage
//! may advance and produced no terminal artifact, the context moves to the
//! next stage and, with cascading on, the same input is processed again by
//! the new stage. A terminal artifact, which only the stage right before
//! [`StageId::Complete`] may produce, completes the conversation and ends
//! the turn. Stages are never skipped.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span};
use waypoint_core::error::StageError;
use waypoint_core::event::{DomainEvent, EventBus};
use waypoint_core::provider::Provider;

use crate::context::{ChatRole, ConversationContext};
use crate::stage::{Stage, StageId};

/// What one caller-visible turn produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRunResult {
    /// Text to show the user
    pub message: String,
    /// Whether the conversation moved to a later stage this turn
    pub advance: bool,
    /// The updated context, or the caller's own when the request was rejected
    pub context: Option<ConversationContext>,
    #[serde(default)]
    pub pending_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_artifact: Option<serde_json::Value>,
}

impl StageRunResult {
    /// A non-advancing result that leaves `context` as it was.
    pub fn unchanged(message: impl Into<String>, context: Option<ConversationContext>) -> Self {
        let pending_questions = context
            .as_ref()
            .map(|c| c.pending_questions().to_vec())
            .unwrap_or_default();
        Self {
            message: message.into(),
            advance: false,
            context,
            pending_questions,
            terminal_artifact: None,
        }
    }
}

/// Runs one turn of a staged conversation.
#[async_trait]
pub trait StageRunner: Send + Sync {
    async fn run(
        &self,
        stage: StageId,
        input: &str,
        context: ConversationContext,
        model: Arc<dyn Provider>,
    ) -> Result<StageRunResult, StageError>;
}

pub struct StageMachine {
    stages: HashMap<StageId, Arc<dyn Stage>>,
    cascade: bool,
    event_bus: Option<Arc<EventBus>>,
}

impl StageMachine {
    /// Build a machine from exactly one stage per [`StageId`].
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Result<Self, StageError> {
        let mut by_id: HashMap<StageId, Arc<dyn Stage>> = HashMap::new();
        for stage in stages {
            let id = stage.id();
            if by_id.insert(id, stage).is_some() {
                return Err(StageError::Internal(format!(
                    "stage '{id}' registered more than once"
                )));
            }
        }
        let missing: Vec<&str> = StageId::ALL
            .iter()
            .filter(|id| !by_id.contains_key(id))
            .map(|id| id.name())
            .collect();
        if !missing.is_empty() {
            return Err(StageError::Internal(format!(
                "no stage registered for: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            stages: by_id,
            cascade: true,
            event_bus: None,
        })
    }

    /// Re-process the same input in a stage the turn just advanced into.
    pub fn with_cascade(mut self, cascade: bool) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    fn stage(&self, id: StageId) -> Result<&Arc<dyn Stage>, StageError> {
        self.stages
            .get(&id)
            .ok_or_else(|| StageError::Internal(format!("no stage registered for '{id}'")))
    }

    fn publish_transition(&self, context: &ConversationContext, from: StageId, to: StageId) {
        info!(conversation_id = %context.id(), %from, %to, "Stage advanced");
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::StageAdvanced {
                conversation_id: context.id().to_string(),
                from: from.to_string(),
                to: to.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    /// Process `input` starting from the context's current stage.
    pub async fn process_turn(
        &self,
        mut context: ConversationContext,
        input: &str,
        model: &Arc<dyn Provider>,
    ) -> Result<StageRunResult, StageError> {
        let span = info_span!(
            "stage_turn",
            conversation_id = %context.id(),
            stage = %context.stage()
        );
        async move {
            context.record(ChatRole::User, input);
            let starting_position = context.stage().position();

            loop {
                let id = context.stage();
                let stage = self.stage(id)?;
                let turns = context.bump_turns(id);
                debug!(stage = %id, turns, "Processing stage");

                let result = stage.process(&context, input, model).await?;

                if let Some(findings) = result.partial_findings.clone() {
                    context.merge_findings(id, findings);
                }
                context.set_pending_questions(result.pending_questions.clone());
                context.record(ChatRole::Assistant, &result.message);

                if let Some(artifact) = result.terminal_artifact.clone() {
                    let (from, to) = context.complete_with(artifact.clone())?;
                    self.publish_transition(&context, from, to);
                    return Ok(self.finish(context, result.message, starting_position, Some(artifact)));
                }

                let mut advanced_into = None;
                if stage.can_advance(&result) {
                    if let Some((from, to)) = context.advance() {
                        self.publish_transition(&context, from, to);
                        advanced_into = Some(to);
                    }
                }

                match advanced_into {
                    Some(next) if self.cascade && !next.is_terminal() => continue,
                    _ => return Ok(self.finish(context, result.message, starting_position, None)),
                }
            }
        }
        .instrument(span)
        .await
    }

    fn finish(
        &self,
        context: ConversationContext,
        message: String,
        starting_position: usize,
        terminal_artifact: Option<serde_json::Value>,
    ) -> StageRunResult {
        StageRunResult {
            message,
            advance: context.stage().position() > starting_position,
            pending_questions: context.pending_questions().to_vec(),
            context: Some(context),
            terminal_artifact,
        }
    }
}

#[async_trait]
impl StageRunner for StageMachine {
    async fn run(
        &self,
        stage: StageId,
        input: &str,
        context: ConversationContext,
        model: Arc<dyn Provider>,
    ) -> Result<StageRunResult, StageError> {
        if stage != context.stage() {
            return Err(StageError::Internal(format!(
                "requested stage '{stage}' but the conversation is at '{}'",
                context.stage()
            )));
        }
        self.process_turn(context, input, &model).await
    }
}
