//! Request-handling chain in front of the stage machine.
//!
//! ```text
//! ValidationHandler ─▶ ErrorRecoveryHandler ─▶ RunStageHandler ─▶ StageRunner
//! ```
//!
//! Validation rejects malformed requests before anything runs. Error
//! recovery turns a failing or panicking stage into a non-advancing
//! "please retry" result with the caller's context untouched. The last
//! handler calls whatever [`StageRunner`] it was given.

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, warn};
use waypoint_core::error::StageError;
use waypoint_core::event::{DomainEvent, EventBus};
use waypoint_core::provider::Provider;

use crate::context::ConversationContext;
use crate::machine::{StageRunResult, StageRunner};
use crate::stage::StageId;

/// Shown to the user when a stage fails mid-turn.
pub const RETRY_MESSAGE: &str =
    "Something went wrong while processing your message. Please try again.";

/// One turn, as received from the caller.
#[derive(Clone, Default)]
pub struct StageRequest {
    /// Name of the stage to run; must match the context's current stage
    pub stage: String,
    pub user_message: Option<String>,
    pub context: Option<ConversationContext>,
    pub model: Option<Arc<dyn Provider>>,
}

impl StageRequest {
    /// A complete request for the context's current stage.
    pub fn for_context(
        user_message: impl Into<String>,
        context: ConversationContext,
        model: Arc<dyn Provider>,
    ) -> Self {
        Self {
            stage: context.stage().name().to_string(),
            user_message: Some(user_message.into()),
            context: Some(context),
            model: Some(model),
        }
    }
}

impl std::fmt::Debug for StageRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRequest")
            .field("stage", &self.stage)
            .field("user_message", &self.user_message)
            .field("context", &self.context.as_ref().map(|c| c.id().to_string()))
            .field("model", &self.model.as_ref().map(|m| m.name().to_string()))
            .finish()
    }
}

#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: StageRequest) -> Result<StageRunResult, StageError>;
}

// ── Validation ───────────────────────────────────────────────────────────

pub struct ValidationHandler {
    next: Arc<dyn RequestHandler>,
}

impl ValidationHandler {
    pub fn new(next: Arc<dyn RequestHandler>) -> Self {
        Self { next }
    }

    fn check(request: &StageRequest) -> Result<(), String> {
        let Some(context) = &request.context else {
            return Err("Missing conversation context.".into());
        };
        if request.model.is_none() {
            return Err("No model configured for this conversation.".into());
        }
        match &request.user_message {
            None => return Err("A text message is required.".into()),
            Some(message) if message.trim().is_empty() => {
                return Err("The message is empty. Please type something.".into());
            }
            Some(_) => {}
        }
        let stage: StageId = request.stage.parse()?;
        if stage != context.stage() {
            return Err(format!(
                "Stage '{stage}' does not match the conversation's current stage '{}'.",
                context.stage()
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RequestHandler for ValidationHandler {
    async fn handle(&self, request: StageRequest) -> Result<StageRunResult, StageError> {
        if let Err(reason) = Self::check(&request) {
            warn!(stage = %request.stage, %reason, "Rejected stage request");
            return Ok(StageRunResult::unchanged(reason, request.context));
        }
        self.next.handle(request).await
    }
}

// ── Error recovery ───────────────────────────────────────────────────────

pub struct ErrorRecoveryHandler {
    next: Arc<dyn RequestHandler>,
    event_bus: Option<Arc<EventBus>>,
}

impl ErrorRecoveryHandler {
    pub fn new(next: Arc<dyn RequestHandler>) -> Self {
        Self {
            next,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    fn recover(
        &self,
        snapshot: Option<ConversationContext>,
        stage: &str,
        reason: String,
    ) -> StageRunResult {
        error!(stage, error = %reason, "Stage failed, asking the user to retry");
        if let (Some(bus), Some(context)) = (&self.event_bus, &snapshot) {
            bus.publish(DomainEvent::TurnFailed {
                conversation_id: context.id().to_string(),
                stage: stage.to_string(),
                error_message: reason,
                timestamp: Utc::now(),
            });
        }
        StageRunResult::unchanged(RETRY_MESSAGE, snapshot)
    }
}

#[async_trait]
impl RequestHandler for ErrorRecoveryHandler {
    async fn handle(&self, request: StageRequest) -> Result<StageRunResult, StageError> {
        let snapshot = request.context.clone();
        let stage = request.stage.clone();

        match AssertUnwindSafe(self.next.handle(request))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Ok(self.recover(snapshot, &stage, e.to_string())),
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "stage panicked".to_string());
                Ok(self.recover(snapshot, &stage, reason))
            }
        }
    }
}

// ── Run stage ────────────────────────────────────────────────────────────

pub struct RunStageHandler {
    runner: Arc<dyn StageRunner>,
}

impl RunStageHandler {
    pub fn new(runner: Arc<dyn StageRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl RequestHandler for RunStageHandler {
    async fn handle(&self, request: StageRequest) -> Result<StageRunResult, StageError> {
        let (Some(message), Some(context), Some(model)) =
            (request.user_message, request.context, request.model)
        else {
            return Err(StageError::Internal(
                "stage request reached the runner unvalidated".into(),
            ));
        };
        let stage: StageId = request.stage.parse().map_err(StageError::Internal)?;
        self.runner.run(stage, &message, context, model).await
    }
}

/// Assemble the standard validation → error recovery → run stage chain.
pub fn build_chain(
    runner: Arc<dyn StageRunner>,
    event_bus: Option<Arc<EventBus>>,
) -> Arc<dyn RequestHandler> {
    let run: Arc<dyn RequestHandler> = Arc::new(RunStageHandler::new(runner));
    let mut recovery = ErrorRecoveryHandler::new(run);
    if let Some(bus) = event_bus {
        recovery = recovery.with_event_bus(bus);
    }
    Arc::new(ValidationHandler::new(Arc::new(recovery)))
}
