//! The staged pipeline: the caller-facing entry point for staged
//! conversations.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use waypoint_agent::{ExecutionPolicy, ModelParams, SubagentDefinition};
use waypoint_config::{EngineConfig, PipelineConfig};
use waypoint_core::capability::CapabilityRegistry;
use waypoint_core::error::{Error, StageError};
use waypoint_core::event::EventBus;
use waypoint_core::provider::Provider;

use crate::chain::{RETRY_MESSAGE, RequestHandler, StageRequest, build_chain};
use crate::context::ConversationContext;
use crate::heuristics::AdvanceHeuristics;
use crate::machine::StageMachine;
use crate::stage::Stage;
use crate::stages::default_stages;

/// Tuning for the staged pipeline and its built-in stages.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub cascade: bool,
    pub heuristics: AdvanceHeuristics,
    /// Falls back to the agent iteration budget when unset
    pub design_max_iterations: Option<u32>,
}

impl From<&PipelineConfig> for PipelineSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            cascade: config.cascade,
            heuristics: AdvanceHeuristics::from(config),
            design_max_iterations: config.design_max_iterations,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

/// What the caller gets back from one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub message: String,
    /// Pass this back in with the next turn
    pub context: ConversationContext,
    pub pending_questions: Vec<String>,
    /// The design document, once the conversation is complete
    pub terminal_artifact: Option<serde_json::Value>,
    /// Whether the conversation moved to a later stage
    pub advanced: bool,
}

pub struct StagedPipeline {
    chain: Arc<dyn RequestHandler>,
    model: Arc<dyn Provider>,
}

impl StagedPipeline {
    /// A pipeline over caller-supplied stages.
    pub fn new(
        model: Arc<dyn Provider>,
        stages: Vec<Arc<dyn Stage>>,
        cascade: bool,
        event_bus: Option<Arc<EventBus>>,
    ) -> Result<Self, StageError> {
        let mut machine = StageMachine::new(stages)?.with_cascade(cascade);
        if let Some(bus) = &event_bus {
            machine = machine.with_event_bus(bus.clone());
        }
        Ok(Self {
            chain: build_chain(Arc::new(machine), event_bus),
            model,
        })
    }

    /// A pipeline over the built-in stages, configured from `config`.
    ///
    /// Every `[[subagents]]` entry is resolved against `capabilities` and
    /// offered to the design stage next to them. Subagents inherit the
    /// engine's model settings and execution policy.
    pub fn from_config(
        config: &EngineConfig,
        model: Arc<dyn Provider>,
        capabilities: Arc<CapabilityRegistry>,
        event_bus: Option<Arc<EventBus>>,
    ) -> Result<Self, Error> {
        config.validate().map_err(|e| Error::Config {
            message: e.to_string(),
        })?;

        let settings = PipelineSettings::from(&config.pipeline);
        let policy = ExecutionPolicy::from(&config.execution);
        let params = ModelParams::from(&config.agent);

        let capabilities = if config.subagents.is_empty() {
            capabilities
        } else {
            let mut registry = capabilities.as_ref().clone();
            for sub in &config.subagents {
                let definition =
                    SubagentDefinition::from_config(sub, &capabilities, policy.clone())?;
                registry.register(definition.to_capability(model.clone(), &params))?;
                info!(subagent = %sub.name, "Registered subagent for the design stage");
            }
            Arc::new(registry)
        };

        let stages = default_stages(&settings, &config.agent, policy, capabilities);
        Ok(Self::new(model, stages, settings.cascade, event_bus)?)
    }

    /// Process one user message. `None` starts a new conversation.
    ///
    /// Never fails: malformed input and stage failures come back as a
    /// message with the conversation left where it was.
    pub async fn process_turn(
        &self,
        message: &str,
        context: Option<ConversationContext>,
    ) -> TurnOutcome {
        let context = context.unwrap_or_else(|| {
            let fresh = ConversationContext::new();
            info!(conversation_id = %fresh.id(), "Starting new conversation");
            fresh
        });
        let snapshot = context.clone();
        let request = StageRequest::for_context(message, context, self.model.clone());

        let result = match self.chain.handle(request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Request chain returned an error");
                return TurnOutcome {
                    message: RETRY_MESSAGE.to_string(),
                    pending_questions: snapshot.pending_questions().to_vec(),
                    context: snapshot,
                    terminal_artifact: None,
                    advanced: false,
                };
            }
        };

        TurnOutcome {
            message: result.message,
            context: result.context.unwrap_or(snapshot),
            pending_questions: result.pending_questions,
            terminal_artifact: result.terminal_artifact,
            advanced: result.advance,
        }
    }
}
