//! Design: an agent run that turns findings into a design document.
//!
//! Unlike the other stages this one drives a full [`AgentLoop`], so the
//! model can call capabilities (including subagents) while drafting. The
//! final answer must be a JSON design document, which becomes the
//! conversation's terminal artifact.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use waypoint_agent::{AgentLoop, ExecutionPolicy, ModelParams};
use waypoint_core::capability::CapabilityRegistry;
use waypoint_core::error::StageError;
use waypoint_core::provider::Provider;

use super::bullets;
use crate::context::ConversationContext;
use crate::prompt::StagePrompt;
use crate::stage::{Stage, StageId, StageResult};
use crate::structured::extract_json;

const DEFAULT_MAX_ITERATIONS: u32 = 6;

const INSTRUCTIONS: &str = "\
Produce a software design for the idea and requirements under 'Known so \
far'. Use the available capabilities if they help. When you are done, \
answer with the design document only.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignComponent {
    pub name: String,
    pub responsibility: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataEntity {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// The deliverable of a staged conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignDocument {
    pub title: String,
    pub overview: String,
    #[serde(default)]
    pub components: Vec<DesignComponent>,
    #[serde(default)]
    pub data_model: Vec<DataEntity>,
    #[serde(default)]
    pub risks: Vec<String>,
}

impl DesignDocument {
    pub fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "overview": {"type": "string"},
                "components": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "responsibility": {"type": "string"}
                        },
                        "required": ["name", "responsibility"]
                    }
                },
                "data_model": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "fields": {"type": "array", "items": {"type": "string"}}
                        },
                        "required": ["name"]
                    }
                },
                "risks": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["title", "overview", "components"]
        })
    }

    /// Parse the document out of an agent's final answer.
    pub fn from_answer(answer: &str) -> Result<Self, StageError> {
        let value = extract_json(answer).ok_or_else(|| {
            StageError::InvalidOutput("design answer contained no JSON object".into())
        })?;
        serde_json::from_value(value).map_err(|e| StageError::InvalidOutput(e.to_string()))
    }

    fn summary_message(&self) -> String {
        let mut message = format!("# {}\n\n{}", self.title, self.overview);
        if !self.components.is_empty() {
            let components: Vec<String> = self
                .components
                .iter()
                .map(|c| format!("{}: {}", c.name, c.responsibility))
                .collect();
            message.push_str(&format!("\n\nComponents:\n{}", bullets(&components)));
        }
        if !self.risks.is_empty() {
            message.push_str(&format!("\n\nRisks:\n{}", bullets(&self.risks)));
        }
        message
    }
}

pub struct DesignStage {
    capabilities: Arc<CapabilityRegistry>,
    policy: ExecutionPolicy,
    max_iterations: u32,
    params: ModelParams,
}

impl DesignStage {
    pub fn new(capabilities: Arc<CapabilityRegistry>) -> Self {
        Self {
            capabilities,
            policy: ExecutionPolicy::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            params: ModelParams::default(),
        }
    }

    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.params.model = model.into();
        self
    }

    /// Model name and sampling settings for the drafting agent.
    pub fn with_params(mut self, params: ModelParams) -> Self {
        self.params = params;
        self
    }
}

#[async_trait]
impl Stage for DesignStage {
    fn id(&self) -> StageId {
        StageId::Design
    }

    async fn process(
        &self,
        context: &ConversationContext,
        input: &str,
        model: &Arc<dyn Provider>,
    ) -> Result<StageResult, StageError> {
        let system = StagePrompt::for_stage(StageId::Design, context)
            .with_instructions(INSTRUCTIONS)
            .with_output_schema(DesignDocument::schema())
            .render();

        let agent = AgentLoop::new(model.clone(), self.capabilities.clone())
            .with_params(self.params.clone())
            .with_system_prompt(system)
            .with_max_iterations(self.max_iterations)
            .with_executor(self.policy.build_pipeline());
        let result = agent.run(input).await?;

        let document = DesignDocument::from_answer(&result.output)?;
        info!(
            title = %document.title,
            iterations = result.iterations(),
            capability_calls = result.capability_calls_made(),
            "Design drafted"
        );

        let artifact =
            serde_json::to_value(&document).map_err(|e| StageError::Internal(e.to_string()))?;
        Ok(StageResult::reply(document.summary_message())
            .advancing(true)
            .with_findings(json!({
                "title": document.title,
                "iterations": result.iterations(),
                "capability_calls": result.capability_calls_made(),
            }))
            .with_artifact(artifact))
    }
}
