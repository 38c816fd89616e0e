//! Subagents: a configured agent loop exposed as a single capability.
//!
//! An outer agent calls the subagent like any other capability with
//! `{"input": "..."}`. Every invocation builds a fresh [`AgentLoop`] with a
//! fresh execution pipeline, so nothing (transcript, steps, memo cache)
//! carries over between calls. When the inner loop fails, the failure comes
//! back as a [`CapabilityError::SubagentFailed`], which the outer loop feeds
//! to its model as an error result.
//!
//! Nesting depth is only bounded by each loop's own iteration budget.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{Instrument, info, info_span, warn};
use waypoint_config::SubagentConfig;
use waypoint_core::capability::{Capability, CapabilityRegistry};
use waypoint_core::error::CapabilityError;
use waypoint_core::provider::Provider;

use crate::execution::ExecutionPolicy;
use crate::loop_runner::{AgentLoop, DEFAULT_MAX_ITERATIONS, ModelParams};

/// The fields needed to define a subagent.
pub struct SubagentSpec {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub capabilities: CapabilityRegistry,
    pub max_iterations: u32,
}

/// Build a [`SubagentDefinition`] with its own registry and budget.
pub fn define_subagent(spec: SubagentSpec) -> SubagentDefinition {
    SubagentDefinition {
        name: spec.name,
        description: spec.description,
        system_prompt: spec.system_prompt,
        capabilities: Arc::new(spec.capabilities),
        max_iterations: spec.max_iterations.max(1),
        model: None,
        params: None,
        policy: ExecutionPolicy::default(),
    }
}

/// A fully configured inner agent, ready to be turned into a capability.
#[derive(Clone)]
pub struct SubagentDefinition {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub capabilities: Arc<CapabilityRegistry>,
    pub max_iterations: u32,
    /// Overrides the parent's provider when set
    pub model: Option<Arc<dyn Provider>>,
    /// Overrides the parent's model name and sampling when set
    pub params: Option<ModelParams>,
    /// Pipeline recipe for the inner loop's capability calls
    pub policy: ExecutionPolicy,
}

impl SubagentDefinition {
    pub fn with_model(mut self, model: Arc<dyn Provider>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_params(mut self, params: ModelParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build a definition from configuration, picking its capabilities out
    /// of `parent` by name. Inner capability calls go through `policy`,
    /// normally the engine's own `[execution]` settings.
    pub fn from_config(
        config: &SubagentConfig,
        parent: &CapabilityRegistry,
        policy: ExecutionPolicy,
    ) -> Result<Self, CapabilityError> {
        let mut capabilities = CapabilityRegistry::new();
        for name in &config.capabilities {
            let capability = parent
                .get(name)
                .ok_or_else(|| CapabilityError::NotFound(name.clone()))?;
            capabilities.register(capability)?;
        }

        Ok(define_subagent(SubagentSpec {
            name: config.name.clone(),
            description: config.description.clone(),
            system_prompt: config.system_prompt.clone(),
            capabilities,
            max_iterations: config.max_iterations,
        })
        .with_policy(policy))
    }

    /// Expose this subagent as a capability. Unless the definition carries
    /// its own provider and params, inner loops use `parent_model` with
    /// `parent_params`.
    pub fn to_capability(
        &self,
        parent_model: Arc<dyn Provider>,
        parent_params: &ModelParams,
    ) -> Arc<dyn Capability> {
        Arc::new(SubagentCapability {
            provider: self.model.clone().unwrap_or(parent_model),
            params: self
                .params
                .clone()
                .unwrap_or_else(|| parent_params.clone()),
            definition: self.clone(),
        })
    }
}

impl std::fmt::Debug for SubagentDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubagentDefinition")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities.names())
            .field("max_iterations", &self.max_iterations)
            .field("params", &self.params)
            .field("policy", &self.policy)
            .finish()
    }
}

/// A capability backed by a fresh agent loop per call.
pub struct SubagentCapability {
    definition: SubagentDefinition,
    provider: Arc<dyn Provider>,
    params: ModelParams,
}

#[async_trait]
impl Capability for SubagentCapability {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn description(&self) -> &str {
        &self.definition.description
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "The task or question for this subagent"
                }
            },
            "required": ["input"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> Result<serde_json::Value, CapabilityError> {
        let task = input
            .get("input")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CapabilityError::InvalidInput {
                capability: self.definition.name.clone(),
                reason: "'input' must be a string".into(),
            })?;

        let agent = AgentLoop::new(self.provider.clone(), self.definition.capabilities.clone())
            .with_params(self.params.clone())
            .with_system_prompt(&self.definition.system_prompt)
            .with_max_iterations(self.definition.max_iterations)
            .with_executor(self.definition.policy.build_pipeline());

        let span = info_span!("subagent", name = %self.definition.name);
        match agent.run(task).instrument(span).await {
            Ok(result) => {
                info!(
                    subagent = %self.definition.name,
                    iterations = result.iterations(),
                    "Subagent finished"
                );
                Ok(json!({
                    "output": result.output,
                    "iterations": result.iterations(),
                }))
            }
            Err(e) => {
                warn!(subagent = %self.definition.name, error = %e, "Subagent failed");
                Err(CapabilityError::SubagentFailed {
                    subagent: self.definition.name.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

impl Default for SubagentSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            system_prompt: String::new(),
            capabilities: CapabilityRegistry::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}
