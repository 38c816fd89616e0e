//! Built-in stages of the design conversation.

pub mod complete;
pub mod design;
pub mod discovery;
pub mod requirements;

use std::sync::Arc;
use waypoint_agent::{ExecutionPolicy, ModelParams};
use waypoint_config::AgentSettings;
use waypoint_core::capability::CapabilityRegistry;

pub use complete::CompleteStage;
pub use design::{DesignDocument, DesignStage};
pub use discovery::{DiscoveryFindings, DiscoveryStage};
pub use requirements::{RequirementsFindings, RequirementsStage};

use crate::pipeline::PipelineSettings;
use crate::stage::Stage;

/// One instance of every built-in stage.
///
/// Every model request uses the model and sampling from `agent`.
/// `capabilities` are offered to the design stage's agent run, whose
/// capability calls go through a pipeline built from `policy`. The design
/// run's budget falls back to `agent.max_iterations`.
pub fn default_stages(
    settings: &PipelineSettings,
    agent: &AgentSettings,
    policy: ExecutionPolicy,
    capabilities: Arc<CapabilityRegistry>,
) -> Vec<Arc<dyn Stage>> {
    let params = ModelParams::from(agent);
    let design_budget = settings
        .design_max_iterations
        .unwrap_or(agent.max_iterations);
    vec![
        Arc::new(
            DiscoveryStage::new(settings.heuristics.clone()).with_params(params.clone()),
        ),
        Arc::new(
            RequirementsStage::new(settings.heuristics.clone()).with_params(params.clone()),
        ),
        Arc::new(
            DesignStage::new(capabilities)
                .with_params(params)
                .with_policy(policy)
                .with_max_iterations(design_budget),
        ),
        Arc::new(CompleteStage),
    ]
}

/// Render a bullet list, one item per line.
pub(crate) fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}
