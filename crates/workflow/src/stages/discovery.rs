//! Discovery: understand what the user wants to build.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use waypoint_core::error::StageError;
use waypoint_core::message::Message;
use waypoint_agent::ModelParams;
use waypoint_core::provider::Provider;

use super::bullets;
use crate::context::ConversationContext;
use crate::heuristics::AdvanceHeuristics;
use crate::prompt::StagePrompt;
use crate::stage::{Stage, StageId, StageResult};
use crate::structured::request_structured;

const INSTRUCTIONS: &str = "\
Work out what the user wants to build. Summarize the idea in one or two \
sentences, list the goals and the intended users, and list any questions \
whose answers you would need before gathering requirements. Set \
`sufficient` to true once the idea is clear enough to start on requirements.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryFindings {
    pub summary: String,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub target_users: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
    #[serde(default)]
    pub sufficient: bool,
}

impl DiscoveryFindings {
    pub fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string"},
                "goals": {"type": "array", "items": {"type": "string"}},
                "target_users": {"type": "array", "items": {"type": "string"}},
                "open_questions": {"type": "array", "items": {"type": "string"}},
                "sufficient": {"type": "boolean"}
            },
            "required": ["summary", "sufficient"]
        })
    }
}

pub struct DiscoveryStage {
    heuristics: AdvanceHeuristics,
    params: ModelParams,
}

impl DiscoveryStage {
    pub fn new(heuristics: AdvanceHeuristics) -> Self {
        Self {
            heuristics,
            params: ModelParams::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.params.model = model.into();
        self
    }

    /// Model name and sampling settings for this stage's requests.
    pub fn with_params(mut self, params: ModelParams) -> Self {
        self.params = params;
        self
    }
}

#[async_trait]
impl Stage for DiscoveryStage {
    fn id(&self) -> StageId {
        StageId::Discovery
    }

    async fn process(
        &self,
        context: &ConversationContext,
        input: &str,
        model: &Arc<dyn Provider>,
    ) -> Result<StageResult, StageError> {
        let schema = DiscoveryFindings::schema();
        let system = StagePrompt::for_stage(StageId::Discovery, context)
            .with_instructions(INSTRUCTIONS)
            .with_output_schema(schema.clone())
            .render();
        let request = self
            .params
            .request(vec![Message::system(system), Message::user(input)]);

        let findings: DiscoveryFindings =
            request_structured(model.as_ref(), request, &schema).await?;

        let turns = context.turns(StageId::Discovery);
        let forced = !findings.sufficient && self.heuristics.should_force_advance(input, turns);
        let advance = findings.sufficient || forced;
        debug!(
            sufficient = findings.sufficient,
            forced, turns, "Discovery judged the idea"
        );

        let message = if advance {
            format!(
                "Here is what I understand: {}\n\nLet's pin down the requirements.",
                findings.summary
            )
        } else if findings.open_questions.is_empty() {
            format!(
                "{}\n\nCan you tell me more about what you have in mind?",
                findings.summary
            )
        } else {
            format!(
                "{}\n\nBefore we go further:\n{}",
                findings.summary,
                bullets(&findings.open_questions)
            )
        };
        let pending = if advance {
            Vec::new()
        } else {
            findings.open_questions.clone()
        };

        let partial = json!({
            "summary": findings.summary,
            "goals": findings.goals,
            "target_users": findings.target_users,
            "open_questions": findings.open_questions,
        });

        Ok(StageResult::reply(message)
            .advancing(advance)
            .with_findings(partial)
            .with_questions(pending))
    }
}
