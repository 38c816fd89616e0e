//! Requirements: turn the discovered idea into concrete requirements.

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
Gather the requirements for the idea described under 'Known so far'. List \
functional requirements, non-functional requirements (performance, \
security, availability) and constraints. List anything you still need the \
user to decide. Set `complete` to true once the requirements are enough to \
produce a design.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementsFindings {
    #[serde(default)]
    pub functional: Vec<String>,
    #[serde(default)]
    pub non_functional: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
    #[serde(default)]
    pub complete: bool,
}

impl RequirementsFindings {
    pub fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "functional": {"type": "array", "items": {"type": "string"}},
                "non_functional": {"type": "array", "items": {"type": "string"}},
                "constraints": {"type": "array", "items": {"type": "string"}},
                "open_questions": {"type": "array", "items": {"type": "string"}},
                "complete": {"type": "boolean"}
            },
            "required": ["functional", "complete"]
        })
    }
}

pub struct RequirementsStage {
    heuristics: AdvanceHeuristics,
    params: ModelParams,
}

impl RequirementsStage {
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
impl Stage for RequirementsStage {
    fn id(&self) -> StageId {
        StageId::Requirements
    }

    async fn process(
        &self,
        context: &ConversationContext,
        input: &str,
        model: &Arc<dyn Provider>,
    ) -> Result<StageResult, StageError> {
        let schema = RequirementsFindings::schema();
        let system = StagePrompt::for_stage(StageId::Requirements, context)
            .with_instructions(INSTRUCTIONS)
            .with_output_schema(schema.clone())
            .render();
        let request = self
            .params
            .request(vec![Message::system(system), Message::user(input)]);

        let findings: RequirementsFindings =
            request_structured(model.as_ref(), request, &schema).await?;

        // Without a single functional requirement there is nothing to design.
        let has_substance = !findings.functional.is_empty();
        let turns = context.turns(StageId::Requirements);
        let forced = has_substance
            && !findings.complete
            && self.heuristics.should_force_advance(input, turns);
        let advance = (findings.complete && has_substance) || forced;
        debug!(
            complete = findings.complete,
            functional = findings.functional.len(),
            forced,
            turns,
            "Requirements judged"
        );

        let message = if advance {
            format!(
                "Requirements captured:\n{}\n\nI'll draft the design next.",
                bullets(&findings.functional)
            )
        } else if findings.open_questions.is_empty() {
            "What should the system do? Describe the main features you need.".to_string()
        } else {
            format!(
                "A few things to settle first:\n{}",
                bullets(&findings.open_questions)
            )
        };
        let pending = if advance {
            Vec::new()
        } else {
            findings.open_questions.clone()
        };

        let partial = json!({
            "functional": findings.functional,
            "non_functional": findings.non_functional,
            "constraints": findings.constraints,
            "open_questions": findings.open_questions,
        });

        Ok(StageResult::reply(message)
            .advancing(advance)
            .with_findings(partial)
            .with_questions(pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::StructuredModel;

    fn stage() -> RequirementsStage {
        RequirementsStage::new(AdvanceHeuristics::new(["go ahead"], 2))
    }

    fn context_with_turns(turns: u32) -> ConversationContext {
        let mut ctx = ConversationContext::starting_at(StageId::Requirements);
        for _ in 0..turns {
            ctx.bump_turns(StageId::Requirements);
        }
        ctx
    }

    #[tokio::test]
    async fn complete_requirements_advance() {
        let model: Arc<dyn Provider> = Arc::new(StructuredModel::new(vec![json!({
            "functional": ["create tasks", "assign tasks"],
            "non_functional": ["p95 < 200ms"],
            "complete": true
        })]));
        let result = stage()
            .process(&context_with_turns(1), "that's it", &model)
            .await
            .unwrap();
        assert!(result.advance);
        assert!(result.message.contains("- assign tasks"));
        assert_eq!(
            result.partial_findings.unwrap()["non_functional"],
            json!(["p95 < 200ms"])
        );
    }

    #[tokio::test]
    async fn complete_flag_without_features_does_not_advance() {
        let model: Arc<dyn Provider> = Arc::new(StructuredModel::new(vec![json!({
            "functional": [],
            "complete": true
        })]));
        let result = stage()
            .process(&context_with_turns(5), "go ahead", &model)
            .await
            .unwrap();
        assert!(!result.advance);
        assert!(result.message.contains("main features"));
    }

    #[tokio::test]
    async fn confirmation_forces_advance_after_floor() {
        let model: Arc<dyn Provider> = Arc::new(StructuredModel::new(vec![json!({
            "functional": ["create tasks"],
            "open_questions": ["SSO?"],
            "complete": false
        })]));
        let result = stage()
            .process(&context_with_turns(2), "Go ahead.", &model)
            .await
            .unwrap();
        assert!(result.advance);
        assert!(result.pending_questions.is_empty());
    }

    #[tokio::test]
    async fn open_questions_surface() {
        let model: Arc<dyn Provider> = Arc::new(StructuredModel::new(vec![json!({
            "functional": ["create tasks"],
            "open_questions": ["SSO?"],
            "complete": false
        })]));
        let result = stage()
            .process(&context_with_turns(1), "Go ahead.", &model)
            .await
            .unwrap();
        assert!(!result.advance);
        assert_eq!(result.pending_questions, vec!["SSO?".to_string()]);
    }
}
