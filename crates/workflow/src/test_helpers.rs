//! Shared test helpers for workflow-crate tests.

use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use waypoint_core::error::{ProviderError, StageError};
use waypoint_core::message::Message;
use waypoint_core::provider::{
    Provider, ProviderRequest, ProviderResponse, StructuredResponse, Usage,
};

use crate::context::ConversationContext;
use crate::stage::{Stage, StageId, StageResult};

/// A text-only model answering from a script. Panics when the script runs out.
pub struct ScriptedModel {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedModel {
    pub fn new(texts: Vec<String>) -> Self {
        Self::with_responses(
            texts
                .into_iter()
                .map(|text| ProviderResponse {
                    message: Message::assistant(text),
                    usage: Some(Usage::new(10, 5)),
                    model: "mock-model".into(),
                })
                .collect(),
        )
    }

    pub fn with_responses(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedModel {
    fn name(&self) -> &str {
        "scripted_model"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let index = requests.len();
        if index >= responses.len() {
            panic!(
                "ScriptedModel: no more responses (call #{}, have {})",
                index,
                responses.len()
            );
        }
        requests.push(request);
        Ok(responses[index].clone())
    }
}

/// A model with native structured output, answering from a script.
pub struct StructuredModel {
    data: Mutex<Vec<serde_json::Value>>,
}

impl StructuredModel {
    pub fn new(data: Vec<serde_json::Value>) -> Self {
        Self {
            data: Mutex::new(data),
        }
    }
}

#[async_trait]
impl Provider for StructuredModel {
    fn name(&self) -> &str {
        "structured_model"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::InvalidResponse(
            "StructuredModel only answers structured requests".into(),
        ))
    }

    async fn complete_structured(
        &self,
        _request: ProviderRequest,
        _schema: &serde_json::Value,
    ) -> Result<StructuredResponse, ProviderError> {
        let mut data = self.data.lock().unwrap();
        if data.is_empty() {
            panic!("StructuredModel: no more responses");
        }
        Ok(StructuredResponse {
            data: data.remove(0),
            usage: None,
        })
    }
}

/// A stage that replays scripted results and records what it was given.
/// Once the script is exhausted it keeps repeating the last result.
pub struct FixedStage {
    id: StageId,
    results: Vec<StageResult>,
    inputs: Mutex<Vec<String>>,
    turns: Mutex<Vec<u32>>,
}

impl FixedStage {
    pub fn new(id: StageId, results: Vec<StageResult>) -> Self {
        Self {
            id,
            results,
            inputs: Mutex::new(Vec::new()),
            turns: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }

    /// The stage's turn counter as seen on each call.
    pub fn seen_turns(&self) -> Vec<u32> {
        self.turns.lock().unwrap().clone()
    }
}

#[async_trait]
impl Stage for FixedStage {
    fn id(&self) -> StageId {
        self.id
    }

    async fn process(
        &self,
        context: &ConversationContext,
        input: &str,
        _model: &Arc<dyn Provider>,
    ) -> Result<StageResult, StageError> {
        let mut inputs = self.inputs.lock().unwrap();
        let index = inputs.len();
        inputs.push(input.to_string());
        self.turns.lock().unwrap().push(context.turns(self.id));

        let result = self
            .results
            .get(index)
            .or_else(|| self.results.last())
            .cloned()
            .unwrap_or_else(|| StageResult::reply(format!("{} (unscripted)", self.id)));
        Ok(result)
    }
}

/// How a [`BrokenStage`] misbehaves.
pub enum Breakage {
    Error,
    Panic,
}

/// A stage that fails with "boom".
pub struct BrokenStage {
    pub id: StageId,
    pub breakage: Breakage,
}

#[async_trait]
impl Stage for BrokenStage {
    fn id(&self) -> StageId {
        self.id
    }

    async fn process(
        &self,
        _context: &ConversationContext,
        _input: &str,
        _model: &Arc<dyn Provider>,
    ) -> Result<StageResult, StageError> {
        match self.breakage {
            Breakage::Error => Err(StageError::Internal("boom".into())),
            Breakage::Panic => panic!("boom"),
        }
    }
}

/// A design document answer for the design stage.
pub fn design_answer() -> String {
    json!({
        "title": "Task Tracker",
        "overview": "A small web app for tracking team tasks.",
        "components": [
            {"name": "api", "responsibility": "Serves task CRUD"},
            {"name": "web", "responsibility": "Renders the board"}
        ],
        "data_model": [{"name": "Task", "fields": ["id", "title", "status"]}],
        "risks": ["Scope creep"]
    })
    .to_string()
}
