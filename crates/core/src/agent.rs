//! Agent run records: the per-iteration [`Step`] log and the terminal
//! [`AgentResult`].

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityResult;
use crate::message::{CapabilityCall, Message};
use crate::provider::Usage;

/// One full loop iteration. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Zero-based iteration index
    pub iteration: u32,

    /// Text the model produced this iteration, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Calls the model emitted, in emission order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capability_calls: Vec<CapabilityCall>,

    /// Results, in the same order as `capability_calls`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capability_results: Vec<CapabilityResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Step {
    /// Whether this step ended the run (no capability calls).
    pub fn is_final(&self) -> bool {
        self.capability_calls.is_empty()
    }
}

/// The terminal value of a successful agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    /// The final answer text
    pub output: String,

    /// Ordered audit trail of every iteration
    pub steps: Vec<Step>,

    /// Sum of the usage reported across all steps
    pub total_usage: Usage,

    /// The full transcript, system prompt included
    pub messages: Vec<Message>,
}

impl AgentResult {
    pub fn iterations(&self) -> usize {
        self.steps.len()
    }

    /// Total number of capability calls across all steps.
    pub fn capability_calls_made(&self) -> usize {
        self.steps.iter().map(|s| s.capability_calls.len()).sum()
    }
}
