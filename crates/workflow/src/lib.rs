//! Staged conversations: discovery, requirements, design, complete.
//!
//! A conversation moves forward through a fixed sequence of stages. Each
//! caller turn goes through a short request chain (validation, error
//! recovery) into the [`StageMachine`], which runs the current stage and,
//! when the stage is done, moves the [`ConversationContext`] on. The design
//! stage drives a full agent run and produces the terminal artifact.
//!
//! ```text
//! process_turn ─▶ ValidationHandler ─▶ ErrorRecoveryHandler ─▶ RunStageHandler
//!                                                                    │
//!                                         StageMachine ◀─────────────┘
//!                                   discovery → requirements → design → complete
//! ```

pub mod chain;
pub mod context;
pub mod heuristics;
pub mod machine;
pub mod pipeline;
pub mod prompt;
pub mod stage;
pub mod stages;
pub mod structured;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use chain::{
    ErrorRecoveryHandler, RETRY_MESSAGE, RequestHandler, RunStageHandler, StageRequest,
    ValidationHandler, build_chain,
};
pub use context::{ChatEntry, ChatRole, ConversationContext};
pub use heuristics::AdvanceHeuristics;
pub use machine::{StageMachine, StageRunResult, StageRunner};
pub use pipeline::{PipelineSettings, StagedPipeline, TurnOutcome};
pub use prompt::StagePrompt;
pub use stage::{Stage, StageId, StageResult};
pub use stages::{
    CompleteStage, DesignDocument, DesignStage, DiscoveryFindings, DiscoveryStage,
    RequirementsFindings, RequirementsStage, default_stages,
};
pub use structured::{extract_json, request_structured};
