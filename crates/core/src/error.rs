//! Error types for the Waypoint domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them for callers that do not care which layer failed.

use thiserror::Error;

/// The top-level error type for all Waypoint operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Capability errors ---
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    // --- Agent loop errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Staged pipeline errors ---
    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Provider '{0}' does not support structured output")]
    StructuredOutputUnsupported(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures of a single capability invocation.
///
/// These are never fatal to an agent loop: they are rendered into the
/// capability-result message so the model can correct itself. `Clone` lets
/// the execution pipeline replay a recorded outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("Capability not found: {0}")]
    NotFound(String),

    #[error("Capability already registered: {0}")]
    Duplicate(String),

    #[error("Invalid input for {capability}: {reason}")]
    InvalidInput { capability: String, reason: String },

    #[error("Capability execution failed: {capability}: {reason}")]
    ExecutionFailed { capability: String, reason: String },

    #[error("Subagent {subagent} failed: {reason}")]
    SubagentFailed { subagent: String, reason: String },
}

impl CapabilityError {
    /// Shorthand for the most common handler failure.
    pub fn failed(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            capability: capability.into(),
            reason: reason.into(),
        }
    }
}

/// Failures that stop an agent loop from making progress at all.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error(
        "Iteration budget exceeded: no final answer after {max_iterations} iterations (last iteration index {last_iteration})"
    )]
    IterationBudgetExceeded {
        last_iteration: u32,
        max_iterations: u32,
    },

    #[error("Model invocation failed: {0}")]
    Provider(#[from] ProviderError),
}

impl AgentError {
    /// The last completed iteration index, when the budget ran out.
    pub fn last_iteration(&self) -> Option<u32> {
        match self {
            Self::IterationBudgetExceeded { last_iteration, .. } => Some(*last_iteration),
            Self::Provider(_) => None,
        }
    }
}

/// Failures raised while a pipeline stage processes a turn.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Model invocation failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Agent run failed: {0}")]
    Agent(#[from] AgentError),

    #[error("Structured output did not validate: {0}")]
    InvalidOutput(String),

    #[error("Stage pipeline misconfigured: {0}")]
    Internal(String),
}
