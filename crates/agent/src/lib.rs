//! The agent loop and everything a capability call passes through.
//!
//! An [`AgentLoop`] alternates between two things:
//!
//! 1. **Ask the model** with the full transcript and the capability definitions
//! 2. **If capability calls**: run each through the execution pipeline, in
//!    order, append the results, loop back to step 1
//! 3. **If text only**: that text is the final answer
//!
//! The loop stops at the first text-only response or fails once its
//! iteration budget is spent.
//!
//! Capability calls go through a [`CapabilityExecutor`] assembled from
//! decorators (logging, retry, memoization) around the registry dispatcher.
//! A [`SubagentDefinition`] turns a whole inner agent into one capability.

pub mod execution;
pub mod loop_runner;
pub mod observer;
pub mod subagent;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use execution::{
    BaseExecutor, CachePolicy, CacheStats, CapabilityExecutor, ExecuteOptions, ExecutionJournal,
    ExecutionOutcome, ExecutionPolicy, ExecutionRecord, LoggingExecutor, MemoizingExecutor,
    PipelineBuilder, ResultCache, RetryExecutor, canonical_json,
};
pub use loop_runner::{AgentLoop, AgentRunConfig, ModelParams, run_agent};
pub use observer::{AgentObserver, EventBusObserver, StepCallback};
pub use subagent::{
    SubagentCapability, SubagentDefinition, SubagentSpec, define_subagent,
};
