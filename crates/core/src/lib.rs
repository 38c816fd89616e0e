//! # Waypoint Core
//!
//! Domain types, traits, and error definitions for the Waypoint agent-execution
//! engine. This crate has **no runtime machinery** of its own: it defines the
//! vocabulary (messages, capabilities, the model provider seam, steps and
//! results) that the agent loop and the staged pipeline are written against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is a trait here. Implementations live elsewhere:
//! - the model vendor behind [`Provider`] is supplied by the embedding application
//! - capabilities are registered by whoever assembles an agent
//! - tests swap in scripted providers and closure-backed capabilities

pub mod agent;
pub mod capability;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentResult, Step};
pub use capability::{
    Capability, CapabilityDefinition, CapabilityRegistry, CapabilityResult, FnCapability,
};
pub use error::{AgentError, CapabilityError, Error, ProviderError, Result, StageError};
pub use event::{DomainEvent, EventBus};
pub use message::{CapabilityCall, Message, Role, Transcript};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StructuredResponse, Usage};
