//! Observation hooks for agent runs.
//!
//! Observers are invoked synchronously, in registration order, at fixed
//! points of the loop. They cannot alter the run.

use chrono::Utc;
use std::sync::Arc;
use waypoint_core::agent::Step;
use waypoint_core::capability::CapabilityResult;
use waypoint_core::error::AgentError;
use waypoint_core::event::{DomainEvent, EventBus};
use waypoint_core::message::CapabilityCall;
use waypoint_core::provider::ProviderResponse;

/// Callback invoked with every recorded step.
pub type StepCallback = Arc<dyn Fn(&Step) + Send + Sync>;

pub trait AgentObserver: Send + Sync {
    /// The model answered; fires before the response is acted on.
    fn on_model_response(&self, _run_id: &str, _response: &ProviderResponse) {}

    /// A capability call finished; fires before its result is appended.
    fn on_capability_execution(
        &self,
        _run_id: &str,
        _call: &CapabilityCall,
        _result: &CapabilityResult,
    ) {
    }

    /// A step was recorded.
    fn on_step(&self, _run_id: &str, _step: &Step) {}

    /// The run is about to fail with `error`.
    fn on_error(&self, _run_id: &str, _error: &AgentError) {}
}

/// Forwards agent-run observations onto an [`EventBus`].
pub struct EventBusObserver {
    bus: Arc<EventBus>,
}

impl EventBusObserver {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

impl AgentObserver for EventBusObserver {
    fn on_model_response(&self, run_id: &str, response: &ProviderResponse) {
        if let Some(usage) = &response.usage {
            self.bus.publish(DomainEvent::ResponseGenerated {
                run_id: run_id.to_string(),
                model: response.model.clone(),
                tokens_used: usage.total_tokens,
                timestamp: Utc::now(),
            });
        }
    }

    fn on_capability_execution(
        &self,
        run_id: &str,
        call: &CapabilityCall,
        result: &CapabilityResult,
    ) {
        self.bus.publish(DomainEvent::CapabilityExecuted {
            run_id: run_id.to_string(),
            capability: call.name.clone(),
            success: !result.is_error,
            timestamp: Utc::now(),
        });
    }

    fn on_step(&self, run_id: &str, step: &Step) {
        self.bus.publish(DomainEvent::StepCompleted {
            run_id: run_id.to_string(),
            iteration: step.iteration,
            capability_calls: step.capability_calls.len(),
            timestamp: Utc::now(),
        });
    }

    fn on_error(&self, run_id: &str, error: &AgentError) {
        self.bus.publish(DomainEvent::AgentFailed {
            run_id: run_id.to_string(),
            error_message: error.to_string(),
            timestamp: Utc::now(),
        });
    }
}
