//! Domain event system: decoupled observation of agent runs and pipelines.
//!
//! Events are published when something interesting happens in the engine.
//! Other components can subscribe to react without tight coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The model answered a request
    ResponseGenerated {
        run_id: String,
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A capability call finished (successfully or not)
    CapabilityExecuted {
        run_id: String,
        capability: String,
        success: bool,
        timestamp: DateTime<Utc>,
    },

    /// An agent loop iteration was recorded
    StepCompleted {
        run_id: String,
        iteration: u32,
        capability_calls: usize,
        timestamp: DateTime<Utc>,
    },

    /// An agent loop failed to produce an answer
    AgentFailed {
        run_id: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// A staged conversation moved to its next stage
    StageAdvanced {
        conversation_id: String,
        from: String,
        to: String,
        timestamp: DateTime<Utc>,
    },

    /// A staged conversation turn was downgraded to a retry prompt
    TurnFailed {
        conversation_id: String,
        stage: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Components can subscribe to receive all events and filter for what they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
