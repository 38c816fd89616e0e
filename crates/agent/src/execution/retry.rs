//! Retry decorator: re-run a failed capability call.
//!
//! Attempts are plain sequential re-calls with no delay between them; the
//! last outcome (success or final failure) is returned.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use waypoint_core::capability::CapabilityRegistry;

use super::{CapabilityExecutor, ExecuteOptions, ExecutionOutcome};

pub struct RetryExecutor {
    inner: Arc<dyn CapabilityExecutor>,
    max_retries: u32,
}

impl RetryExecutor {
    /// `max_retries` is the number of attempts *after* the first one.
    pub fn new(inner: Arc<dyn CapabilityExecutor>, max_retries: u32) -> Self {
        Self { inner, max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[async_trait]
impl CapabilityExecutor for RetryExecutor {
    async fn execute(
        &self,
        registry: &CapabilityRegistry,
        name: &str,
        input: &serde_json::Value,
        options: &ExecuteOptions,
    ) -> ExecutionOutcome {
        let mut attempt = 0u32;
        loop {
            let outcome = self.inner.execute(registry, name, input, options).await;
            match &outcome {
                Ok(_) => {
                    if attempt > 0 {
                        debug!(capability = %name, attempt = attempt + 1, "Retry: succeeded");
                    }
                    return outcome;
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        capability = %name,
                        error = %e,
                        attempt,
                        max_retries = self.max_retries,
                        "Retry: capability failed, trying again"
                    );
                }
                Err(_) => return outcome,
            }
        }
    }
}
