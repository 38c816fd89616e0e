//! Logging decorator: observe capability calls without changing them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};
use waypoint_core::capability::CapabilityRegistry;

use super::{CapabilityExecutor, ExecuteOptions, ExecutionOutcome};

/// Timing and outcome of one call through a [`LoggingExecutor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub capability: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// An append-only sink of [`ExecutionRecord`]s.
#[derive(Debug, Default)]
pub struct ExecutionJournal {
    records: Mutex<Vec<ExecutionRecord>>,
}

impl ExecutionJournal {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, record: ExecutionRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct LoggingExecutor {
    inner: Arc<dyn CapabilityExecutor>,
    journal: Option<Arc<ExecutionJournal>>,
}

impl LoggingExecutor {
    pub fn new(inner: Arc<dyn CapabilityExecutor>, journal: Option<Arc<ExecutionJournal>>) -> Self {
        Self { inner, journal }
    }
}

#[async_trait]
impl CapabilityExecutor for LoggingExecutor {
    async fn execute(
        &self,
        registry: &CapabilityRegistry,
        name: &str,
        input: &serde_json::Value,
        options: &ExecuteOptions,
    ) -> ExecutionOutcome {
        let call_id = options.call_id.as_deref().unwrap_or("-");
        let started_at = Utc::now();
        let start = Instant::now();
        debug!(capability = %name, call_id, "Capability call started");

        let outcome = self.inner.execute(registry, name, input, options).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => info!(capability = %name, call_id, duration_ms, "Capability call succeeded"),
            Err(e) => warn!(
                capability = %name,
                call_id,
                duration_ms,
                error = %e,
                "Capability call failed"
            ),
        }

        if let Some(journal) = &self.journal {
            journal.push(ExecutionRecord {
                capability: name.to_string(),
                call_id: options.call_id.clone(),
                started_at,
                finished_at: Utc::now(),
                duration_ms,
                success: outcome.is_ok(),
                error: outcome.as_ref().err().map(|e| e.to_string()),
            });
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::BaseExecutor;
    use crate::test_helpers::CountingCapability;
    use serde_json::json;

    #[tokio::test]
    async fn records_outcome_without_altering_it() {
        let ok = Arc::new(CountingCapability::succeeding("fine", json!({"n": 1})));
        let bad = Arc::new(CountingCapability::always_failing("broken"));
        let registry = CapabilityRegistry::new()
            .with(ok)
            .unwrap()
            .with(bad)
            .unwrap();

        let journal = Arc::new(ExecutionJournal::new());
        let executor = LoggingExecutor::new(Arc::new(BaseExecutor), Some(journal.clone()));
        let options = ExecuteOptions {
            call_id: Some("call_1".into()),
            run_id: None,
        };

        let first = executor.execute(&registry, "fine", &json!({}), &options).await;
        assert_eq!(first.unwrap(), json!({"n": 1}));
        let second = executor.execute(&registry, "broken", &json!({}), &options).await;
        assert!(second.is_err());

        let records = journal.records();
        assert_eq!(records.len(), 2);
        assert!(records[0].success);
        assert_eq!(records[0].call_id.as_deref(), Some("call_1"));
        assert!(records[0].finished_at >= records[0].started_at);
        assert!(!records[1].success);
        assert!(records[1].error.as_deref().unwrap().contains("attempt 1 failed"));
    }

    #[tokio::test]
    async fn works_without_journal() {
        let cap = Arc::new(CountingCapability::succeeding("fine", json!(true)));
        let registry = CapabilityRegistry::new().with(cap.clone()).unwrap();
        let executor = LoggingExecutor::new(Arc::new(BaseExecutor), None);
        let outcome = executor
            .execute(&registry, "fine", &json!({}), &ExecuteOptions::default())
            .await;
        assert_eq!(outcome.unwrap(), json!(true));
        assert_eq!(cap.calls(), 1);
    }
}
