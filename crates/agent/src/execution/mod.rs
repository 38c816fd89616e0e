//! Capability execution pipeline.
//!
//! Every capability call made by an agent loop goes through a
//! [`CapabilityExecutor`]. The base executor dispatches into the registry;
//! decorators wrap another executor behind the same signature:
//!
//! ```text
//! LoggingExecutor ─▶ RetryExecutor ─▶ MemoizingExecutor ─▶ BaseExecutor ─▶ registry
//! ```
//!
//! The order is chosen by whoever assembles the pipeline. Retry should wrap
//! memoization so cache hits never count as attempts; logging usually sits
//! outermost so its timings include retries.

pub mod logging;
pub mod memo;
pub mod retry;

use async_trait::async_trait;
use std::sync::Arc;
use waypoint_config::ExecutionConfig;
use waypoint_core::capability::CapabilityRegistry;
use waypoint_core::error::CapabilityError;

pub use logging::{ExecutionJournal, ExecutionRecord, LoggingExecutor};
pub use memo::{CachePolicy, CacheStats, MemoizingExecutor, ResultCache, canonical_json};
pub use retry::RetryExecutor;

/// What one execution produces: the capability output, or why it failed.
pub type ExecutionOutcome = Result<serde_json::Value, CapabilityError>;

/// Per-call metadata threaded through the pipeline.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// The model-assigned call ID, when the call came from a model
    pub call_id: Option<String>,
    /// The agent run issuing the call
    pub run_id: Option<String>,
}

/// Executes a named capability from a registry.
#[async_trait]
pub trait CapabilityExecutor: Send + Sync {
    async fn execute(
        &self,
        registry: &CapabilityRegistry,
        name: &str,
        input: &serde_json::Value,
        options: &ExecuteOptions,
    ) -> ExecutionOutcome;
}

/// Dispatches straight into the registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct BaseExecutor;

#[async_trait]
impl CapabilityExecutor for BaseExecutor {
    async fn execute(
        &self,
        registry: &CapabilityRegistry,
        name: &str,
        input: &serde_json::Value,
        _options: &ExecuteOptions,
    ) -> ExecutionOutcome {
        registry.dispatch(name, input.clone()).await
    }
}

enum Layer {
    Logging(Option<Arc<ExecutionJournal>>),
    Retry(u32),
    Memoize(ResultCache),
}

/// Assembles a decorator chain around a base executor.
///
/// Layers are listed outermost first:
/// `PipelineBuilder::new().logging().retry(2).memoize(cache).build()`
/// yields `logging(retry(memoize(base)))`.
#[derive(Default)]
pub struct PipelineBuilder {
    layers: Vec<Layer>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log start, end, duration and outcome of every call.
    pub fn logging(mut self) -> Self {
        self.layers.push(Layer::Logging(None));
        self
    }

    /// Like [`logging`](Self::logging), and also append a record to `journal`.
    pub fn logging_into(mut self, journal: Arc<ExecutionJournal>) -> Self {
        self.layers.push(Layer::Logging(Some(journal)));
        self
    }

    /// Re-run failed calls up to `max_retries` more times.
    pub fn retry(mut self, max_retries: u32) -> Self {
        self.layers.push(Layer::Retry(max_retries));
        self
    }

    /// Serve repeated successful calls from `cache`.
    pub fn memoize(mut self, cache: ResultCache) -> Self {
        self.layers.push(Layer::Memoize(cache));
        self
    }

    /// Wrap the registry-dispatching [`BaseExecutor`].
    pub fn build(self) -> Arc<dyn CapabilityExecutor> {
        self.build_on(Arc::new(BaseExecutor))
    }

    /// Wrap a caller-supplied innermost executor.
    pub fn build_on(self, base: Arc<dyn CapabilityExecutor>) -> Arc<dyn CapabilityExecutor> {
        self.layers
            .into_iter()
            .rev()
            .fold(base, |inner, layer| -> Arc<dyn CapabilityExecutor> {
                match layer {
                    Layer::Logging(journal) => Arc::new(LoggingExecutor::new(inner, journal)),
                    Layer::Retry(max) => Arc::new(RetryExecutor::new(inner, max)),
                    Layer::Memoize(cache) => Arc::new(MemoizingExecutor::new(inner, cache)),
                }
            })
    }
}

/// A reusable recipe for the standard `logging → retry → memoize → base` chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPolicy {
    pub max_retries: u32,
    pub memoize: bool,
    pub cache_policy: CachePolicy,
    pub log_calls: bool,
}

impl ExecutionPolicy {
    /// No decorators at all: calls go straight to the registry.
    pub fn plain() -> Self {
        Self {
            max_retries: 0,
            memoize: false,
            cache_policy: CachePolicy::Unbounded,
            log_calls: false,
        }
    }

    /// Build a fresh pipeline. Each call gets its own cache.
    pub fn build_pipeline(&self) -> Arc<dyn CapabilityExecutor> {
        let mut builder = PipelineBuilder::new();
        if self.log_calls {
            builder = builder.logging();
        }
        if self.max_retries > 0 {
            builder = builder.retry(self.max_retries);
        }
        if self.memoize {
            builder = builder.memoize(ResultCache::new(self.cache_policy));
        }
        builder.build()
    }
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

impl From<&ExecutionConfig> for ExecutionPolicy {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            memoize: config.memoize,
            cache_policy: config
                .cache_capacity
                .map_or(CachePolicy::Unbounded, CachePolicy::Bounded),
            log_calls: config.log_calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::CountingCapability;
    use serde_json::json;

    #[tokio::test]
    async fn base_executor_dispatches() {
        let cap = Arc::new(CountingCapability::succeeding("lookup", json!("found")));
        let registry = CapabilityRegistry::new().with(cap.clone()).unwrap();

        let outcome = BaseExecutor
            .execute(&registry, "lookup", &json!({}), &ExecuteOptions::default())
            .await;
        assert_eq!(outcome.unwrap(), json!("found"));
        assert_eq!(cap.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_capability_is_a_failure_not_a_panic() {
        let registry = CapabilityRegistry::new();
        let outcome = PipelineBuilder::new()
            .retry(1)
            .build()
            .execute(&registry, "ghost", &json!({}), &ExecuteOptions::default())
            .await;
        assert_eq!(outcome.unwrap_err(), CapabilityError::NotFound("ghost".into()));
    }

    #[tokio::test]
    async fn cache_hits_bypass_retry_and_base() {
        // Fails once, then succeeds: the retry layer absorbs the failure and
        // the memo layer serves every later identical call.
        let cap = Arc::new(CountingCapability::failing_first("flaky", 1, json!(7)));
        let registry = CapabilityRegistry::new().with(cap.clone()).unwrap();
        let pipeline = PipelineBuilder::new()
            .logging()
            .retry(2)
            .memoize(ResultCache::unbounded())
            .build();

        for _ in 0..3 {
            let outcome = pipeline
                .execute(&registry, "flaky", &json!({"k": 1}), &ExecuteOptions::default())
                .await;
            assert_eq!(outcome.unwrap(), json!(7));
        }
        assert_eq!(cap.calls(), 2);
    }

    #[test]
    fn policy_from_config() {
        let config = ExecutionConfig {
            max_retries: 1,
            memoize: true,
            cache_capacity: Some(16),
            log_calls: false,
        };
        let policy = ExecutionPolicy::from(&config);
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.cache_policy, CachePolicy::Bounded(16));
        assert!(!policy.log_calls);

        assert_eq!(ExecutionPolicy::default().cache_policy, CachePolicy::Unbounded);
    }

    #[tokio::test]
    async fn plain_policy_does_not_retry() {
        let cap = Arc::new(CountingCapability::failing_first("flaky", 1, json!(1)));
        let registry = CapabilityRegistry::new().with(cap.clone()).unwrap();
        let outcome = ExecutionPolicy::plain()
            .build_pipeline()
            .execute(&registry, "flaky", &json!({}), &ExecuteOptions::default())
            .await;
        assert!(outcome.is_err());
        assert_eq!(cap.calls(), 1);
    }
}
