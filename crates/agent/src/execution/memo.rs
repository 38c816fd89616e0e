//! Memoization decorator and its result cache.
//!
//! Entries are keyed by `(capability name, canonical JSON of the input)`, so
//! inputs that differ only in object key order share an entry. Only
//! successful outcomes are stored; a failed call is always re-executed.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::debug;
use waypoint_core::capability::CapabilityRegistry;

use super::{CapabilityExecutor, ExecuteOptions, ExecutionOutcome};

/// How many entries a [`ResultCache`] may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Never evict. The cache lives as long as its pipeline.
    #[default]
    Unbounded,
    /// Evict the oldest insertion once this many entries are held.
    Bounded(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

type CacheKey = (String, String);

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, serde_json::Value>,
    order: VecDeque<CacheKey>,
    hits: u64,
    misses: u64,
}

/// An explicitly owned store of successful capability results.
///
/// Lock sections never span an await, so the cache is safe to share between
/// sequential calls of one pipeline.
pub struct ResultCache {
    policy: CachePolicy,
    state: Mutex<CacheState>,
}

impl ResultCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(CachePolicy::Unbounded)
    }

    pub fn bounded(capacity: usize) -> Self {
        Self::new(CachePolicy::Bounded(capacity))
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    fn state(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn key(name: &str, input: &serde_json::Value) -> CacheKey {
        (name.to_string(), canonical_json(input))
    }

    /// Look up a previous successful result, counting the hit or miss.
    pub fn get(&self, name: &str, input: &serde_json::Value) -> Option<serde_json::Value> {
        let key = Self::key(name, input);
        let mut state = self.state();
        match state.entries.get(&key).cloned() {
            Some(value) => {
                state.hits += 1;
                Some(value)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    pub fn insert(&self, name: &str, input: &serde_json::Value, output: serde_json::Value) {
        let key = Self::key(name, input);
        let mut state = self.state();
        if state.entries.insert(key.clone(), output).is_none() {
            state.order.push_back(key);
        }
        if let CachePolicy::Bounded(capacity) = self.policy {
            while state.entries.len() > capacity.max(1) {
                let Some(oldest) = state.order.pop_front() else {
                    break;
                };
                state.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Hit/miss counters are kept.
    pub fn clear(&self) {
        let mut state = self.state();
        state.entries.clear();
        state.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state();
        CacheStats {
            entries: state.entries.len(),
            hits: state.hits,
            misses: state.misses,
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Serialize `value` with object keys sorted at every depth.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

pub struct MemoizingExecutor {
    inner: Arc<dyn CapabilityExecutor>,
    cache: ResultCache,
}

impl MemoizingExecutor {
    /// Takes ownership of `cache`; its lifetime is this executor's.
    pub fn new(inner: Arc<dyn CapabilityExecutor>, cache: ResultCache) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }
}

#[async_trait]
impl CapabilityExecutor for MemoizingExecutor {
    async fn execute(
        &self,
        registry: &CapabilityRegistry,
        name: &str,
        input: &serde_json::Value,
        options: &ExecuteOptions,
    ) -> ExecutionOutcome {
        if let Some(cached) = self.cache.get(name, input) {
            debug!(capability = %name, "Memo: cache hit");
            return Ok(cached);
        }

        let outcome = self.inner.execute(registry, name, input, options).await;
        if let Ok(output) = &outcome {
            self.cache.insert(name, input, output.clone());
        }
        outcome
    }
}
