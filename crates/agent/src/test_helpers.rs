//! Shared test helpers for agent-crate tests.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use waypoint_core::capability::Capability;
use waypoint_core::error::{CapabilityError, ProviderError};
use waypoint_core::message::{CapabilityCall, Message};
use waypoint_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request it was given. Panics if more calls are made than
/// responses provided.
pub struct ScriptedProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider that answers once with plain text.
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let index = requests.len();
        if index >= responses.len() {
            panic!(
                "ScriptedProvider: no more responses (call #{}, have {})",
                index,
                responses.len()
            );
        }
        requests.push(request);
        Ok(responses[index].clone())
    }
}

/// A provider that requests the same capability on every call, forever.
pub struct LoopingProvider {
    capability: String,
    calls: AtomicUsize,
}

impl LoopingProvider {
    pub fn new(capability: &str) -> Self {
        Self {
            capability: capability.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for LoopingProvider {
    fn name(&self) -> &str {
        "looping_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(make_call_response(
            vec![make_call(
                &format!("call_{n}"),
                &self.capability,
                serde_json::json!({}),
            )],
            "still working",
        ))
    }
}

/// Create a simple text response (no capability calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage::new(10, 5)),
        model: "mock-model".into(),
    }
}

/// Create a response with capability calls and optional thought text.
pub fn make_call_response(calls: Vec<CapabilityCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_calls(thought, calls),
        usage: Some(Usage::new(10, 5)),
        model: "mock-model".into(),
    }
}

pub fn make_call(id: &str, name: &str, input: serde_json::Value) -> CapabilityCall {
    CapabilityCall::new(id, name, input)
}

/// A capability that counts invocations and fails its first `fail_first`
/// calls with `"attempt N failed"`.
pub struct CountingCapability {
    name: String,
    output: serde_json::Value,
    fail_first: usize,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl CountingCapability {
    pub fn succeeding(name: &str, output: serde_json::Value) -> Self {
        Self::failing_first(name, 0, output)
    }

    pub fn failing_first(name: &str, fail_first: usize, output: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            output,
            fail_first,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_failing(name: &str) -> Self {
        Self::failing_first(name, usize::MAX, serde_json::Value::Null)
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Capability for CountingCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Counts its invocations"
    }

    async fn execute(
        &self,
        _input: serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if attempt <= self.fail_first {
            return Err(CapabilityError::failed(
                &self.name,
                format!("attempt {attempt} failed"),
            ));
        }
        Ok(self.output.clone())
    }
}
