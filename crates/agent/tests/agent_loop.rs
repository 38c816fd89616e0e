//! End-to-end tests for the agent loop, the execution pipeline and subagents.
//!
//! Everything runs against a scripted provider, so the tests exercise the
//! loop's bookkeeping rather than any model behavior.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use waypoint_agent::{
    AgentLoop, AgentRunConfig, EventBusObserver, ExecutionJournal, ExecutionPolicy, ModelParams,
    PipelineBuilder, ResultCache, SubagentSpec, define_subagent, run_agent,
};
use waypoint_core::capability::{CapabilityRegistry, FnCapability};
use waypoint_core::error::{CapabilityError, ProviderError};
use waypoint_core::event::{DomainEvent, EventBus};
use waypoint_core::message::{CapabilityCall, Message, Role};
use waypoint_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};

// ── Mock Provider ────────────────────────────────────────────────────────

struct ScriptedProvider {
    responses: std::sync::Mutex<Vec<ProviderResponse>>,
    seen: std::sync::Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
            seen: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut seen = self.seen.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let index = seen.len();
        if index >= responses.len() {
            panic!(
                "ScriptedProvider exhausted: call #{}, have {}",
                index,
                responses.len()
            );
        }
        seen.push(request);
        Ok(responses[index].clone())
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage::new(10, 5)),
        model: "mock".into(),
    }
}

fn call_response(calls: Vec<CapabilityCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_calls(thought, calls),
        usage: Some(Usage::new(10, 5)),
        model: "mock".into(),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("waypoint_agent=debug")
        .try_init();
}

/// A weather lookup that fails on its first call.
fn flaky_weather(counter: Arc<AtomicUsize>) -> FnCapability {
    FnCapability::new(
        "weather",
        "Current weather for a city",
        json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        }),
        move |input| {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    return Err(CapabilityError::failed("weather", "upstream timeout"));
                }
                let city = input["city"].as_str().unwrap_or("?").to_string();
                Ok(json!({"city": city, "temp_c": 21}))
            }
        },
    )
}

// ── E2E: pipeline decorators ─────────────────────────────────────────────

#[tokio::test]
async fn e2e_retry_and_memo_behind_the_loop() {
    init_tracing();
    let counter = Arc::new(AtomicUsize::new(0));
    let registry = CapabilityRegistry::new()
        .with(Arc::new(flaky_weather(counter.clone())))
        .unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![
        call_response(
            vec![CapabilityCall::new("c1", "weather", json!({"city": "Oslo"}))],
            "Checking Oslo",
        ),
        call_response(
            vec![CapabilityCall::new("c2", "weather", json!({"city": "Oslo"}))],
            "Double-checking",
        ),
        text_response("It is 21°C in Oslo."),
    ]));

    let journal = Arc::new(ExecutionJournal::new());
    let pipeline = PipelineBuilder::new()
        .logging_into(journal.clone())
        .retry(2)
        .memoize(ResultCache::unbounded())
        .build();

    let result = AgentLoop::new(provider.clone(), Arc::new(registry))
        .with_executor(pipeline)
        .with_system_prompt("You report weather.")
        .run("Weather in Oslo?")
        .await
        .unwrap();

    assert_eq!(result.output, "It is 21°C in Oslo.");
    assert_eq!(result.iterations(), 3);
    // One failure absorbed by retry, one success, then a cache hit
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert!(result.steps[0].capability_results.iter().all(|r| !r.is_error));
    assert_eq!(journal.len(), 2);
    assert!(journal.records().iter().all(|r| r.success));
    assert_eq!(result.total_usage, Usage::new(30, 15));
}

#[tokio::test]
async fn e2e_missing_required_key_is_fed_back() {
    let counter = Arc::new(AtomicUsize::new(0));
    let registry = CapabilityRegistry::new()
        .with(Arc::new(flaky_weather(counter.clone())))
        .unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        call_response(vec![CapabilityCall::new("c1", "weather", json!({}))], ""),
        text_response("Which city?"),
    ]));

    let result = AgentLoop::new(provider.clone(), Arc::new(registry))
        .run("Weather?")
        .await
        .unwrap();

    assert_eq!(result.output, "Which city?");
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    let fed_back = provider.requests()[1].messages.last().cloned().unwrap();
    assert_eq!(fed_back.role, Role::CapabilityResult);
    assert!(fed_back.is_error);
    assert!(fed_back.content.contains("city"));
}

// ── E2E: subagents ───────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_outer_agent_delegates_to_subagent() {
    init_tracing();
    let provider = Arc::new(ScriptedProvider::new(vec![
        // Outer: delegate
        call_response(
            vec![CapabilityCall::new(
                "c1",
                "summarizer",
                json!({"input": "Summarize: Rust has ownership."}),
            )],
            "Asking the summarizer",
        ),
        // Inner: answer directly
        text_response("Rust tracks ownership at compile time."),
        // Outer: final answer
        text_response("Summary: Rust tracks ownership at compile time."),
    ]));

    let summarizer = define_subagent(SubagentSpec {
        name: "summarizer".into(),
        description: "Summarizes text".into(),
        system_prompt: "You summarize.".into(),
        max_iterations: 3,
        ..SubagentSpec::default()
    })
    .with_policy(ExecutionPolicy::plain());

    let registry = CapabilityRegistry::new()
        .with(summarizer.to_capability(
            provider.clone(),
            &ModelParams::new("coordinator-model"),
        ))
        .unwrap();

    let bus = Arc::new(EventBus::new(64));
    let mut rx = bus.subscribe();

    let mut config = AgentRunConfig::new(
        provider.clone(),
        Arc::new(registry),
        "You coordinate helpers.",
        "Summarize the Rust ownership note.",
    );
    config.model = "coordinator-model".into();
    config.observers.push(Arc::new(EventBusObserver::new(bus.clone())));
    let result = run_agent(config).await.unwrap();

    assert_eq!(
        result.output,
        "Summary: Rust tracks ownership at compile time."
    );
    let delegated = &result.steps[0].capability_results[0];
    assert_eq!(
        delegated.output,
        Some(json!({"output": "Rust tracks ownership at compile time.", "iterations": 1}))
    );

    // The inner loop saw only its own system prompt and task
    let inner_request = &provider.requests()[1];
    assert_eq!(inner_request.messages.len(), 2);
    assert_eq!(inner_request.messages[0].content, "You summarize.");
    assert_eq!(inner_request.model, "coordinator-model");
    assert!(inner_request.capabilities.is_empty());

    let mut saw_capability_event = false;
    while let Ok(event) = rx.try_recv() {
        if let DomainEvent::CapabilityExecuted {
            capability,
            success,
            ..
        } = event.as_ref()
        {
            assert_eq!(capability, "summarizer");
            assert!(*success);
            saw_capability_event = true;
        }
    }
    assert!(saw_capability_event);
}
