//! The agent reasoning loop implementation.

use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;
use waypoint_config::AgentSettings;
use waypoint_core::agent::{AgentResult, Step};
use waypoint_core::capability::{CapabilityRegistry, CapabilityResult};
use waypoint_core::error::AgentError;
use waypoint_core::message::{Message, Transcript};
use waypoint_core::provider::{Provider, ProviderRequest, Usage};

use crate::execution::{BaseExecutor, CapabilityExecutor, ExecuteOptions};
use crate::observer::{AgentObserver, StepCallback};

/// Default iteration budget per run.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Model identifier used when none is configured.
pub const DEFAULT_MODEL: &str = "default";

/// Sampling temperature used when none is configured.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Which model to ask, and how to sample it.
///
/// Carried from a parent loop into subagents and from configuration into
/// the built-in stages, so every request in one engine names the same model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl ModelParams {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// A capability-free request for `messages` with these settings.
    pub fn request(&self, messages: Vec<Message>) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            capabilities: Vec::new(),
        }
    }
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }
}

impl From<&AgentSettings> for ModelParams {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

/// The agent loop: model invocation, capability execution, repeat.
pub struct AgentLoop {
    /// The model provider
    provider: Arc<dyn Provider>,

    /// Callable capabilities
    capabilities: Arc<CapabilityRegistry>,

    /// Pipeline every capability call goes through
    executor: Arc<dyn CapabilityExecutor>,

    /// System prompt, placed first in the transcript when non-empty
    system_prompt: String,

    /// Model name and sampling settings for every request
    params: ModelParams,

    /// Iteration budget
    max_iterations: u32,

    on_step: Option<StepCallback>,

    observers: Vec<Arc<dyn AgentObserver>>,
}

impl AgentLoop {
    /// Create a loop that dispatches capability calls straight to the registry.
    pub fn new(provider: Arc<dyn Provider>, capabilities: Arc<CapabilityRegistry>) -> Self {
        Self {
            provider,
            capabilities,
            executor: Arc::new(BaseExecutor),
            system_prompt: String::new(),
            params: ModelParams::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            on_step: None,
            observers: Vec::new(),
        }
    }

    /// Create a loop with model, sampling and budget taken from configuration.
    pub fn from_settings(
        provider: Arc<dyn Provider>,
        capabilities: Arc<CapabilityRegistry>,
        settings: &AgentSettings,
    ) -> Self {
        Self::new(provider, capabilities)
            .with_params(ModelParams::from(settings))
            .with_max_iterations(settings.max_iterations)
    }

    /// Route capability calls through `executor` (usually a decorated pipeline).
    pub fn with_executor(mut self, executor: Arc<dyn CapabilityExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.params.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.params.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.params.max_tokens = Some(max);
        self
    }

    /// Replace model name and sampling settings at once.
    pub fn with_params(mut self, params: ModelParams) -> Self {
        self.params = params;
        self
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Set the iteration budget. Values below 1 are raised to 1.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// Invoke `callback` with every recorded step.
    pub fn on_step(mut self, callback: StepCallback) -> Self {
        self.on_step = Some(callback);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn AgentObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Run the loop on `input` until the model answers without calling a
    /// capability.
    ///
    /// Capability calls within one response execute strictly one after
    /// another, and each result is appended before the next call starts, so
    /// the transcript lists results in call order. A failed capability call
    /// is fed back to the model as an error result. Running out of
    /// iterations fails with [`AgentError::IterationBudgetExceeded`].
    pub async fn run(&self, input: &str) -> Result<AgentResult, AgentError> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "agent_run",
            run_id = %run_id,
            model = %self.params.model,
            max_iterations = self.max_iterations
        );
        self.run_inner(&run_id, input).instrument(span).await
    }

    async fn run_inner(&self, run_id: &str, input: &str) -> Result<AgentResult, AgentError> {
        let mut transcript = Transcript::new();
        if !self.system_prompt.trim().is_empty() {
            transcript.push(Message::system(&self.system_prompt));
        }
        transcript.push(Message::user(input));

        let definitions = self.capabilities.definitions();
        let mut steps: Vec<Step> = Vec::new();
        let mut total_usage = Usage::default();

        info!(capabilities = definitions.len(), "Agent run starting");

        for iteration in 0..self.max_iterations {
            debug!(iteration, "Agent loop iteration");

            let request = ProviderRequest {
                capabilities: definitions.clone(),
                ..self.params.request(transcript.messages().to_vec())
            };

            let response = match self.provider.complete(request).await {
                Ok(response) => response,
                Err(e) => return Err(self.fail(run_id, AgentError::Provider(e))),
            };
            for observer in &self.observers {
                observer.on_model_response(run_id, &response);
            }
            if let Some(usage) = response.usage {
                total_usage += usage;
            }

            let usage = response.usage;
            let message = response.message;
            let text = (!message.content.is_empty()).then(|| message.content.clone());

            // No capability calls: this is the final answer
            if !message.has_capability_calls() {
                let output = message.content.clone();
                transcript.push(message);
                let step = Step {
                    iteration,
                    text,
                    capability_calls: Vec::new(),
                    capability_results: Vec::new(),
                    usage,
                };
                self.record_step(run_id, &step);
                steps.push(step);

                info!(iterations = steps.len(), "Agent run completed");
                return Ok(AgentResult {
                    output,
                    steps,
                    total_usage,
                    messages: transcript.into_messages(),
                });
            }

            let calls = message.capability_calls.clone();
            transcript.push(message);
            debug!(call_count = calls.len(), "Executing capability calls");

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                let options = ExecuteOptions {
                    call_id: Some(call.id.clone()),
                    run_id: Some(run_id.to_string()),
                };
                let outcome = self
                    .executor
                    .execute(&self.capabilities, &call.name, &call.input, &options)
                    .await;
                let result = CapabilityResult::from_outcome(call, &outcome);
                if result.is_error {
                    warn!(capability = %call.name, call_id = %call.id, "Capability call failed, reporting to model");
                }

                for observer in &self.observers {
                    observer.on_capability_execution(run_id, call, &result);
                }
                transcript.push(Message::capability_result(
                    &call.id,
                    result.render(),
                    result.is_error,
                ));
                results.push(result);
            }

            let step = Step {
                iteration,
                text,
                capability_calls: calls,
                capability_results: results,
                usage,
            };
            self.record_step(run_id, &step);
            steps.push(step);
        }

        warn!(
            max_iterations = self.max_iterations,
            "Iteration budget exhausted without a final answer"
        );
        Err(self.fail(
            run_id,
            AgentError::IterationBudgetExceeded {
                last_iteration: self.max_iterations - 1,
                max_iterations: self.max_iterations,
            },
        ))
    }

    fn record_step(&self, run_id: &str, step: &Step) {
        if let Some(callback) = &self.on_step {
            callback(step);
        }
        for observer in &self.observers {
            observer.on_step(run_id, step);
        }
    }

    fn fail(&self, run_id: &str, error: AgentError) -> AgentError {
        for observer in &self.observers {
            observer.on_error(run_id, &error);
        }
        error
    }
}

/// Everything needed for one agent run.
pub struct AgentRunConfig {
    pub provider: Arc<dyn Provider>,
    pub capabilities: Arc<CapabilityRegistry>,
    pub system_prompt: String,
    pub input: String,
    pub max_iterations: u32,
    pub model: String,
    /// Defaults to the bare registry dispatcher
    pub executor: Option<Arc<dyn CapabilityExecutor>>,
    pub on_step: Option<StepCallback>,
    pub observers: Vec<Arc<dyn AgentObserver>>,
}

impl AgentRunConfig {
    /// A config with the default budget, model and executor.
    pub fn new(
        provider: Arc<dyn Provider>,
        capabilities: Arc<CapabilityRegistry>,
        system_prompt: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            capabilities,
            system_prompt: system_prompt.into(),
            input: input.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            model: DEFAULT_MODEL.to_string(),
            executor: None,
            on_step: None,
            observers: Vec::new(),
        }
    }
}

/// Build an [`AgentLoop`] from `config` and run it on `config.input`.
pub async fn run_agent(config: AgentRunConfig) -> Result<AgentResult, AgentError> {
    let mut agent = AgentLoop::new(config.provider, config.capabilities)
        .with_system_prompt(config.system_prompt)
        .with_model(config.model)
        .with_max_iterations(config.max_iterations);
    if let Some(executor) = config.executor {
        agent = agent.with_executor(executor);
    }
    if let Some(callback) = config.on_step {
        agent = agent.on_step(callback);
    }
    for observer in config.observers {
        agent = agent.with_observer(observer);
    }
    agent.run(&config.input).await
}
