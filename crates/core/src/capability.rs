//! Capability trait: the abstraction over things a model can call.
//!
//! A capability is any named `(input) -> output` unit: plain business logic,
//! a closure, or an entire subagent. The registry maps names to handlers and
//! their input contracts; the agent loop resolves model-emitted calls
//! through it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::CapabilityError;
use crate::message::CapabilityCall;

/// A capability definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    /// The capability name
    pub name: String,

    /// Description of what the capability does
    pub description: String,

    /// JSON Schema describing the capability's input
    pub input_schema: serde_json::Value,
}

/// The outcome of one capability call, as recorded in a step and fed back
/// to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityResult {
    /// The call this result answers
    pub call_id: String,

    /// Name of the capability that was called
    pub name: String,

    /// Output on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,

    /// Error text on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,

    pub is_error: bool,
}

impl CapabilityResult {
    pub fn success(call: &CapabilityCall, output: serde_json::Value) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            output: Some(output),
            error_text: None,
            is_error: false,
        }
    }

    pub fn failure(call: &CapabilityCall, error: &CapabilityError) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            output: None,
            error_text: Some(error.to_string()),
            is_error: true,
        }
    }

    /// Build a result from a pipeline outcome.
    pub fn from_outcome(
        call: &CapabilityCall,
        outcome: &Result<serde_json::Value, CapabilityError>,
    ) -> Self {
        match outcome {
            Ok(output) => Self::success(call, output.clone()),
            Err(e) => Self::failure(call, e),
        }
    }

    /// The text placed in the capability-result message.
    ///
    /// String outputs are passed through verbatim; other JSON is serialized.
    pub fn render(&self) -> String {
        if let Some(err) = &self.error_text {
            return format!("Error: {err}");
        }
        match &self.output {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(value) => value.to_string(),
            None => String::new(),
        }
    }
}

/// The core Capability trait.
#[async_trait]
pub trait Capability: Send + Sync {
    /// The unique name of this capability (e.g., "lookup_order").
    fn name(&self) -> &str;

    /// A description of what this capability does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this capability's input.
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    /// Execute the capability with the given input.
    async fn execute(&self, input: serde_json::Value)
    -> Result<serde_json::Value, CapabilityError>;

    /// Convert this capability into a definition for the model.
    fn to_definition(&self) -> CapabilityDefinition {
        CapabilityDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

type BoxedHandler = Arc<
    dyn Fn(
            serde_json::Value,
        )
            -> Pin<Box<dyn Future<Output = Result<serde_json::Value, CapabilityError>> + Send>>
        + Send
        + Sync,
>;

/// A capability backed by an async closure.
pub struct FnCapability {
    name: String,
    description: String,
    input_schema: serde_json::Value,
    handler: BoxedHandler,
}

impl FnCapability {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
        handler: F,
    ) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, CapabilityError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler: Arc::new(move |input| Box::pin(handler(input))),
        }
    }
}

#[async_trait]
impl Capability for FnCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> serde_json::Value {
        self.input_schema.clone()
    }

    async fn execute(
        &self,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError> {
        (self.handler)(input).await
    }
}

/// A registry of callable capabilities.
///
/// Names are unique: registering a second capability under a taken name is
/// rejected at registration time, so dispatch never has to disambiguate.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability.
    pub fn register(&mut self, capability: Arc<dyn Capability>) -> Result<(), CapabilityError> {
        let name = capability.name().to_string();
        if self.capabilities.contains_key(&name) {
            warn!(capability = %name, "Rejected duplicate capability registration");
            return Err(CapabilityError::Duplicate(name));
        }
        debug!(capability = %name, "Capability registered");
        self.capabilities.insert(name, capability);
        Ok(())
    }

    /// Builder-style registration.
    pub fn with(mut self, capability: Arc<dyn Capability>) -> Result<Self, CapabilityError> {
        self.register(capability)?;
        Ok(self)
    }

    /// Get a capability by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// All definitions, sorted by name so prompts are deterministic.
    pub fn definitions(&self) -> Vec<CapabilityDefinition> {
        let mut defs: Vec<_> = self
            .capabilities
            .values()
            .map(|c| c.to_definition())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.capabilities.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Look up `name`, check `input` against its contract, and run it.
    pub async fn dispatch(
        &self,
        name: &str,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError> {
        let capability = self
            .get(name)
            .ok_or_else(|| CapabilityError::NotFound(name.to_string()))?;
        check_input(name, &capability.input_schema(), &input)?;
        capability.execute(input).await
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.names())
            .finish()
    }
}

/// Minimal input-contract check: object schemas require an object input
/// carrying every key in `required`.
fn check_input(
    name: &str,
    schema: &serde_json::Value,
    input: &serde_json::Value,
) -> Result<(), CapabilityError> {
    let invalid = |reason: String| CapabilityError::InvalidInput {
        capability: name.to_string(),
        reason,
    };

    if schema.get("type").and_then(|t| t.as_str()) != Some("object") {
        return Ok(());
    }
    let Some(object) = input.as_object() else {
        return Err(invalid(format!("expected a JSON object, got {input}")));
    };
    let required = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|k| k.as_str()).collect::<Vec<_>>())
        .unwrap_or_default();
    for key in required {
        if !object.contains_key(key) {
            return Err(invalid(format!("missing required field '{key}'")));
        }
    }
    Ok(())
}
