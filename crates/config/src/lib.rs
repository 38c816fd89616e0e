//! Configuration loading, validation, and management for Waypoint.
//!
//! Loads configuration from `~/.waypoint/config.toml` with environment
//! variable overrides. Every value has a default, so a missing file is not
//! an error; out-of-range values are rejected at load time.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.waypoint/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Agent loop defaults
    #[serde(default)]
    pub agent: AgentSettings,

    /// Capability execution pipeline settings
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Staged conversation pipeline settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Subagents exposed as capabilities
    #[serde(default)]
    pub subagents: Vec<SubagentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Model identifier passed through to the provider
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Iteration budget per agent run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_iterations() -> u32 {
    10
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            max_iterations: default_max_iterations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Additional attempts after a failed capability call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Cache successful results keyed by capability name and input
    #[serde(default = "default_true")]
    pub memoize: bool,

    /// Maximum cached results; absent means the cache never evicts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_capacity: Option<usize>,

    /// Log every capability call with timing and outcome
    #[serde(default = "default_true")]
    pub log_calls: bool,
}

fn default_max_retries() -> u32 {
    2
}
fn default_true() -> bool {
    true
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            memoize: true,
            cache_capacity: None,
            log_calls: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Re-run the same user input through a stage the pipeline just advanced into
    #[serde(default = "default_true")]
    pub cascade: bool,

    /// Turns a stage must have seen before a confirmation phrase forces it forward
    #[serde(default = "default_min_turns")]
    pub min_turns_before_forced_advance: u32,

    /// Phrases treated as the user confirming the current stage
    #[serde(default = "default_confirmation_phrases")]
    pub confirmation_phrases: Vec<String>,

    /// Iteration budget for the design stage's agent run; absent means
    /// `agent.max_iterations`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_max_iterations: Option<u32>,
}

fn default_min_turns() -> u32 {
    2
}
fn default_confirmation_phrases() -> Vec<String> {
    [
        "looks good",
        "sounds good",
        "that's right",
        "that is right",
        "that's correct",
        "that is correct",
        "that's all",
        "that is all",
        "go ahead",
        "proceed",
        "move on",
        "approved",
        "confirmed",
        "lgtm",
        "yes",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cascade: true,
            min_turns_before_forced_advance: default_min_turns(),
            confirmation_phrases: default_confirmation_phrases(),
            design_max_iterations: None,
        }
    }
}

/// A subagent declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentConfig {
    /// Capability name the outer agent will call
    pub name: String,

    pub description: String,

    pub system_prompt: String,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Names of capabilities (from the parent registry) the subagent may use
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl EngineConfig {
    /// Load configuration from the default location, with environment overrides.
    ///
    /// Checks env vars: WAYPOINT_MODEL, WAYPOINT_MAX_ITERATIONS, WAYPOINT_MAX_RETRIES
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the environment, in production).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(model) = lookup("WAYPOINT_MODEL") {
            self.agent.model = model;
        }
        if let Some(raw) = lookup("WAYPOINT_MAX_ITERATIONS") {
            self.agent.max_iterations = parse_override("WAYPOINT_MAX_ITERATIONS", &raw)?;
        }
        if let Some(raw) = lookup("WAYPOINT_MAX_RETRIES") {
            self.execution.max_retries = parse_override("WAYPOINT_MAX_RETRIES", &raw)?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".waypoint")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.execution.cache_capacity == Some(0) {
            return Err(ConfigError::ValidationError(
                "execution.cache_capacity must be at least 1 (omit it for an unbounded cache)"
                    .into(),
            ));
        }

        if self.pipeline.design_max_iterations == Some(0) {
            return Err(ConfigError::ValidationError(
                "pipeline.design_max_iterations must be at least 1".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for sub in &self.subagents {
            if sub.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "subagent name must not be empty".into(),
                ));
            }
            if !seen.insert(sub.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate subagent name '{}'",
                    sub.name
                )));
            }
            if sub.max_iterations == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "subagent '{}' max_iterations must be at least 1",
                    sub.name
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} has invalid value '{raw}'")))
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.execution.max_retries, 2);
        assert!(config.execution.memoize);
        assert!(config.execution.cache_capacity.is_none());
        assert!(config.pipeline.cascade);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.agent.model, config.agent.model);
        assert_eq!(
            parsed.pipeline.confirmation_phrases,
            config.pipeline.confirmation_phrases
        );
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = EngineConfig::default();
        config.agent.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_budget_rejected() {
        let mut config = EngineConfig::default();
        config.agent.max_iterations = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.execution.cache_capacity = Some(0);
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.pipeline.design_max_iterations = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn design_budget_is_optional() {
        let config: EngineConfig = toml::from_str("[pipeline]\ncascade = true\n").unwrap();
        assert_eq!(config.pipeline.design_max_iterations, None);

        let config: EngineConfig =
            toml::from_str("[pipeline]\ndesign_max_iterations = 4\n").unwrap();
        assert_eq!(config.pipeline.design_max_iterations, Some(4));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = EngineConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.agent.max_iterations, 10);
    }

    #[test]
    fn load_from_file_with_subagents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[agent]
model = "gpt-4o"
max_iterations = 4

[execution]
max_retries = 1
cache_capacity = 128

[pipeline]
cascade = false

[[subagents]]
name = "researcher"
description = "Looks things up"
system_prompt = "You research."
capabilities = ["search"]
"#
        )
        .unwrap();

        let config = EngineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.agent.model, "gpt-4o");
        assert_eq!(config.agent.max_iterations, 4);
        assert_eq!(config.execution.max_retries, 1);
        assert_eq!(config.execution.cache_capacity, Some(128));
        assert!(config.execution.memoize);
        assert!(!config.pipeline.cascade);
        assert_eq!(config.subagents.len(), 1);
        assert_eq!(config.subagents[0].max_iterations, 10);
        assert_eq!(config.subagents[0].capabilities, vec!["search"]);
    }

    #[test]
    fn duplicate_subagents_rejected() {
        let sub = SubagentConfig {
            name: "helper".into(),
            description: "d".into(),
            system_prompt: "p".into(),
            max_iterations: 3,
            capabilities: vec![],
        };
        let config = EngineConfig {
            subagents: vec![sub.clone(), sub],
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate subagent"));
    }

    #[test]
    fn overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("WAYPOINT_MODEL", "local/llama"),
            ("WAYPOINT_MAX_ITERATIONS", "3"),
            ("WAYPOINT_MAX_RETRIES", "0"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.agent.model, "local/llama");
        assert_eq!(config.agent.max_iterations, 3);
        assert_eq!(config.execution.max_retries, 0);
    }

    #[test]
    fn malformed_override_rejected() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(|k| (k == "WAYPOINT_MAX_ITERATIONS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("WAYPOINT_MAX_ITERATIONS"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = EngineConfig::default_toml();
        assert!(toml_str.contains("max_iterations"));
        assert!(toml_str.contains("confirmation_phrases"));
    }
}
