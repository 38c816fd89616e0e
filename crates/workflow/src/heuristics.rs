//! Advancement heuristics that keep a stage from stalling.
//!
//! A model may keep asking clarifying questions forever. Once the user has
//! clearly confirmed and the stage has seen enough turns, the stage moves on
//! regardless of what the model judged.

use waypoint_config::PipelineConfig;

#[derive(Debug, Clone)]
pub struct AdvanceHeuristics {
    phrases: Vec<String>,
    min_turns: u32,
}

impl AdvanceHeuristics {
    pub fn new(phrases: impl IntoIterator<Item = impl AsRef<str>>, min_turns: u32) -> Self {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| normalize(p.as_ref()))
                .filter(|p| !p.is_empty())
                .collect(),
            min_turns,
        }
    }

    pub fn min_turns(&self) -> u32 {
        self.min_turns
    }

    /// Whether `text` contains a confirmation phrase as whole words,
    /// ignoring case and punctuation.
    pub fn is_confirmation(&self, text: &str) -> bool {
        let padded = format!(" {} ", normalize(text));
        self.phrases
            .iter()
            .any(|phrase| padded.contains(&format!(" {phrase} ")))
    }

    /// Force the stage forward when the user confirmed and the stage has
    /// already processed at least `min_turns` turns.
    pub fn should_force_advance(&self, text: &str, turns: u32) -> bool {
        turns >= self.min_turns && self.is_confirmation(text)
    }
}

impl From<&PipelineConfig> for AdvanceHeuristics {
    fn from(config: &PipelineConfig) -> Self {
        Self::new(
            &config.confirmation_phrases,
            config.min_turns_before_forced_advance,
        )
    }
}

impl Default for AdvanceHeuristics {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

/// Lowercase, fold curly apostrophes, and collapse every run of
/// non-word characters into a single space.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        let ch = if ch == '\u{2019}' { '\'' } else { ch };
        if ch.is_alphanumeric() || ch == '\'' {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}
