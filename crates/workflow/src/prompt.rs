//! System-prompt builder for stages.

use std::fmt::Write;

use crate::context::{ChatRole, ConversationContext};
use crate::stage::StageId;

const DEFAULT_HISTORY_WINDOW: usize = 8;

/// Renders the system prompt a stage sends to the model.
///
/// Sections, in order: role line, stage instructions, findings gathered so
/// far, recent conversation, open questions, output contract. Empty
/// sections are left out.
pub struct StagePrompt<'a> {
    stage: StageId,
    context: &'a ConversationContext,
    instructions: String,
    history_window: usize,
    output_schema: Option<serde_json::Value>,
}

impl<'a> StagePrompt<'a> {
    pub fn for_stage(stage: StageId, context: &'a ConversationContext) -> Self {
        Self {
            stage,
            context,
            instructions: String::new(),
            history_window: DEFAULT_HISTORY_WINDOW,
            output_schema: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// How many history entries to include.
    pub fn with_history_window(mut self, entries: usize) -> Self {
        self.history_window = entries;
        self
    }

    /// Ask for a single JSON object matching `schema`.
    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "You are a software design assistant. The conversation is in the {} stage.\n",
            self.stage
        );

        if !self.instructions.is_empty() {
            let _ = write!(out, "\n{}\n", self.instructions.trim());
        }

        let findings = self.context.findings();
        if !findings.is_empty() {
            out.push_str("\n## Known so far\n");
            for (stage, value) in findings {
                let rendered =
                    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
                let _ = writeln!(out, "### {stage}\n{rendered}");
            }
        }

        let recent = self.context.recent_history(self.history_window);
        if !recent.is_empty() {
            out.push_str("\n## Recent conversation\n");
            for entry in recent {
                let speaker = match entry.role {
                    ChatRole::User => "User",
                    ChatRole::Assistant => "Assistant",
                };
                let _ = writeln!(out, "{speaker}: {}", entry.content);
            }
        }

        let questions = self.context.pending_questions();
        if !questions.is_empty() {
            out.push_str("\n## Still open\n");
            for question in questions {
                let _ = writeln!(out, "- {question}");
            }
        }

        if let Some(schema) = &self.output_schema {
            let _ = write!(
                out,
                "\n## Output\nRespond with a single JSON object matching this schema and nothing else:\n{schema}\n"
            );
        }

        out
    }
}
