//! Structured model output with a text fallback.
//!
//! Providers that implement [`Provider::complete_structured`] return JSON
//! directly. For the rest, the request is sent as plain text and the first
//! JSON object is extracted from the answer.

use serde::de::DeserializeOwned;
use tracing::debug;
use waypoint_core::error::{ProviderError, StageError};
use waypoint_core::provider::{Provider, ProviderRequest};

/// Ask `provider` for a value matching `schema` and decode it as `T`.
pub async fn request_structured<T: DeserializeOwned>(
    provider: &dyn Provider,
    request: ProviderRequest,
    schema: &serde_json::Value,
) -> Result<T, StageError> {
    let data = match provider.complete_structured(request.clone(), schema).await {
        Ok(response) => response.data,
        Err(ProviderError::StructuredOutputUnsupported(name)) => {
            debug!(provider = %name, "Structured output unsupported, falling back to text");
            let response = provider.complete(request).await?;
            extract_json(response.text()).ok_or_else(|| {
                StageError::InvalidOutput("model response contained no JSON object".into())
            })?
        }
        Err(e) => return Err(e.into()),
    };

    serde_json::from_value(data).map_err(|e| StageError::InvalidOutput(e.to_string()))
}

/// Pull a JSON object out of free text.
///
/// Tries, in order: the whole text, the first fenced code block, and each
/// balanced `{...}` span from left to right until one parses.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    if let Some(block) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(block) {
            if value.is_object() {
                return Some(value);
            }
        }
    }

    let mut from = 0;
    while let Some(found) = trimmed[from..].find('{') {
        let start = from + found;
        if let Some(span) = balanced_object(&trimmed[start..]) {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(span) {
                return Some(value);
            }
        }
        from = start + 1;
    }
    None
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // Skip the info string (e.g. "json") up to the end of the line
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// The balanced span starting at the `{` that opens `text`.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..=offset]);
                }
            }
            _ => {}
        }
    }
    None
}
