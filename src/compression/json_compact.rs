//! Layer 5: JSON compaction.
//!
//! Re-serializes pretty-printed JSON minified: tool-call arguments on
//! assistant messages, and tool-result contents that are themselves JSON.
//! Anything that fails to parse is left exactly as it was.

use super::message::{NormalizedMessage, Role};
use serde_json::Value;

/// Minify embedded JSON. Returns characters saved.
pub fn apply(messages: &mut [NormalizedMessage]) -> usize {
    let mut saved = 0usize;

    for msg in messages.iter_mut() {
        if let Some(calls) = &mut msg.tool_calls {
            for call in calls.iter_mut() {
                if let Some(minified) = minify(&call.function.arguments) {
                    saved += call.function.arguments.len().saturating_sub(minified.len());
                    call.function.arguments = minified;
                }
            }
        }

        if msg.role == Role::Tool {
            if let Some(content) = &msg.content {
                let trimmed = content.trim();
                if looks_like_json(trimmed) {
                    if let Some(minified) = minify(trimmed) {
                        saved += content.len().saturating_sub(minified.len());
                        msg.content = Some(minified);
                    }
                }
            }
        }
    }

    saved
}

fn looks_like_json(text: &str) -> bool {
    (text.starts_with('{') && text.ends_with('}'))
        || (text.starts_with('[') && text.ends_with(']'))
}

fn minify(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    serde_json::to_string(&value).ok()
}
