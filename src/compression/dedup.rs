//! Layer 1: exact-duplicate removal for assistant messages.
//!
//! Only repeated assistant turns are dropped. System, user and tool messages
//! are never removed, and neither is any assistant message whose tool calls
//! are answered by a later tool message; dropping one would orphan the
//! tool result and most providers reject the transcript.

use super::message::{NormalizedMessage, Role};
use md5::{Digest, Md5};
use std::collections::HashSet;

/// Remove second and later occurrences of identical assistant messages.
/// Returns the surviving messages and the number removed.
pub fn dedup_messages(messages: Vec<NormalizedMessage>) -> (Vec<NormalizedMessage>, usize) {
    // Tool-call ids that some tool message answers.
    let answered: HashSet<String> = messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.clone())
        .collect();

    let mut seen: HashSet<[u8; 16]> = HashSet::new();
    let mut kept = Vec::with_capacity(messages.len());
    let mut removed = 0;

    for msg in messages {
        let protected = msg.role != Role::Assistant
            || msg
                .tool_calls
                .as_deref()
                .map(|calls| calls.iter().any(|c| answered.contains(&c.id)))
                .unwrap_or(false);

        if protected {
            kept.push(msg);
            continue;
        }

        if seen.insert(message_hash(&msg)) {
            kept.push(msg);
        } else {
            removed += 1;
        }
    }

    (kept, removed)
}

/// Stable content hash over every field that affects meaning.
fn message_hash(msg: &NormalizedMessage) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(role_tag(msg.role));
    hasher.update(b"|");
    hasher.update(msg.content.as_deref().unwrap_or(""));
    hasher.update(b"|");
    hasher.update(msg.tool_call_id.as_deref().unwrap_or(""));
    hasher.update(b"|");
    hasher.update(msg.name.as_deref().unwrap_or(""));
    hasher.update(b"|");
    if let Some(calls) = &msg.tool_calls {
        for call in calls {
            hasher.update(&call.id);
            hasher.update(b":");
            hasher.update(&call.function.name);
            hasher.update(b":");
            hasher.update(&call.function.arguments);
            hasher.update(b";");
        }
    }
    hasher.finalize().into()
}

fn role_tag(role: Role) -> &'static [u8] {
    match role {
        Role::System => b"system",
        Role::User => b"user",
        Role::Assistant => b"assistant",
        Role::Tool => b"tool",
    }
}
