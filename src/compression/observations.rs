//! Layer 6: tool-observation compression (approximate).
//!
//! Long tool outputs are reduced to a short summary of their error lines,
//! status lines and important key/value pairs. Repeated large blocks are
//! collapsed to a back-reference. This layer loses detail and ships
//! disabled; it only runs when explicitly enabled.

use super::message::{NormalizedMessage, Role};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static ERROR_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error|exception|failed|fatal|denied|timeout|refused|invalid").unwrap()
});

static STATUS_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)success|complete|found|created|updated|deleted|passed|done|ok\b").unwrap()
});

static KV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(id|name|status|error|message|count|total|url|path)"\s*:\s*"([^"]{1,80})""#)
        .unwrap()
});

const MAX_SUMMARY_CHARS: usize = 300;
const BLOCK_PREFIX_BYTES: usize = 200;

/// Summarize long tool outputs and collapse repeated blocks.
/// Returns characters saved.
pub fn apply(messages: &mut [NormalizedMessage], threshold: usize) -> usize {
    let mut saved = 0usize;

    // Pass 1: repeated-block detection over the first 200 bytes of large
    // tool outputs. Later occurrences become a back-reference.
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    for i in 0..messages.len() {
        if messages[i].role != Role::Tool {
            continue;
        }
        let Some(content) = messages[i].content.clone() else { continue };
        if content.len() <= threshold {
            continue;
        }
        let prefix = clip(&content, BLOCK_PREFIX_BYTES);
        match first_seen.get(&prefix) {
            Some(&k) => {
                let marker = format!("[See message #{} - same content]", k + 1);
                saved += content.len().saturating_sub(marker.len());
                messages[i].content = Some(marker);
            }
            None => {
                first_seen.insert(prefix, i);
            }
        }
    }

    // Pass 2: summarize whatever is still long.
    for msg in messages.iter_mut() {
        if msg.role != Role::Tool {
            continue;
        }
        let Some(content) = &msg.content else { continue };
        if content.len() <= threshold {
            continue;
        }
        let summary = summarize(content);
        if summary.len() < content.len() {
            saved += content.len() - summary.len();
            msg.content = Some(summary);
        }
    }

    saved
}

/// Build a compact summary: up to 3 error lines, 3 status lines, 5 important
/// key/value pairs, with a first/last-line fallback when nothing matches.
fn summarize(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let mut parts: Vec<String> = Vec::new();

    let mut error_lines = 0;
    for line in &lines {
        if error_lines >= 3 {
            break;
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() && ERROR_LINE_RE.is_match(trimmed) {
            parts.push(clip(trimmed, 80));
            error_lines += 1;
        }
    }

    let mut status_lines = 0;
    for line in &lines {
        if status_lines >= 3 {
            break;
        }
        let trimmed = line.trim();
        if !trimmed.is_empty()
            && STATUS_LINE_RE.is_match(trimmed)
            && !ERROR_LINE_RE.is_match(trimmed)
        {
            parts.push(clip(trimmed, 80));
            status_lines += 1;
        }
    }

    for (i, cap) in KV_RE.captures_iter(content).enumerate() {
        if i >= 5 {
            break;
        }
        parts.push(format!("{}={}", &cap[1], &cap[2]));
    }

    if parts.is_empty() {
        let first = lines.first().map(|l| clip(l.trim(), 80)).unwrap_or_default();
        let last = lines.last().map(|l| clip(l.trim(), 80)).unwrap_or_default();
        parts.push(first);
        if lines.len() > 2 {
            parts.push(format!("[...{} lines...]", lines.len() - 2));
        }
        if lines.len() > 1 {
            parts.push(last);
        }
    }

    clip(&parts.join("\n"), MAX_SUMMARY_CHARS)
}

fn clip(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
