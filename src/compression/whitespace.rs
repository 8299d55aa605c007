//! Layer 2: whitespace normalization.

use super::message::NormalizedMessage;
use regex::Regex;
use std::sync::LazyLock;

static BLANK_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static SPACE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"  +").unwrap());

/// Normalize whitespace in every message content. Returns characters saved.
pub fn apply(messages: &mut [NormalizedMessage]) -> usize {
    let mut saved = 0;
    for msg in messages.iter_mut() {
        if let Some(content) = &msg.content {
            let normalized = normalize(content);
            if normalized.len() < content.len() {
                saved += content.len() - normalized.len();
            }
            msg.content = Some(normalized);
        }
    }
    saved
}

/// Line-ending unification, tab expansion, trailing-space strip, deep-indent
/// flattening, interior space collapse, and a two-blank-line cap.
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut lines: Vec<String> = Vec::new();
    for line in unified.split('\n') {
        let line = line.replace('\t', "  ");
        let line = line.trim_end();

        let indent_width = line.len() - line.trim_start_matches(' ').len();
        let body = &line[indent_width..];

        // Deep indentation is renormalized to two spaces per 4-space level.
        let indent = if indent_width >= 8 {
            " ".repeat((indent_width / 4) * 2)
        } else {
            " ".repeat(indent_width)
        };

        let body = SPACE_RUN_RE.replace_all(body, " ");
        lines.push(format!("{}{}", indent, body));
    }

    let joined = lines.join("\n");
    let capped = BLANK_RUN_RE.replace_all(&joined, "\n\n");
    capped.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crlf_unified() {
        assert_eq!(normalize("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_blank_lines_capped_at_two() {
        assert_eq!(normalize("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_trailing_spaces_stripped() {
        assert_eq!(normalize("hello   \nworld  "), "hello\nworld");
    }

    #[test]
    fn test_interior_runs_collapsed() {
        assert_eq!(normalize("a    b     c"), "a b c");
    }

    #[test]
    fn test_shallow_indent_preserved() {
        assert_eq!(normalize("    code here"), "    code here");
    }

    #[test]
    fn test_deep_indent_flattened() {
        // 12 spaces = 3 levels of 4 -> 6 spaces
        assert_eq!(normalize("            x"), "      x");
    }

    #[test]
    fn test_tabs_expanded() {
        assert_eq!(normalize("\tx"), "  x");
    }

    #[test]
    fn test_apply_tracks_savings() {
        let mut messages = vec![NormalizedMessage::user("a    b\n\n\n\nc")];
        let saved = apply(&mut messages);
        assert!(saved > 0);
        assert_eq!(messages[0].content.as_deref(), Some("a b\n\nc"));
    }

    #[test]
    fn test_idempotent() {
        let once = normalize("a    b\r\n\n\n\n   c   ");
        assert_eq!(normalize(&once), once);
    }
}
