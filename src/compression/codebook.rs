//! Layer 7: dynamic codebook.
//!
//! Learns phrases repeated across the transcript and replaces them with
//! `$D01`..`$D100` codes. The mapping is emitted in the header so the
//! receiving model can decode in-context.

use super::message::NormalizedMessage;
use std::collections::HashMap;

const MIN_PHRASE_LEN: usize = 20;
const MAX_PHRASE_LEN: usize = 200;
const MIN_OCCURRENCES: usize = 3;
const MAX_ENTRIES: usize = 100;
const MIN_SAVINGS: usize = 50;
const CODE_LEN: usize = 4;

/// Build and apply a learned codebook. Returns the (code, phrase)
/// assignments for the header and characters saved.
pub fn apply(messages: &mut [NormalizedMessage]) -> (Vec<(String, String)>, usize) {
    let combined: String = messages
        .iter()
        .filter_map(|m| m.content.as_deref())
        .collect::<Vec<_>>()
        .join("\n");

    // Candidate phrases are sentence- or line-bounded segments.
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for segment in combined.split(['.', '!', '?', '\n']) {
        let phrase = segment.trim();
        if phrase.len() >= MIN_PHRASE_LEN && phrase.len() <= MAX_PHRASE_LEN {
            *counts.entry(phrase).or_insert(0) += 1;
        }
    }

    let mut candidates: Vec<(&str, usize)> = counts
        .into_iter()
        .filter(|(phrase, count)| {
            *count >= MIN_OCCURRENCES
                && (phrase.len() - CODE_LEN) * count > MIN_SAVINGS
        })
        .collect();
    // Highest savings potential first.
    candidates.sort_by(|a, b| {
        let score_a = (a.0.len() - 4) * a.1;
        let score_b = (b.0.len() - 4) * b.1;
        score_b.cmp(&score_a).then_with(|| a.0.cmp(b.0))
    });

    // Select up to 100 non-overlapping phrases.
    let mut selected: Vec<String> = Vec::new();
    for (phrase, _) in candidates {
        if selected.len() >= MAX_ENTRIES {
            break;
        }
        if selected
            .iter()
            .any(|s| s.contains(phrase) || phrase.contains(s.as_str()))
        {
            continue;
        }
        selected.push(phrase.to_string());
    }

    // Longest-first replacement so no phrase clobbers another's substring.
    let mut codebook: Vec<(String, String)> = selected
        .into_iter()
        .enumerate()
        .map(|(i, phrase)| (format!("$D{:02}", i + 1), phrase))
        .collect();
    codebook.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let mut used: Vec<(String, String)> = Vec::new();
    let mut saved = 0usize;
    for (code, phrase) in &codebook {
        let mut fired = false;
        for msg in messages.iter_mut() {
            if let Some(content) = &msg.content {
                if content.contains(phrase.as_str()) {
                    let replaced = content.replace(phrase.as_str(), code);
                    saved += content.len().saturating_sub(replaced.len());
                    msg.content = Some(replaced);
                    fired = true;
                }
            }
        }
        if fired {
            used.push((code.clone(), phrase.clone()));
        }
    }
    used.sort_by(|a, b| a.0.cmp(&b.0));

    (used, saved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_phrase_learned() {
        let phrase = "the deployment pipeline finished without incident";
        let text = format!("{p}. other words. {p}. more words. {p}.", p = phrase);
        let mut messages = vec![NormalizedMessage::user(&text)];
        let (used, saved) = apply(&mut messages);
        assert_eq!(used.len(), 1);
        assert_eq!(used[0].0, "$D01");
        assert_eq!(used[0].1, phrase);
        assert!(saved > 0);
        let content = messages[0].content.as_deref().unwrap();
        assert!(content.contains("$D01"));
        assert!(!content.contains(phrase));
    }

    #[test]
    fn test_rare_phrases_ignored() {
        let mut messages = vec![NormalizedMessage::user(
            "a one-off sentence that appears exactly once in the transcript.",
        )];
        let (used, saved) = apply(&mut messages);
        assert!(used.is_empty());
        assert_eq!(saved, 0);
    }

    #[test]
    fn test_short_phrases_ignored() {
        // Under 20 chars, never a candidate however often it repeats.
        let text = "tiny phrase. tiny phrase. tiny phrase. tiny phrase.";
        let mut messages = vec![NormalizedMessage::user(text)];
        let (used, _) = apply(&mut messages);
        assert!(used.is_empty());
    }

    #[test]
    fn test_codes_zero_padded() {
        let mut text = String::new();
        for i in 0..3 {
            let phrase = format!("unique repeated phrase number {i} with padding text");
            for _ in 0..4 {
                text.push_str(&phrase);
                text.push_str(". ");
            }
        }
        let mut messages = vec![NormalizedMessage::user(&text)];
        let (used, _) = apply(&mut messages);
        assert_eq!(used.len(), 3);
        assert!(used.iter().all(|(c, _)| c.starts_with("$D0")));
    }

    #[test]
    fn test_replacement_spans_messages() {
        let phrase = "shared phrase across multiple messages here";
        let mut messages = vec![
            NormalizedMessage::user(&format!("{phrase}.")),
            NormalizedMessage::assistant(&format!("{phrase}.")),
            NormalizedMessage::user(&format!("{phrase}.")),
        ];
        let (used, _) = apply(&mut messages);
        assert_eq!(used.len(), 1);
        for msg in &messages {
            assert!(msg.content.as_deref().unwrap().contains("$D01"));
        }
    }
}
