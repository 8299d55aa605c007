//! Layer 3: static dictionary.
//!
//! A fixed codebook of phrases common in agent transcripts, replaced with
//! short `$C` codes. The receiving model decodes in-context from the header
//! emitted by the pipeline.

use super::message::NormalizedMessage;

/// Fixed code → phrase table, held in descending phrase length so longer
/// phrases are replaced before their substrings.
pub struct StaticDictionary {
    entries: Vec<(&'static str, &'static str)>,
}

const PHRASES: &[(&str, &str)] = &[
    ("$C1", "the following"),
    ("$C2", "for example"),
    ("$C3", "in order to"),
    ("$C4", "please provide"),
    ("$C5", "error message"),
    ("$C6", "function call"),
    ("$C7", "file path"),
    ("$C8", "as shown below"),
    ("$C9", "the output of"),
    ("$C10", "implementation of"),
    ("$C11", "make sure that"),
    ("$C12", "repository"),
    ("$C13", "configuration"),
    ("$C14", "environment variable"),
    ("$C15", "dependencies"),
];

impl Default for StaticDictionary {
    fn default() -> Self {
        let mut entries: Vec<(&'static str, &'static str)> = PHRASES.to_vec();
        entries.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        Self { entries }
    }
}

impl StaticDictionary {
    /// Replace phrase occurrences with codes. Returns the (code, phrase)
    /// pairs that fired at least once, for the header, and characters saved.
    pub fn apply(
        &self,
        messages: &mut [NormalizedMessage],
    ) -> (Vec<(String, String)>, usize) {
        let mut used: Vec<(String, String)> = Vec::new();
        let mut saved = 0usize;

        for (code, phrase) in &self.entries {
            let mut fired = false;
            for msg in messages.iter_mut() {
                if let Some(content) = &msg.content {
                    if content.contains(phrase) {
                        let replaced = content.replace(phrase, code);
                        saved += content.len().saturating_sub(replaced.len());
                        msg.content = Some(replaced);
                        fired = true;
                    }
                }
            }
            if fired {
                used.push((code.to_string(), phrase.to_string()));
            }
        }

        (used, saved)
    }
}
