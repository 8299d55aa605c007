//! Reversible context-compression pipeline.
//!
//! Seven layers, each independently switchable:
//!
//! 1. assistant-message dedup
//! 2. whitespace normalization
//! 3. static dictionary
//! 4. path-prefix shortening
//! 5. JSON compaction
//! 6. tool-observation summarization (approximate, default-off)
//! 7. dynamic codebook
//!
//! Layers 3, 4 and 7 emit a human-readable codebook header that is
//! prepended to the first user message so the receiving model can decode
//! in-context. The system message is left alone; providers treat it
//! differently and some reject modified system prompts.

pub mod codebook;
pub mod dedup;
pub mod dictionary;
pub mod json_compact;
pub mod message;
pub mod observations;
pub mod paths;
pub mod whitespace;

use crate::config::CompressionConfig;
use dictionary::StaticDictionary;
use message::{total_content_bytes, NormalizedMessage, Role};
use serde::Serialize;

/// Per-layer savings, for logs and the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StageSavings {
    pub name: &'static str,
    pub chars_saved: usize,
}

/// Result of one compression pass.
#[derive(Debug, Clone, Serialize)]
pub struct CompressionOutcome {
    #[serde(skip)]
    pub messages: Vec<NormalizedMessage>,
    pub chars_before: usize,
    pub chars_after: usize,
    pub messages_removed: usize,
    pub stages: Vec<StageSavings>,
}

/// Skip compression entirely for small payloads; the header overhead and
/// the work are not worth it.
pub fn should_compress(messages: &[NormalizedMessage], min_payload_bytes: usize) -> bool {
    total_content_bytes(messages) >= min_payload_bytes
}

pub struct CompressionPipeline {
    config: CompressionConfig,
    static_dict: StaticDictionary,
}

impl CompressionPipeline {
    pub fn new(config: CompressionConfig) -> Self {
        Self {
            config,
            static_dict: StaticDictionary::default(),
        }
    }

    /// Run every enabled layer in order and prepend the codebook header.
    pub fn compress(&self, messages: Vec<NormalizedMessage>) -> CompressionOutcome {
        let chars_before = total_content_bytes(&messages);
        let mut stages: Vec<StageSavings> = Vec::new();
        let mut current = messages;
        let mut messages_removed = 0;

        if self.config.enable_dedup {
            let before = total_content_bytes(&current);
            let (kept, removed) = dedup::dedup_messages(current);
            current = kept;
            messages_removed = removed;
            stages.push(StageSavings {
                name: "dedup",
                chars_saved: before.saturating_sub(total_content_bytes(&current)),
            });
        }

        if self.config.enable_whitespace {
            let saved = whitespace::apply(&mut current);
            stages.push(StageSavings {
                name: "whitespace",
                chars_saved: saved,
            });
        }

        let mut dict_used: Vec<(String, String)> = Vec::new();
        if self.config.enable_static_dictionary {
            let (used, saved) = self.static_dict.apply(&mut current);
            dict_used = used;
            stages.push(StageSavings {
                name: "dictionary",
                chars_saved: saved,
            });
        }

        let mut paths_used: Vec<(String, String)> = Vec::new();
        if self.config.enable_path_prefix {
            let (used, saved) = paths::apply(&mut current);
            paths_used = used;
            stages.push(StageSavings {
                name: "paths",
                chars_saved: saved,
            });
        }

        if self.config.enable_json_compact {
            let saved = json_compact::apply(&mut current);
            stages.push(StageSavings {
                name: "json_compact",
                chars_saved: saved,
            });
        }

        if self.config.enable_tool_observations {
            let saved =
                observations::apply(&mut current, self.config.tool_observation_threshold);
            stages.push(StageSavings {
                name: "observations",
                chars_saved: saved,
            });
        }

        let mut dyn_used: Vec<(String, String)> = Vec::new();
        if self.config.enable_dynamic_codebook {
            let (used, saved) = codebook::apply(&mut current);
            dyn_used = used;
            stages.push(StageSavings {
                name: "codebook",
                chars_saved: saved,
            });
        }

        if let Some(header) = build_header(&dict_used, &paths_used, &dyn_used) {
            if let Some(first_user) = current.iter_mut().find(|m| m.role == Role::User) {
                let body = first_user.content.take().unwrap_or_default();
                first_user.content = Some(format!("{}\n{}", header, body));
            }
        }

        let chars_after = total_content_bytes(&current);
        tracing::debug!(
            chars_before,
            chars_after,
            messages_removed,
            "compression pass finished"
        );

        CompressionOutcome {
            messages: current,
            chars_before,
            chars_after,
            messages_removed,
            stages,
        }
    }
}

const MAX_DYN_HEADER_ENTRIES: usize = 20;
const DYN_HEADER_PHRASE_CHARS: usize = 40;

/// Assemble the codebook header block, or None when no codes fired.
fn build_header(
    dict_used: &[(String, String)],
    paths_used: &[(String, String)],
    dyn_used: &[(String, String)],
) -> Option<String> {
    let mut lines: Vec<String> = Vec::new();

    if !dict_used.is_empty() {
        let entries: Vec<String> = dict_used
            .iter()
            .map(|(code, phrase)| format!("{}={}", code, phrase))
            .collect();
        lines.push(format!("[Dict: {}]", entries.join(", ")));
    }

    if !paths_used.is_empty() {
        let entries: Vec<String> = paths_used
            .iter()
            .map(|(code, prefix)| format!("{}={}", code, prefix))
            .collect();
        lines.push(format!("[Paths: {}]", entries.join(", ")));
    }

    if !dyn_used.is_empty() {
        // Bounded: at most 20 entries, phrases clipped to 40 chars.
        let entries: Vec<String> = dyn_used
            .iter()
            .take(MAX_DYN_HEADER_ENTRIES)
            .map(|(code, phrase)| {
                let mut p = phrase.clone();
                if p.len() > DYN_HEADER_PHRASE_CHARS {
                    let mut end = DYN_HEADER_PHRASE_CHARS;
                    while !p.is_char_boundary(end) {
                        end -= 1;
                    }
                    p.truncate(end);
                }
                format!("{}={}", code, p)
            })
            .collect();
        lines.push(format!("[DynDict: {}]", entries.join(", ")));
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
