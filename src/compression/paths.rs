//! Layer 4: filesystem path-prefix shortening.
//!
//! Long repeated directory prefixes are replaced with `$P1`..`$P5` codes.

use super::message::NormalizedMessage;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Path-like substring: three or more slash-separated components.
static PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:/[\w@.-]+){3,}/?").unwrap());

const MAX_PREFIXES: usize = 5;
const MIN_OCCURRENCES: usize = 3;

/// Shorten repeated path prefixes. Returns the (code, prefix) assignments
/// for the header and characters saved.
pub fn apply(messages: &mut [NormalizedMessage]) -> (Vec<(String, String)>, usize) {
    // Count every proper prefix of at least two components.
    let mut counts: HashMap<String, usize> = HashMap::new();
    for msg in messages.iter() {
        let Some(content) = &msg.content else { continue };
        for m in PATH_RE.find_iter(content) {
            let components: Vec<&str> = m
                .as_str()
                .split('/')
                .filter(|c| !c.is_empty())
                .collect();
            for k in 2..components.len() {
                let prefix = format!("/{}/", components[..k].join("/"));
                *counts.entry(prefix).or_insert(0) += 1;
            }
        }
    }

    // Rank by characters saved; skip prefixes overlapping a chosen one.
    let mut candidates: Vec<(String, usize)> = counts
        .into_iter()
        .filter(|(_, count)| *count >= MIN_OCCURRENCES)
        .collect();
    candidates.sort_by(|a, b| (b.1 * b.0.len()).cmp(&(a.1 * a.0.len())));

    let mut chosen: Vec<String> = Vec::new();
    for (prefix, _) in candidates {
        if chosen.len() >= MAX_PREFIXES {
            break;
        }
        if chosen
            .iter()
            .any(|c| c.starts_with(&prefix) || prefix.starts_with(c.as_str()))
        {
            continue;
        }
        chosen.push(prefix);
    }

    let mut used: Vec<(String, String)> = Vec::new();
    let mut saved = 0usize;
    for (i, prefix) in chosen.iter().enumerate() {
        let code = format!("$P{}", i + 1);
        let replacement = format!("{}/", code);
        let mut fired = false;
        for msg in messages.iter_mut() {
            if let Some(content) = &msg.content {
                if content.contains(prefix.as_str()) {
                    let replaced = content.replace(prefix.as_str(), &replacement);
                    saved += content.len().saturating_sub(replaced.len());
                    msg.content = Some(replaced);
                    fired = true;
                }
            }
        }
        if fired {
            used.push((code, prefix.clone()));
        }
    }

    (used, saved)
}
