use crate::config::{Overrides, Tier};
use crate::scorer::ScoreOutcome;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static STRUCTURED_OUTPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)json|schema|structured").unwrap());

/// Final classification for one request.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub tier: Tier,
    pub confidence: f64,
    pub reasoning: String,
}

pub struct Classifier;

impl Classifier {
    /// Resolve the scorer's outcome into a final tier.
    ///
    /// Precedence, first match wins:
    /// 1. oversized context forces Complex
    /// 2. the scorer's tentative tier
    /// 3. the configured ambiguous default
    /// then the structured-output floor is applied to the result.
    pub fn classify(
        outcome: &ScoreOutcome,
        system: Option<&str>,
        estimated_tokens: usize,
        overrides: &Overrides,
    ) -> Classification {
        let signals = outcome.signals.join(", ");

        let (mut tier, mut confidence, mut reasoning) =
            if estimated_tokens > overrides.max_tokens_force_complex {
                (
                    Tier::Complex,
                    0.95,
                    format!("large context ({} tokens)", estimated_tokens),
                )
            } else if let Some(tier) = outcome.tier {
                (
                    tier,
                    outcome.confidence,
                    format!("score {:.2} [{}]", outcome.score, signals),
                )
            } else {
                (
                    overrides.ambiguous_default_tier,
                    0.5,
                    format!("score {:.2} [{}] ambiguous -> default", outcome.score, signals),
                )
            };

        if let Some(system) = system {
            if STRUCTURED_OUTPUT_RE.is_match(system)
                && tier < overrides.structured_output_min_tier
            {
                tier = overrides.structured_output_min_tier;
                confidence = confidence.max(0.7);
                reasoning.push_str(&format!(
                    "; structured output floor {}",
                    tier.as_str()
                ));
            }
        }

        Classification {
            tier,
            confidence,
            reasoning,
        }
    }
}
