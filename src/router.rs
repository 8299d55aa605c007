use crate::classifier::Classifier;
use crate::config::{Config, RoutingProfile, Tier};
use crate::scorer::Scorer;
use crate::selector::Selector;
use serde::Serialize;

/// How a decision was made. Rules is the only active method; LlmFallback is
/// reserved for deployments that escalate ambiguous requests to a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteMethod {
    Rules,
    LlmFallback,
}

/// The complete routing decision for one request. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub model: String,
    pub tier: Tier,
    pub confidence: f64,
    pub method: RouteMethod,
    pub reasoning: String,
    pub cost_estimate: f64,
    pub baseline_cost: f64,
    pub savings: f64,
    /// Ordered fallback chain, selected model first.
    pub chain: Vec<String>,
    pub profile: RoutingProfile,
    pub agentic: bool,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RouteOptions {
    pub profile: Option<RoutingProfile>,
    pub agentic: Option<bool>,
}

pub struct Router;

impl Router {
    /// Classify a prompt and choose the cheapest capable model.
    pub fn route(
        config: &Config,
        prompt: &str,
        system: Option<&str>,
        max_output_tokens: u64,
        opts: RouteOptions,
    ) -> RoutingDecision {
        let profile = opts.profile.unwrap_or(RoutingProfile::Auto);
        let estimated_tokens =
            (prompt.len() + system.map(str::len).unwrap_or(0)).div_ceil(4);

        let outcome = Scorer::score(prompt, system, estimated_tokens, &config.scorer);
        let classification =
            Classifier::classify(&outcome, system, estimated_tokens, &config.overrides);

        let agentic = opts.agentic.unwrap_or(
            config.overrides.agentic_mode
                || outcome.agentic_score >= config.scorer.agentic_threshold,
        );

        let selection = Selector::select(
            config,
            classification.tier,
            profile,
            agentic,
            estimated_tokens as u64,
            max_output_tokens,
        );

        tracing::debug!(
            model = %selection.model,
            tier = classification.tier.as_str(),
            profile = profile.as_str(),
            agentic,
            score = outcome.score,
            confidence = classification.confidence,
            savings = selection.savings,
            "routing decision"
        );

        RoutingDecision {
            model: selection.model,
            tier: classification.tier,
            confidence: classification.confidence,
            method: RouteMethod::Rules,
            reasoning: classification.reasoning,
            cost_estimate: selection.cost_estimate,
            baseline_cost: selection.baseline_cost,
            savings: selection.savings,
            chain: selection.chain,
            profile,
            agentic,
            score: outcome.score,
        }
    }

    /// Build a decision for an explicitly named model, bypassing
    /// classification. The chain is the tier chain that lists the model
    /// (re-headed with it), or the auto Medium chain when no tier does.
    pub fn route_explicit(
        config: &Config,
        model: &str,
        input_tokens: u64,
        max_output_tokens: u64,
    ) -> Option<RoutingDecision> {
        if !config.knows_model(model) {
            return None;
        }

        let mut tier = Tier::Medium;
        let mut tail: Vec<String> = Vec::new();
        'search: for profile in [&config.auto, &config.premium, &config.eco, &config.free] {
            for (t, tc) in profile.tiers.iter() {
                let chain = tc.chain();
                if chain.iter().any(|m| m == model) {
                    tier = t;
                    tail = chain.into_iter().filter(|m| m != model).collect();
                    break 'search;
                }
            }
        }
        if tail.is_empty() {
            tail = config
                .auto
                .tiers
                .medium
                .chain()
                .into_iter()
                .filter(|m| m != model)
                .collect();
        }

        let mut chain = Vec::with_capacity(1 + tail.len());
        chain.push(model.to_string());
        chain.extend(tail);

        let cost_estimate = Selector::cost_of(config, model, input_tokens, max_output_tokens);
        let baseline_cost = Selector::cost_of(
            config,
            &config.baseline_model,
            input_tokens,
            max_output_tokens,
        );
        let savings = if baseline_cost > 0.0 {
            ((baseline_cost - cost_estimate) / baseline_cost).max(0.0)
        } else {
            0.0
        };

        Some(RoutingDecision {
            model: model.to_string(),
            tier,
            confidence: 1.0,
            method: RouteMethod::Rules,
            reasoning: "explicit model".to_string(),
            cost_estimate,
            baseline_cost,
            savings,
            chain,
            profile: RoutingProfile::Auto,
            agentic: false,
            score: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_prompt_routes_cheap() {
        let config = Config::default();
        let decision = Router::route(&config, "Hi", None, 50, RouteOptions::default());
        assert!(matches!(decision.tier, Tier::Simple | Tier::Medium));
        assert_eq!(decision.method, RouteMethod::Rules);
        assert!(decision.savings > 0.0);
    }

    #[test]
    fn test_reasoning_prompt_routes_reasoning_chain() {
        let config = Config::default();
        let decision = Router::route(
            &config,
            "Prove step by step that sqrt(2) is irrational",
            None,
            2048,
            RouteOptions::default(),
        );
        assert_eq!(decision.tier, Tier::Reasoning);
        assert_eq!(decision.chain[0], config.auto.tiers.reasoning.primary);
        assert!(decision.chain.len() >= 2);
    }

    #[test]
    fn test_premium_profile_reports_zero_savings() {
        let config = Config::default();
        let decision = Router::route(
            &config,
            "Summarize this paragraph",
            None,
            512,
            RouteOptions {
                profile: Some(RoutingProfile::Premium),
                agentic: None,
            },
        );
        assert_eq!(decision.savings, 0.0);
        assert_eq!(decision.profile, RoutingProfile::Premium);
    }

    #[test]
    fn test_agentic_prompt_switches_chain() {
        let config = Config::default();
        let decision = Router::route(
            &config,
            "Read the file, then edit the code, fix the bug, deploy it, \
             and make sure the tests pass. After that, verify the output.",
            None,
            2048,
            RouteOptions::default(),
        );
        assert!(decision.agentic);
        let agentic_map = config.auto.agentic_tiers.as_ref().unwrap();
        assert_eq!(decision.model, agentic_map.get(decision.tier).primary);
    }

    #[test]
    fn test_decision_is_logged_with_reasoning() {
        let config = Config::default();
        let decision = Router::route(&config, "Hi", None, 10, RouteOptions::default());
        assert!(!decision.reasoning.is_empty());
    }

    #[test]
    fn test_explicit_known_model() {
        let config = Config::default();
        let decision = Router::route_explicit(&config, "openai/gpt-5.2-codex", 1000, 500)
            .expect("model is in the catalog");
        assert_eq!(decision.model, "openai/gpt-5.2-codex");
        assert_eq!(decision.chain[0], "openai/gpt-5.2-codex");
        // Chain keeps fallbacks from the tier that lists the model.
        assert!(decision.chain.len() >= 2);
        assert!(!decision.chain[1..].contains(&"openai/gpt-5.2-codex".to_string()));
    }

    #[test]
    fn test_explicit_unknown_model_rejected() {
        let config = Config::default();
        assert!(Router::route_explicit(&config, "nope/unknown", 1000, 500).is_none());
    }

    #[test]
    fn test_savings_invariant() {
        let config = Config::default();
        for prompt in ["Hi", "Write a function to parse JSON in Rust"] {
            let d = Router::route(&config, prompt, None, 256, RouteOptions::default());
            assert!(d.savings >= 0.0);
            assert!(d.baseline_cost >= d.cost_estimate || d.baseline_cost == 0.0);
        }
    }
}
