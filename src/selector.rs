use crate::config::{Config, RoutingProfile, Tier, TierMap};
use serde::Serialize;

/// Model choice for one request: the selected model, the remaining ordered
/// chain (selected model first), and the cost picture.
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub model: String,
    pub chain: Vec<String>,
    pub cost_estimate: f64,
    pub baseline_cost: f64,
    /// Fraction of the baseline cost avoided, in [0, 1].
    pub savings: f64,
}

pub struct Selector;

impl Selector {
    /// Pick the model chain for a (tier, profile, agentic) triple and price it.
    pub fn select(
        config: &Config,
        tier: Tier,
        profile: RoutingProfile,
        agentic: bool,
        input_tokens: u64,
        max_output_tokens: u64,
    ) -> Selection {
        let tier_map = Self::tier_map(config, profile, agentic);
        let full_chain = tier_map.get(tier).chain();

        // Drop models whose known context window cannot hold the request
        // with 10% headroom. Unknown windows are kept. If everything is
        // filtered out, keep the full chain: an upstream API error beats
        // refusing to try at all.
        let estimated_total = input_tokens + max_output_tokens;
        let needed = (estimated_total as f64 * 1.1) as u64;
        let filtered: Vec<String> = full_chain
            .iter()
            .filter(|m| {
                config
                    .context_windows
                    .get(m.as_str())
                    .map(|w| *w >= needed)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        let chain = if filtered.is_empty() { full_chain } else { filtered };

        let model = chain[0].clone();
        let cost_estimate =
            Self::cost_of(config, &model, input_tokens, max_output_tokens);
        let baseline_cost = Self::cost_of(
            config,
            &config.baseline_model,
            input_tokens,
            max_output_tokens,
        );

        let savings = if profile == RoutingProfile::Premium {
            0.0
        } else if baseline_cost > 0.0 {
            ((baseline_cost - cost_estimate) / baseline_cost).max(0.0)
        } else {
            0.0
        };

        Selection {
            model,
            chain,
            cost_estimate,
            baseline_cost,
            savings,
        }
    }

    fn tier_map(config: &Config, profile: RoutingProfile, agentic: bool) -> &TierMap {
        let profile_tiers = config.profile(profile);
        if agentic {
            if let Some(agentic_map) = &profile_tiers.agentic_tiers {
                return agentic_map;
            }
        }
        &profile_tiers.tiers
    }

    /// Dollar cost of a request against one model. Unknown pricing is 0;
    /// the config validator has already warned about it.
    pub fn cost_of(
        config: &Config,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> f64 {
        match config.pricing_for(model) {
            Some(p) => {
                input_tokens as f64 * p.input_per_mtok / 1e6
                    + output_tokens as f64 * p.output_per_mtok / 1e6
            }
            None => 0.0,
        }
    }
}
