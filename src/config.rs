use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Tiers and profiles
// ---------------------------------------------------------------------------

/// Complexity tier. Total order: Simple < Medium < Complex < Reasoning.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Simple,
    Medium,
    Complex,
    Reasoning,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Simple => "simple",
            Tier::Medium => "medium",
            Tier::Complex => "complex",
            Tier::Reasoning => "reasoning",
        }
    }
}

/// Routing profile selected via the request's `model` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingProfile {
    Free,
    Eco,
    Auto,
    Premium,
}

impl RoutingProfile {
    /// Parse a profile from a request `model` value.
    pub fn from_model(model: &str) -> Option<Self> {
        match model {
            "free" => Some(Self::Free),
            "eco" => Some(Self::Eco),
            "auto" => Some(Self::Auto),
            "premium" => Some(Self::Premium),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Eco => "eco",
            Self::Auto => "auto",
            Self::Premium => "premium",
        }
    }
}

// ---------------------------------------------------------------------------
// Models and pricing
// ---------------------------------------------------------------------------

/// Per-model pricing in $ per million tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

/// Primary model plus ordered fallbacks for one tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    pub primary: String,
    #[serde(default)]
    pub fallback: Vec<String>,
}

impl TierConfig {
    fn new(primary: &str, fallback: &[&str]) -> Self {
        Self {
            primary: primary.to_string(),
            fallback: fallback.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Full chain: primary first, then fallbacks in order.
    pub fn chain(&self) -> Vec<String> {
        let mut chain = Vec::with_capacity(1 + self.fallback.len());
        chain.push(self.primary.clone());
        chain.extend(self.fallback.iter().cloned());
        chain
    }
}

/// One TierConfig per tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierMap {
    pub simple: TierConfig,
    pub medium: TierConfig,
    pub complex: TierConfig,
    pub reasoning: TierConfig,
}

impl TierMap {
    pub fn get(&self, tier: Tier) -> &TierConfig {
        match tier {
            Tier::Simple => &self.simple,
            Tier::Medium => &self.medium,
            Tier::Complex => &self.complex,
            Tier::Reasoning => &self.reasoning,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tier, &TierConfig)> {
        [
            (Tier::Simple, &self.simple),
            (Tier::Medium, &self.medium),
            (Tier::Complex, &self.complex),
            (Tier::Reasoning, &self.reasoning),
        ]
        .into_iter()
    }
}

/// Tier configuration for one routing profile. `agentic_tiers` applies when
/// the agentic score crosses threshold and the set is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileTiers {
    pub tiers: TierMap,
    #[serde(default)]
    pub agentic_tiers: Option<TierMap>,
}

// ---------------------------------------------------------------------------
// Scorer configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    pub weights: ScorerWeights,
    pub tier_boundaries: TierBoundaries,
    pub token_thresholds: TokenThresholds,
    /// Neutral band around each boundary inside which the scorer declines
    /// to propose a tier.
    pub ambiguity_epsilon: f64,
    /// Agentic score at or above this selects the agentic tier set.
    pub agentic_threshold: f64,
    pub confidence_steepness: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerWeights {
    pub token_count: f64,
    pub code_presence: f64,
    pub reasoning_markers: f64,
    pub technical_terms: f64,
    pub creative_markers: f64,
    pub simple_indicators: f64,
    pub multi_step_patterns: f64,
    pub question_complexity: f64,
    pub imperative_verbs: f64,
    pub constraint_count: f64,
    pub output_format: f64,
    pub reference_complexity: f64,
    pub negation_complexity: f64,
    pub domain_specificity: f64,
    pub agentic_task: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierBoundaries {
    pub simple_medium: f64,
    pub medium_complex: f64,
    pub complex_reasoning: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenThresholds {
    pub short_upper: usize,
    pub long_lower: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            weights: ScorerWeights::default(),
            tier_boundaries: TierBoundaries::default(),
            token_thresholds: TokenThresholds::default(),
            ambiguity_epsilon: 0.02,
            agentic_threshold: 0.5,
            confidence_steepness: 12.0,
        }
    }
}

impl Default for ScorerWeights {
    fn default() -> Self {
        Self {
            token_count: 0.08,
            code_presence: 0.15,
            reasoning_markers: 0.18,
            technical_terms: 0.10,
            creative_markers: 0.05,
            simple_indicators: 0.02,
            multi_step_patterns: 0.12,
            question_complexity: 0.05,
            imperative_verbs: 0.03,
            constraint_count: 0.04,
            output_format: 0.03,
            reference_complexity: 0.02,
            negation_complexity: 0.01,
            domain_specificity: 0.02,
            agentic_task: 0.04,
        }
    }
}

impl Default for TierBoundaries {
    fn default() -> Self {
        Self {
            simple_medium: 0.05,
            medium_complex: 0.35,
            complex_reasoning: 0.60,
        }
    }
}

impl Default for TokenThresholds {
    fn default() -> Self {
        Self {
            short_upper: 500,
            long_lower: 3000,
        }
    }
}

// ---------------------------------------------------------------------------
// Classifier overrides
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Overrides {
    /// Estimated token count above which the tier is forced to Complex.
    pub max_tokens_force_complex: usize,
    /// Minimum tier when the system prompt requests structured output.
    pub structured_output_min_tier: Tier,
    /// Tier used when the scorer declines to propose one.
    pub ambiguous_default_tier: Tier,
    /// Force agentic tier selection for every request.
    pub agentic_mode: bool,
}

impl Default for Overrides {
    fn default() -> Self {
        Self {
            max_tokens_force_complex: 100_000,
            structured_output_min_tier: Tier::Medium,
            ambiguous_default_tier: Tier::Medium,
            agentic_mode: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Compression, dedup, dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enable_dedup: bool,
    pub enable_whitespace: bool,
    pub enable_static_dictionary: bool,
    pub enable_path_prefix: bool,
    pub enable_json_compact: bool,
    /// Approximate layer; summarizes long tool outputs. Off by default.
    pub enable_tool_observations: bool,
    pub enable_dynamic_codebook: bool,
    /// Payloads under this many bytes are never compressed.
    pub min_payload_bytes: usize,
    /// Tool message contents longer than this are summarized by the
    /// observation layer.
    pub tool_observation_threshold: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        // Default-safe set: only the semantically lossless cheap layers.
        Self {
            enable_dedup: true,
            enable_whitespace: true,
            enable_static_dictionary: false,
            enable_path_prefix: false,
            enable_json_compact: true,
            enable_tool_observations: false,
            enable_dynamic_codebook: false,
            min_payload_bytes: 5 * 1024,
            tool_observation_threshold: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    pub ttl_seconds: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { ttl_seconds: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub max_request_size_kb: usize,
    pub compression_threshold_kb: usize,
    pub auto_compress_requests: bool,
    pub max_fallback_attempts: usize,
    pub upstream_timeout_seconds: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_request_size_kb: 512,
            compression_threshold_kb: 100,
            auto_compress_requests: true,
            max_fallback_attempts: 3,
            upstream_timeout_seconds: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub free: ProfileTiers,
    pub eco: ProfileTiers,
    pub auto: ProfileTiers,
    pub premium: ProfileTiers,
    /// $/Mtok pricing keyed by `provider/model-name`.
    pub pricing: HashMap<String, ModelPricing>,
    /// Known context windows in tokens. Models absent here are never
    /// filtered out by the context-window check.
    pub context_windows: HashMap<String, u64>,
    /// Premium reference model whose pricing denominates savings.
    pub baseline_model: String,
    /// Free model attempted once after the fallback chain is exhausted.
    pub emergency_model: String,
    pub upstream_url: String,
    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub overrides: Overrides,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl Config {
    pub fn profile(&self, profile: RoutingProfile) -> &ProfileTiers {
        match profile {
            RoutingProfile::Free => &self.free,
            RoutingProfile::Eco => &self.eco,
            RoutingProfile::Auto => &self.auto,
            RoutingProfile::Premium => &self.premium,
        }
    }

    pub fn pricing_for(&self, model: &str) -> Option<ModelPricing> {
        self.pricing.get(model).copied()
    }

    /// True if the model appears in the catalog.
    pub fn knows_model(&self, model: &str) -> bool {
        self.pricing.contains_key(model)
    }

    /// Every model id referenced by any tier config, deduplicated.
    pub fn referenced_models(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        for profile in [&self.free, &self.eco, &self.auto, &self.premium] {
            let maps = std::iter::once(&profile.tiers).chain(profile.agentic_tiers.iter());
            for map in maps {
                for (_, tc) in map.iter() {
                    seen.insert(tc.primary.clone());
                    seen.extend(tc.fallback.iter().cloned());
                }
            }
        }
        seen.into_iter().collect()
    }

    /// Check structural invariants, emitting a diagnostic per violation.
    /// Returns the number of problems found.
    pub fn validate(&self) -> usize {
        let mut problems = 0;

        for (name, profile) in [
            ("free", &self.free),
            ("eco", &self.eco),
            ("auto", &self.auto),
            ("premium", &self.premium),
        ] {
            let maps = std::iter::once(("tiers", &profile.tiers)).chain(
                profile.agentic_tiers.iter().map(|m| ("agentic_tiers", m)),
            );
            for (map_name, map) in maps {
                for (tier, tc) in map.iter() {
                    if tc.fallback.is_empty() {
                        tracing::warn!(
                            profile = name,
                            map = map_name,
                            tier = tier.as_str(),
                            "tier has an empty fallback list"
                        );
                        problems += 1;
                    }
                    if tc.fallback.contains(&tc.primary) {
                        tracing::warn!(
                            profile = name,
                            map = map_name,
                            tier = tier.as_str(),
                            primary = %tc.primary,
                            "primary is listed in its own fallback chain"
                        );
                        problems += 1;
                    }
                    let mut seen = std::collections::HashSet::new();
                    for model in &tc.fallback {
                        if !seen.insert(model) {
                            tracing::warn!(
                                profile = name,
                                tier = tier.as_str(),
                                model = %model,
                                "duplicate model in fallback chain"
                            );
                            problems += 1;
                        }
                    }
                }
            }
        }

        for model in self.referenced_models() {
            if !self.pricing.contains_key(&model) {
                tracing::warn!(model = %model, "no pricing entry; cost estimates will be 0");
                problems += 1;
            }
        }

        if !self.pricing.contains_key(&self.baseline_model) {
            tracing::warn!(model = %self.baseline_model, "baseline model has no pricing entry");
            problems += 1;
        }

        problems
    }
}

impl Default for Config {
    fn default() -> Self {
        let pricing = HashMap::from([
            pricing_entry("nvidia/gpt-oss-120b", 0.0, 0.0),
            pricing_entry("deepseek/deepseek-chat", 0.14, 0.28),
            pricing_entry("google/gemini-2.5-flash", 0.15, 0.60),
            pricing_entry("xai/grok-code-fast-1", 0.20, 1.50),
            pricing_entry("xai/grok-4-1-fast-reasoning", 0.40, 3.00),
            pricing_entry("moonshot/kimi-k2.5", 0.55, 2.20),
            pricing_entry("anthropic/claude-haiku-4.5", 1.00, 5.00),
            pricing_entry("google/gemini-3-pro-preview", 2.00, 12.00),
            pricing_entry("openai/gpt-5.2-codex", 2.50, 12.00),
            pricing_entry("anthropic/claude-sonnet-4.6", 3.00, 15.00),
            pricing_entry("anthropic/claude-opus-4.6", 5.00, 25.00),
        ]);

        let context_windows = HashMap::from([
            ("nvidia/gpt-oss-120b".to_string(), 128_000u64),
            ("deepseek/deepseek-chat".to_string(), 128_000),
            ("google/gemini-2.5-flash".to_string(), 1_000_000),
            ("xai/grok-code-fast-1".to_string(), 256_000),
            ("xai/grok-4-1-fast-reasoning".to_string(), 2_000_000),
            ("moonshot/kimi-k2.5".to_string(), 256_000),
            ("anthropic/claude-haiku-4.5".to_string(), 200_000),
            ("google/gemini-3-pro-preview".to_string(), 1_000_000),
            ("openai/gpt-5.2-codex".to_string(), 400_000),
            ("anthropic/claude-sonnet-4.6".to_string(), 200_000),
            ("anthropic/claude-opus-4.6".to_string(), 200_000),
        ]);

        Self {
            free: ProfileTiers {
                tiers: TierMap {
                    simple: TierConfig::new(
                        "nvidia/gpt-oss-120b",
                        &["deepseek/deepseek-chat", "google/gemini-2.5-flash"],
                    ),
                    medium: TierConfig::new(
                        "nvidia/gpt-oss-120b",
                        &["deepseek/deepseek-chat", "google/gemini-2.5-flash"],
                    ),
                    complex: TierConfig::new(
                        "nvidia/gpt-oss-120b",
                        &["deepseek/deepseek-chat", "google/gemini-2.5-flash"],
                    ),
                    reasoning: TierConfig::new(
                        "nvidia/gpt-oss-120b",
                        &["deepseek/deepseek-chat", "xai/grok-4-1-fast-reasoning"],
                    ),
                },
                agentic_tiers: None,
            },
            eco: ProfileTiers {
                tiers: TierMap {
                    simple: TierConfig::new(
                        "nvidia/gpt-oss-120b",
                        &["deepseek/deepseek-chat", "google/gemini-2.5-flash"],
                    ),
                    medium: TierConfig::new(
                        "google/gemini-2.5-flash",
                        &["moonshot/kimi-k2.5"],
                    ),
                    complex: TierConfig::new(
                        "google/gemini-2.5-flash",
                        &["moonshot/kimi-k2.5", "google/gemini-3-pro-preview"],
                    ),
                    reasoning: TierConfig::new(
                        "xai/grok-4-1-fast-reasoning",
                        &["google/gemini-3-pro-preview"],
                    ),
                },
                agentic_tiers: None,
            },
            auto: ProfileTiers {
                tiers: TierMap {
                    simple: TierConfig::new(
                        "google/gemini-2.5-flash",
                        &["moonshot/kimi-k2.5", "anthropic/claude-haiku-4.5"],
                    ),
                    medium: TierConfig::new(
                        "xai/grok-code-fast-1",
                        &["moonshot/kimi-k2.5", "anthropic/claude-haiku-4.5"],
                    ),
                    complex: TierConfig::new(
                        "google/gemini-3-pro-preview",
                        &["openai/gpt-5.2-codex", "anthropic/claude-sonnet-4.6"],
                    ),
                    reasoning: TierConfig::new(
                        "xai/grok-4-1-fast-reasoning",
                        &["google/gemini-3-pro-preview", "anthropic/claude-opus-4.6"],
                    ),
                },
                agentic_tiers: Some(TierMap {
                    simple: TierConfig::new(
                        "anthropic/claude-haiku-4.5",
                        &["anthropic/claude-sonnet-4.6"],
                    ),
                    medium: TierConfig::new(
                        "moonshot/kimi-k2.5",
                        &["anthropic/claude-sonnet-4.6"],
                    ),
                    complex: TierConfig::new(
                        "anthropic/claude-sonnet-4.6",
                        &["anthropic/claude-opus-4.6"],
                    ),
                    reasoning: TierConfig::new(
                        "moonshot/kimi-k2.5",
                        &["anthropic/claude-opus-4.6"],
                    ),
                }),
            },
            premium: ProfileTiers {
                tiers: TierMap {
                    simple: TierConfig::new(
                        "anthropic/claude-haiku-4.5",
                        &["anthropic/claude-sonnet-4.6"],
                    ),
                    medium: TierConfig::new(
                        "openai/gpt-5.2-codex",
                        &["anthropic/claude-sonnet-4.6"],
                    ),
                    complex: TierConfig::new(
                        "anthropic/claude-opus-4.6",
                        &["anthropic/claude-sonnet-4.6"],
                    ),
                    reasoning: TierConfig::new(
                        "anthropic/claude-opus-4.6",
                        &["google/gemini-3-pro-preview"],
                    ),
                },
                agentic_tiers: Some(TierMap {
                    simple: TierConfig::new(
                        "anthropic/claude-haiku-4.5",
                        &["anthropic/claude-sonnet-4.6"],
                    ),
                    medium: TierConfig::new(
                        "anthropic/claude-sonnet-4.6",
                        &["anthropic/claude-opus-4.6"],
                    ),
                    complex: TierConfig::new(
                        "anthropic/claude-opus-4.6",
                        &["anthropic/claude-sonnet-4.6"],
                    ),
                    reasoning: TierConfig::new(
                        "anthropic/claude-opus-4.6",
                        &["anthropic/claude-sonnet-4.6"],
                    ),
                }),
            },
            pricing,
            context_windows,
            baseline_model: "anthropic/claude-opus-4.6".to_string(),
            emergency_model: "nvidia/gpt-oss-120b".to_string(),
            upstream_url: "https://api.blockrun.xyz/v1/chat/completions".to_string(),
            scorer: ScorerConfig::default(),
            overrides: Overrides::default(),
            compression: CompressionConfig::default(),
            dedup: DedupConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

fn pricing_entry(model: &str, input: f64, output: f64) -> (String, ModelPricing) {
    (
        model.to_string(),
        ModelPricing {
            input_per_mtok: input,
            output_per_mtok: output,
        },
    )
}
