use crate::config::{ScorerConfig, ScorerWeights, Tier, TierBoundaries, TokenThresholds};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Raw scoring result. The classifier turns this into a final tier.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreOutcome {
    /// Weighted complexity score, clamped to [0, 1].
    pub score: f64,
    /// Independent agentic-intent score in [0, 1].
    pub agentic_score: f64,
    /// Human-readable signal strings for the decision's reasoning field.
    pub signals: Vec<String>,
    /// Tentative tier, or None when the score sits inside the neutral band
    /// around a boundary.
    pub tier: Option<Tier>,
    pub confidence: f64,
}

/// Per-dimension raw scores (before weighting).
#[derive(Debug, Clone, Default, Serialize)]
pub struct DimensionScores {
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

// ---------------------------------------------------------------------------
// Keyword lists (English only)
// ---------------------------------------------------------------------------

const CODE_KEYWORDS: &[&str] = &[
    "function", "class", "import", "const", "let", "var", "return",
    "async", "await", "def ", "print(", "console.log", "```",
    "pub fn", "impl ", "struct ", "enum ", "select", "insert",
    "update", "delete", "create table",
];

const REASONING_KEYWORDS: &[&str] = &[
    "prove", "theorem", "derive", "step by step", "chain of thought",
    "formally", "mathematical", "proof", "logically", "contradiction",
    "induction", "hypothesis", "therefore", "axiom", "lemma",
    "corollary", "deduce", "implies", "why",
];

const TECHNICAL_KEYWORDS: &[&str] = &[
    "algorithm", "optimize", "architecture", "distributed", "kubernetes",
    "microservice", "database", "infrastructure", "concurrent", "latency",
    "throughput", "scalable", "middleware", "authentication",
    "authorization", "encryption",
];

const CREATIVE_KEYWORDS: &[&str] = &[
    "story", "poem", "compose", "brainstorm", "creative", "imagine",
    "write a", "fiction", "narrative", "character", "plot", "metaphor",
];

const SIMPLE_KEYWORDS: &[&str] = &[
    "what is", "define", "translate", "hello", "hi", "yes or no",
    "capital of", "how old", "who is", "when was", "meaning of",
    "true or false", "thanks",
];

const IMPERATIVE_KEYWORDS: &[&str] = &[
    "build", "create", "implement", "design", "develop", "construct",
    "generate", "deploy", "configure", "set up", "refactor", "migrate",
    "integrate",
];

const CONSTRAINT_KEYWORDS: &[&str] = &[
    "under", "at most", "at least", "within", "no more than",
    "o(", "maximum", "minimum", "limit", "budget", "constraint",
];

const OUTPUT_FORMAT_KEYWORDS: &[&str] = &[
    "json", "yaml", "xml", "table", "csv", "markdown", "schema",
    "format as", "structured", "output as",
];

const REFERENCE_KEYWORDS: &[&str] = &[
    "above", "below", "previous", "following", "the docs", "the api",
    "the code", "earlier", "attached", "mentioned",
];

const NEGATION_KEYWORDS: &[&str] = &[
    "don't", "do not", "avoid", "never", "without", "except",
    "exclude", "no longer", "must not", "shouldn't",
];

const DOMAIN_KEYWORDS: &[&str] = &[
    "quantum", "fpga", "vlsi", "risc-v", "asic", "photonics",
    "genomics", "proteomics", "topological", "homomorphic",
    "zero-knowledge", "lattice-based",
];

const AGENTIC_KEYWORDS: &[&str] = &[
    "read file", "read the file", "look at", "check the", "open the",
    "edit", "modify", "update the", "change the", "write to",
    "create file", "execute", "deploy", "install", "npm", "pip",
    "compile", "after that", "and also", "once done", "step 1",
    "step 2", "analyze", "research", "plan", "then", "fix", "debug",
    "until it works", "keep trying", "iterate", "make sure", "verify",
    "confirm",
];

static MULTI_STEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(first\b.*\bthen\b|step\s+\d|1\.\s.*2\.\s)").unwrap()
});

static MATH_OPERATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\d\s*[+\-*/^=]\s*\d|sqrt|\bsum\b|integral)").unwrap());

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

pub struct Scorer;

impl Scorer {
    /// Score prompt + system text and propose a tentative tier.
    pub fn score(
        prompt: &str,
        system: Option<&str>,
        estimated_tokens: usize,
        config: &ScorerConfig,
    ) -> ScoreOutcome {
        let mut text = String::with_capacity(
            prompt.len() + system.map(str::len).unwrap_or(0) + 1,
        );
        if let Some(sys) = system {
            text.push_str(sys);
            text.push('\n');
        }
        text.push_str(prompt);
        let text = text.to_lowercase();

        let mut signals: Vec<String> = Vec::new();

        let agentic_score = score_agentic_task(&text, &mut signals);

        let dimensions = DimensionScores {
            token_count: score_token_count(estimated_tokens, &config.token_thresholds),
            code_presence: score_keyword_match(&text, CODE_KEYWORDS, "code", &mut signals),
            reasoning_markers: score_reasoning(&text, &mut signals),
            technical_terms: score_keyword_match(
                &text,
                TECHNICAL_KEYWORDS,
                "technical",
                &mut signals,
            ),
            creative_markers: score_keyword_match(
                &text,
                CREATIVE_KEYWORDS,
                "creative",
                &mut signals,
            ),
            simple_indicators: score_keyword_match(
                &text,
                SIMPLE_KEYWORDS,
                "simple",
                &mut signals,
            ),
            multi_step_patterns: score_multi_step(&text, &mut signals),
            question_complexity: score_question_complexity(&text, &mut signals),
            imperative_verbs: score_keyword_match(
                &text,
                IMPERATIVE_KEYWORDS,
                "imperative",
                &mut signals,
            ),
            constraint_count: score_keyword_match(
                &text,
                CONSTRAINT_KEYWORDS,
                "constraint",
                &mut signals,
            ),
            output_format: score_keyword_match(
                &text,
                OUTPUT_FORMAT_KEYWORDS,
                "output_format",
                &mut signals,
            ),
            reference_complexity: score_keyword_match(
                &text,
                REFERENCE_KEYWORDS,
                "reference",
                &mut signals,
            ),
            negation_complexity: score_keyword_match(
                &text,
                NEGATION_KEYWORDS,
                "negation",
                &mut signals,
            ),
            domain_specificity: score_keyword_match(
                &text,
                DOMAIN_KEYWORDS,
                "domain",
                &mut signals,
            ),
            agentic_task: agentic_score,
        };

        let score = compute_weighted_score(&dimensions, &config.weights).clamp(0.0, 1.0);

        // Two or more reasoning markers is an unambiguous Reasoning signal
        // regardless of where the weighted sum lands.
        let tier = if dimensions.reasoning_markers >= 0.6 {
            signals.push("reasoning_markers_force".to_string());
            Some(Tier::Reasoning)
        } else {
            propose_tier(score, &config.tier_boundaries, config.ambiguity_epsilon)
        };

        let confidence =
            calibrate_confidence(score, &config.tier_boundaries, config.confidence_steepness);

        ScoreOutcome {
            score,
            agentic_score,
            signals,
            tier,
            confidence,
        }
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Score based on the token estimate band.
fn score_token_count(tokens: usize, thresholds: &TokenThresholds) -> f64 {
    if tokens < thresholds.short_upper {
        -1.0
    } else if tokens > thresholds.long_lower {
        1.0
    } else {
        0.0
    }
}

/// Count keyword matches and map to a score: 0→0.0, 1→0.3, 2→0.6, 3+→1.0.
fn score_keyword_match(
    text: &str,
    keywords: &[&str],
    signal_name: &str,
    signals: &mut Vec<String>,
) -> f64 {
    let count = keywords.iter().filter(|kw| text.contains(**kw)).count();
    if count > 0 {
        signals.push(format!("{}:{}", signal_name, count));
    }
    match count {
        0 => 0.0,
        1 => 0.3,
        2 => 0.6,
        _ => 1.0,
    }
}

/// Reasoning markers: keyword table plus math-operator patterns.
fn score_reasoning(text: &str, signals: &mut Vec<String>) -> f64 {
    let mut count = REASONING_KEYWORDS
        .iter()
        .filter(|kw| text.contains(**kw))
        .count();
    if MATH_OPERATOR_RE.is_match(text) {
        count += 1;
    }
    if count > 0 {
        signals.push(format!("reasoning:{}", count));
    }
    match count {
        0 => 0.0,
        1 => 0.3,
        2 => 0.6,
        _ => 1.0,
    }
}

fn score_multi_step(text: &str, signals: &mut Vec<String>) -> f64 {
    if MULTI_STEP_RE.is_match(text) {
        signals.push("multi_step".to_string());
        0.5
    } else {
        0.0
    }
}

/// More than 3 question marks indicates a compound question.
fn score_question_complexity(text: &str, signals: &mut Vec<String>) -> f64 {
    let count = text.chars().filter(|c| *c == '?').count();
    if count > 3 {
        signals.push(format!("questions:{}", count));
        0.5
    } else {
        0.0
    }
}

/// Tiered agentic scoring: 0→0.0, 1-2→0.2, 3→0.6, 4+→1.0.
fn score_agentic_task(text: &str, signals: &mut Vec<String>) -> f64 {
    let count = AGENTIC_KEYWORDS
        .iter()
        .filter(|kw| text.contains(**kw))
        .count();
    let score = match count {
        0 => 0.0,
        1..=2 => 0.2,
        3 => 0.6,
        _ => 1.0,
    };
    if count > 0 {
        signals.push(format!("agentic:{}", count));
    }
    score
}

/// Weighted sum of all dimensions. simple_indicators is subtracted.
fn compute_weighted_score(d: &DimensionScores, w: &ScorerWeights) -> f64 {
    d.token_count * w.token_count
        + d.code_presence * w.code_presence
        + d.reasoning_markers * w.reasoning_markers
        + d.technical_terms * w.technical_terms
        + d.creative_markers * w.creative_markers
        - d.simple_indicators * w.simple_indicators
        + d.multi_step_patterns * w.multi_step_patterns
        + d.question_complexity * w.question_complexity
        + d.imperative_verbs * w.imperative_verbs
        + d.constraint_count * w.constraint_count
        + d.output_format * w.output_format
        + d.reference_complexity * w.reference_complexity
        + d.negation_complexity * w.negation_complexity
        + d.domain_specificity * w.domain_specificity
        + d.agentic_task * w.agentic_task
}

/// Map a clamped score to a tier, or None when it falls inside the neutral
/// band of ±epsilon around any boundary.
fn propose_tier(score: f64, boundaries: &TierBoundaries, epsilon: f64) -> Option<Tier> {
    let points = [
        boundaries.simple_medium,
        boundaries.medium_complex,
        boundaries.complex_reasoning,
    ];
    if points.iter().any(|b| (score - b).abs() < epsilon) {
        return None;
    }
    Some(if score < boundaries.simple_medium {
        Tier::Simple
    } else if score < boundaries.medium_complex {
        Tier::Medium
    } else if score < boundaries.complex_reasoning {
        Tier::Complex
    } else {
        Tier::Reasoning
    })
}

/// Sigmoid confidence from distance to the nearest boundary; [0.5, 1.0].
fn calibrate_confidence(score: f64, boundaries: &TierBoundaries, steepness: f64) -> f64 {
    let points = [
        boundaries.simple_medium,
        boundaries.medium_complex,
        boundaries.complex_reasoning,
    ];
    let min_distance = points
        .iter()
        .map(|b| (score - b).abs())
        .fold(f64::MAX, f64::min);
    1.0 / (1.0 + (-steepness * min_distance).exp())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
