//! Classification of generated code into effect-library entries.
//!
//! Type and category come from ordered keyword tables; the first rule with a
//! matching keyword wins. Keywords match as lowercase substrings of the
//! description followed by the code.

use fxgen_common::*;
use serde_json::Value;

/// Ordered `(keywords, type)` rules. Falls back to `PARTICLE`.
const TYPE_RULES: &[(&[&str], EffectType)] = &[
    (&["light", "glow", "illuminat", "shine", "bloom"], EffectType::Lighting),
    (&["morph", "transform", "shapeshift"], EffectType::Morphing),
    (&["gravity", "velocity", "physics", "collision", "bounce"], EffectType::Physics),
    (&["digital", "glitch", "matrix", "pixel"], EffectType::Digital),
];

/// Ordered `(keywords, category)` rules. Falls back to `EFFECT`.
const CATEGORY_RULES: &[(&[&str], EffectCategory)] = &[
    (&["explo", "burst", "blast", "boom"], EffectCategory::Explosion),
    (&["transition", "fade", "wipe", "dissolve"], EffectCategory::Transition),
    (&["fire", "flame", "burn", "ember"], EffectCategory::Fire),
    (
        &["rain", "snow", "fog", "mist", "smoke", "cloud", "lightning", "storm"],
        EffectCategory::Atmospheric,
    ),
    (&["transform", "morph", "shift"], EffectCategory::Transformation),
    (&["distort", "warp", "ripple", "wave", "glitch"], EffectCategory::Distortion),
];

/// Words recognized as tags, with plural and "-ing" forms.
const TAG_VOCABULARY: &[&str] = &[
    // effects
    "fire", "smoke", "spark", "rain", "snow", "explosion", "lightning", "glow", "portal",
    "water", "magic", "particle", "star", "bubble", "firework", "flame", "mist",
    // colors
    "red", "orange", "yellow", "green", "blue", "purple", "pink", "white", "gold", "cyan",
    // sizes and speeds
    "small", "large", "tiny", "huge", "giant", "fast", "slow",
];

const SIMPLE_MAX_LINES: usize = 60;
const MODERATE_MAX_LINES: usize = 150;
const HEAVY_PARTICLE_COUNT: u64 = 1000;

pub fn classify_type(content: &str) -> EffectType {
    first_match(TYPE_RULES, content).unwrap_or(EffectType::Particle)
}

pub fn classify_category(content: &str) -> EffectCategory {
    first_match(CATEGORY_RULES, content).unwrap_or(EffectCategory::Effect)
}

fn first_match<T: Copy>(rules: &[(&[&str], T)], content: &str) -> Option<T> {
    let content = content.to_lowercase();
    rules
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| content.contains(k)))
        .map(|(_, result)| *result)
}

fn words(description: &str) -> impl Iterator<Item = String> + '_ {
    description
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
}

/// First three words longer than two characters, title-cased, plus " Effect".
pub fn display_name(description: &str) -> String {
    let picked: Vec<String> = words(description)
        .filter(|w| w.chars().count() > 2)
        .take(3)
        .map(|w| title_case(&w))
        .collect();
    if picked.is_empty() {
        "Custom Effect".to_string()
    } else {
        format!("{} Effect", picked.join(" "))
    }
}

fn title_case(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn matches_vocabulary(word: &str, term: &str) -> bool {
    if word == term {
        return true;
    }
    let Some(suffix) = word.strip_prefix(term) else {
        // "flaming" -> "flame"
        return term
            .strip_suffix('e')
            .and_then(|stem| word.strip_prefix(stem))
            .is_some_and(|rest| rest == "ing");
    };
    matches!(suffix, "s" | "es" | "ing")
}

/// Vocabulary words found in the description, in order of first appearance.
pub fn extract_tags(description: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for word in words(description).map(|w| w.to_lowercase()) {
        if let Some(term) = TAG_VOCABULARY.iter().find(|t| matches_vocabulary(&word, t))
            && !tags.iter().any(|t| t == term)
        {
            tags.push(term.to_string());
        }
    }
    tags
}

pub fn complexity_for(code: &str) -> Complexity {
    let lines = code.lines().count();
    if lines < SIMPLE_MAX_LINES {
        Complexity::Simple
    } else if lines < MODERATE_MAX_LINES {
        Complexity::Moderate
    } else {
        Complexity::Complex
    }
}

pub fn performance_tier(
    platform: Platform,
    complexity: Complexity,
    particle_count: Option<u64>,
) -> PerformanceTier {
    let many_particles = particle_count.is_some_and(|n| n > HEAVY_PARTICLE_COUNT);
    if many_particles || (platform.is_gpu_bound() && complexity == Complexity::Complex) {
        PerformanceTier::Heavy
    } else if !platform.is_gpu_bound() && complexity == Complexity::Simple {
        PerformanceTier::Light
    } else {
        PerformanceTier::Standard
    }
}

fn particle_count(parameters: &Value) -> Option<u64> {
    parameters
        .get("particleCount")
        .and_then(Value::as_u64)
}

/// Builds library entries for completed jobs.
#[derive(Debug, Default, Clone, Copy)]
pub struct Cataloger;

impl Cataloger {
    pub fn new() -> Self {
        Self
    }

    pub fn catalog(&self, job: &JobRecord, output: &GenerationOutput) -> NewEffect {
        let content = format!("{}\n{}", job.description, output.code);
        let complexity = complexity_for(&output.code);

        let parameters = output
            .metadata
            .get("parameters")
            .filter(|p| p.is_object())
            .cloned()
            .unwrap_or_else(|| job.options.clone());

        let mut metadata = match &output.metadata {
            Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        metadata.insert("jobId".to_string(), Value::String(job.id.clone()));

        NewEffect {
            name: display_name(&job.description),
            description: job.description.clone(),
            effect_type: classify_type(&content),
            category: classify_category(&content),
            platform: job.platform,
            performance_tier: performance_tier(job.platform, complexity, particle_count(&parameters)),
            code: output.code.clone(),
            parameters,
            metadata: Value::Object(metadata),
            tags: extract_tags(&job.description),
            complexity,
        }
    }
}
