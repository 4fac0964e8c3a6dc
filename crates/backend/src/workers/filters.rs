// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Input gating, term-extraction response parsing, and the regex fallback
//! detector used by the small-model worker (C6, §4.6 steps 1-3).

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::workers::cooldown::CooldownMap;
use crate::workers::stoplist::is_known_term;

/// Prompt-contamination words: tokens that indicate the "sentence" is
/// actually leaked prompt/instruction text rather than real speech
/// (§4.6 step 1).
const CONTAMINATION_WORDS: &[&str] = &[
    "extract", "confidence", "json", "array", "format", "domain", "technical", "terms",
];

/// Lowercased, punctuation-stripped tokens, used for both the contamination
/// dominance check and the repetition guard.
fn meaningful_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| word.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Input gate applied before any external call (§4.6 step 1): rejects
/// empty/whitespace, sentences under 4 meaningful words, sentences
/// dominated by prompt-contamination words, and sentences whose meaningful
/// tokens are all identical.
pub fn passes_input_gate(text: &str) -> bool {
    let tokens = meaningful_tokens(text);
    if tokens.len() < 4 {
        return false;
    }
    let contaminated = tokens.iter().filter(|t| CONTAMINATION_WORDS.contains(&t.as_str())).count();
    if (contaminated as f64) > 0.5 * tokens.len() as f64 {
        return false;
    }
    if let Some(first) = tokens.first() {
        if tokens.iter().all(|t| t == first) {
            return false;
        }
    }
    true
}

/// One candidate term as returned by the detector LLM (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct RawTerm {
    pub term: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// Defensive parse of the detector LLM's response (§4.6 step 2): locate the
/// outermost `[ ... ]` substring first, then fall back to a regex sweep for
/// `{"term": ...}` object literals.
pub fn safe_json_extract(content: &str) -> Vec<RawTerm> {
    if let (Some(start), Some(end)) = (content.find('['), content.rfind(']')) {
        if end > start {
            if let Ok(terms) = serde_json::from_str::<Vec<RawTerm>>(&content[start..=end]) {
                return terms;
            }
        }
    }

    static OBJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
        // Pattern is a fixed literal, compilation cannot fail.
        #[allow(clippy::expect_used)]
        Regex::new(r#"\{\s*"term"[\s\S]*?\}"#).expect("static regex is valid")
    });
    OBJECT_RE
        .find_iter(content)
        .filter_map(|m| serde_json::from_str::<RawTerm>(m.as_str()).ok())
        .collect()
}

/// Per-term acceptance filter (§4.6 step 3, §8 properties 2-3).
///
/// Confidence semantics are fixed per §4.6: higher confidence means more
/// common/well-known, so a term is kept only when its confidence is
/// *strictly below* the threshold. A regression toward `>=`/`>` here would
/// invert the whole pipeline and must be caught by the property tests.
pub fn should_pass(
    confidence: f64,
    term: &str,
    cooldown: &CooldownMap,
    now: f64,
    confidence_threshold: f64,
    cooldown_seconds: u64,
) -> bool {
    if confidence >= confidence_threshold {
        return false;
    }
    if is_known_term(term) {
        return false;
    }
    if cooldown.is_in_cooldown(term, now, cooldown_seconds) {
        return false;
    }
    true
}

/// Fallback detector used when the LLM is unavailable or its response can't
/// be parsed at all (§4.6 step 2), ported from
/// `Backend/AI/SmallModel.py::detect_terms_fallback`.
pub fn fallback_detect(sentence: &str) -> Vec<String> {
    static PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
        [
            r"(?i)\b(?:API|database|server|client|authentication|encryption|algorithm|framework|protocol)\b",
            r"(?i)\b(?:revenue|profit|strategy|market|customer|stakeholder|ROI|KPI|budget)\b",
            r"(?i)\b(?:hypothesis|methodology|analysis|research|study|theory|experiment|conclusion)\b",
            r"(?i)\b\w{14,}\b",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    });

    let mut found: HashSet<String> = HashSet::new();
    for pattern in PATTERNS.iter() {
        for m in pattern.find_iter(sentence) {
            found.insert(m.as_str().to_lowercase());
        }
    }
    found.into_iter().collect()
}
