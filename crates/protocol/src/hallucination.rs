// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tiered "canned phrase" guard shared by the detector (C6 §4.6 step 4) and
//! the streaming transcription loop (C11 §4.11): blocks STT output that is
//! most likely a model hallucination produced during silence, rather than
//! real speech.

const STRICT_PATTERNS: &[&str] = &[
    "thanks for watching",
    "thank you for watching",
    "please like and subscribe",
    "don't forget to subscribe",
    "hit that subscribe button",
    "smash that like button",
];

const MODERATE_PATTERNS: &[&str] = &[
    "see you next time",
    "that's all for today",
    "until next time",
    "catch you later",
    "thanks for your attention",
    "thank you for your time",
    "appreciate you watching",
    "goodbye",
    "bye bye",
];

const SIMPLE_PATTERNS: &[&str] = &["thanks", "thank you"];

const COMBINED_FILLER: &[&str] =
    &["for", "and", "the", "a", "to", "my", "your", "our", "everyone", "today", ","];
const STRICT_FILLER: &[&str] = &["for", "and", "the", "a", "to", "my", "your", "our"];
const MODERATE_FILLER: &[&str] = &["for", "and", "the", "a", "to", "my", "your", "our", "everyone", "today"];

/// `true` if `sentence` should be blocked as a likely canned/hallucinated
/// phrase (§4.11: "identical in spirit to C6's [guard]").
pub fn is_hallucination(sentence: &str) -> bool {
    let lower = sentence.to_lowercase();
    let lower = lower.trim();
    if lower.is_empty() {
        return true;
    }

    let all_patterns: Vec<&str> =
        STRICT_PATTERNS.iter().chain(MODERATE_PATTERNS).chain(SIMPLE_PATTERNS).copied().collect();
    let found: Vec<&str> = all_patterns.into_iter().filter(|p| lower.contains(p)).collect();

    if found.len() >= 2 {
        let mut clean = lower.to_string();
        for pattern in &found {
            clean = clean.replace(pattern, "");
        }
        let meaningful = count_non_filler(&clean, COMBINED_FILLER);
        if meaningful < 3 {
            return true;
        }
    }

    for pattern in STRICT_PATTERNS {
        if lower.contains(pattern) {
            let clean = lower.replace(pattern, "");
            if count_non_filler(clean.trim(), STRICT_FILLER) < 3 {
                return true;
            }
        }
    }

    for pattern in MODERATE_PATTERNS {
        if lower.contains(pattern) {
            let clean = lower.replace(pattern, "");
            if count_non_filler(clean.trim(), MODERATE_FILLER) < 2 {
                return true;
            }
        }
    }

    for pattern in SIMPLE_PATTERNS {
        if lower == *pattern {
            return true;
        }
    }

    false
}

fn count_non_filler(text: &str, filler: &[&str]) -> usize {
    text.split_whitespace().filter(|w| !filler.contains(w)).count()
}
