// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in stop list of common/service words (§4.6 step 3), lifted
//! verbatim from `Backend/AI/SmallModel.py::known_terms` /
//! `filters.py::known_terms`.

use std::collections::HashSet;
use std::sync::LazyLock;

const WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "do", "for", "from", "has",
    "have", "he", "her", "his", "i", "if", "in", "into", "is", "it", "its", "me", "my", "no",
    "not", "of", "on", "or", "our", "she", "so", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "to", "too", "up", "us", "was", "we", "were", "what", "when",
    "where", "which", "who", "will", "with", "would", "you", "your", "been", "being", "did",
    "does", "had", "having", "how", "than", "those", "also", "just", "such", "yet", "only",
    "any", "each", "few", "most", "other", "some", "because", "while", "about", "before",
    "after", "again", "against", "between", "both", "once", "during", "over", "under", "out",
    "off", "very", "same", "all", "another", "whoever", "whichever", "whomever", "whom",
    "whilst", "perhaps", "random", "randomized", "login", "system", "module", "process",
    "service", "function", "model", "input", "output", "data", "rate", "code", "structure",
    "operation", "performance", "memory", "network", "flow", "solution", "platform",
    "application", "tool", "resource", "logic", "signal", "protocol", "instance", "modular",
    "password", "user", "error", "file", "program", "install", "update", "run", "command",
    "website", "page", "link", "browser", "button", "web", "account", "credentials", "access",
    "secure", "permission", "number", "chart", "email",
];

pub static KNOWN_TERMS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| WORDS.iter().copied().collect());

/// `true` if the lowercased `term` is a common/service word that should
/// never be treated as a jargon term (§4.6 step 3).
pub fn is_known_term(term: &str) -> bool {
    KNOWN_TERMS.contains(term.to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_case_insensitively() {
        assert!(is_known_term("System"));
        assert!(is_known_term("PASSWORD"));
    }

    #[test]
    fn jargon_is_not_known() {
        assert!(!is_known_term("backpropagation"));
    }
}
