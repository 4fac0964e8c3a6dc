// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-detector-instance cooldown map (§3, §4.6 step 3): term (lowercased)
//! -> last-accepted timestamp. Private to a single detector — no internal
//! locking (§5: "private to a single detector instance").

use std::collections::HashMap;

pub struct CooldownMap {
    last_accepted: HashMap<String, f64>,
}

impl CooldownMap {
    pub fn new() -> Self {
        Self { last_accepted: HashMap::new() }
    }

    /// `true` if `term` was accepted less than `cooldown_seconds` ago.
    /// Expired entries are not evicted here (§3: "entries expire lazily");
    /// they're simply ignored once their window has passed.
    pub fn is_in_cooldown(&self, term: &str, now: f64, cooldown_seconds: u64) -> bool {
        match self.last_accepted.get(&term.to_lowercase()) {
            Some(&last) => now - last < cooldown_seconds as f64,
            None => false,
        }
    }

    pub fn record_accepted(&mut self, term: &str, now: f64) {
        self.last_accepted.insert(term.to_lowercase(), now);
    }
}

impl Default for CooldownMap {
    fn default() -> Self {
        Self::new()
    }
}
