// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Short shared-code session manager (C5, §4.5): at most one active session
//! at a time, joined by code.

use std::collections::HashSet;

use rand::distr::{Alphanumeric, SampleString};

const CODE_LENGTH: usize = 6;

struct ActiveSession {
    code: String,
    creator_client_id: String,
    participants: HashSet<String>,
}

/// Thread-safety is provided by the router being the sole caller (§4.5); no
/// internal locking is needed beyond the composition root handing out a
/// single owned instance to the router task.
pub struct SessionManager {
    active: Option<ActiveSession>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self { active: None }
    }

    /// Returns a fresh 6-character uppercase-alphanumeric code iff no
    /// session is active, else `None` (§4.5, §8 property 6).
    pub fn create_session(&mut self, creator_client_id: &str) -> Option<String> {
        if self.active.is_some() {
            return None;
        }
        let code = generate_code();
        self.active = Some(ActiveSession {
            code: code.clone(),
            creator_client_id: creator_client_id.to_owned(),
            participants: HashSet::from([creator_client_id.to_owned()]),
        });
        Some(code)
    }

    /// Adds `client_id` to the active session's participants iff its code
    /// matches (§4.5, §8 property 6).
    pub fn join_session(&mut self, client_id: &str, code: &str) -> bool {
        match &mut self.active {
            Some(session) if session.code == code => {
                session.participants.insert(client_id.to_owned());
                true
            }
            _ => false,
        }
    }

    pub fn get_active_session_code(&self) -> Option<&str> {
        self.active.as_ref().map(|s| s.code.as_str())
    }

    pub fn participant_count(&self) -> usize {
        self.active.as_ref().map(|s| s.participants.len()).unwrap_or(0)
    }

    pub fn creator_client_id(&self) -> Option<&str> {
        self.active.as_ref().map(|s| s.creator_client_id.as_str())
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_code() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), CODE_LENGTH).to_uppercase()
}
