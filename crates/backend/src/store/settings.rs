// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide settings store (C4, §4.4): domain hint, audience style,
//! confidence threshold, cooldown — read by both model workers.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Typed view over the fixed settings keys (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_explanation_style")]
    pub explanation_style: String,
    #[serde(default = "default_ai_model")]
    pub ai_model: String,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_updated: Option<String>,
}

fn default_explanation_style() -> String {
    "detailed".to_owned()
}
fn default_ai_model() -> String {
    "llama3.2".to_owned()
}
fn default_confidence_threshold() -> f64 {
    0.9
}
fn default_cooldown_seconds() -> u64 {
    300
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            domain: String::new(),
            explanation_style: default_explanation_style(),
            ai_model: default_ai_model(),
            confidence_threshold: default_confidence_threshold(),
            cooldown_seconds: default_cooldown_seconds(),
            last_updated: None,
        }
    }
}

/// Read-mostly settings store, guarded by a single `RwLock` (§5: "The
/// settings store is protected by its own lock").
pub struct SettingsStore {
    file_path: PathBuf,
    inner: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self { file_path: file_path.into(), inner: RwLock::new(Settings::default()) }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Shallow merge of a JSON object into the current settings. Non-object
    /// updates are ignored with a warning (§4.4).
    pub fn update(&self, patch: &serde_json::Value) {
        let Some(obj) = patch.as_object() else {
            warn!(?patch, "SettingsStore: ignoring non-object update");
            return;
        };
        let mut guard = self.inner.write();
        let mut current = serde_json::to_value(&*guard).unwrap_or_default();
        if let Some(current_obj) = current.as_object_mut() {
            for (key, value) in obj {
                current_obj.insert(key.clone(), value.clone());
            }
        }
        match serde_json::from_value::<Settings>(current) {
            Ok(updated) => *guard = updated,
            Err(e) => warn!(err = %e, "SettingsStore: update produced invalid settings, ignoring"),
        }
    }

    pub fn get_all(&self) -> Settings {
        self.inner.read().clone()
    }

    pub fn reset_to_defaults(&self) {
        info!("SettingsStore: resetting to defaults");
        *self.inner.write() = Settings::default();
    }

    pub async fn load_from_file(&self) -> anyhow::Result<bool> {
        if !self.file_path.exists() {
            info!(path = %self.file_path.display(), "SettingsStore: no settings file, using defaults");
            return Ok(false);
        }
        let content = tokio::fs::read_to_string(&self.file_path).await?;
        let loaded: Settings = serde_json::from_str(&content)?;
        *self.inner.write() = loaded;
        Ok(true)
    }

    /// Save settings, stamping `last_updated` with the current RFC 3339
    /// timestamp (§4.4).
    pub async fn save_to_file(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut snapshot = self.inner.read().clone();
        snapshot.last_updated = Some(chrono::Utc::now().to_rfc3339());
        let body = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(&self.file_path, body).await?;
        Ok(())
    }
}
