// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend configuration: `clap::Parser` with an environment-variable
//! fallback for every knob (§6: "Environment").

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, clap::Parser)]
#[command(name = "termrelayd", version, about = "Real-time context-translator backend")]
pub struct BackendConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "TERMRELAY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8765, env = "TERMRELAY_PORT")]
    pub port: u16,

    /// Path to the detections file queue (§6).
    #[arg(long, default_value = "data/detections_queue.json", env = "TERMRELAY_DETECTIONS_FILE")]
    pub detections_file: PathBuf,

    /// Path to the explanations file queue (§6).
    #[arg(long, default_value = "data/explanations_queue.json", env = "TERMRELAY_EXPLANATIONS_FILE")]
    pub explanations_file: PathBuf,

    /// Path to the settings persistence file (§6).
    #[arg(long, default_value = "data/settings.json", env = "TERMRELAY_SETTINGS_FILE")]
    pub settings_file: PathBuf,

    /// Detector LLM chat endpoint (§6).
    #[arg(
        long,
        default_value = "http://localhost:11434/api/chat",
        env = "TERMRELAY_DETECTOR_LLM_URL"
    )]
    pub detector_llm_url: String,

    /// Explainer LLM chat endpoint (§6).
    #[arg(
        long,
        default_value = "http://localhost:11434/api/chat",
        env = "TERMRELAY_EXPLAINER_LLM_URL"
    )]
    pub explainer_llm_url: String,

    /// Model name passed in LLM chat requests.
    #[arg(long, default_value = "llama3.2", env = "TERMRELAY_LLM_MODEL")]
    pub llm_model: String,

    /// Timeout for a single LLM call, in milliseconds (§4.7 step 3, §5).
    #[arg(long, default_value_t = 30_000, env = "TERMRELAY_LLM_TIMEOUT_MS")]
    pub llm_timeout_ms: u64,

    /// Explanation delivery drain/wait fallback timeout, in milliseconds
    /// (§4.8 "Wait phase").
    #[arg(long, default_value_t = 5_000, env = "TERMRELAY_DELIVERY_POLL_MS")]
    pub delivery_poll_ms: u64,
}

impl BackendConfig {
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }

    pub fn delivery_poll_interval(&self) -> Duration {
        Duration::from_millis(self.delivery_poll_ms)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
