// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client for the two external LLM endpoints (§6): detector term-extraction
//! and explainer explanation generation share the same request/response
//! contract, so both go through one `LlmClient`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

/// NDJSON fallback shape: each line carries a partial `response` or
/// `message.content` fragment; concatenating them yields the full string
/// (§6).
#[derive(Debug, Clone, Deserialize)]
struct NdjsonLine {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    message: Option<ChatResponseMessage>,
}

/// Abstracts over the external chat-completion call so workers are
/// testable without a live model server.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, system: Option<&str>, user: &str) -> anyhow::Result<String>;
}

/// Production client: HTTP POST to a configured Ollama-shaped chat endpoint.
pub struct HttpLlmClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpLlmClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { http, endpoint: endpoint.into(), model: model.into() }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat(&self, system: Option<&str>, user: &str) -> anyhow::Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(ChatMessage { role: "system", content: system.to_owned() });
        }
        messages.push(ChatMessage { role: "user", content: user.to_owned() });

        let request = ChatRequest { model: self.model.clone(), messages, stream: false };
        let response = self.http.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            anyhow::bail!("llm endpoint {} returned {status}: {body}", self.endpoint);
        }
        parse_chat_body(&body)
    }
}

/// Parse either a single chat-response JSON object or an NDJSON stream of
/// fragments into the full response string (§6).
fn parse_chat_body(body: &str) -> anyhow::Result<String> {
    if let Ok(resp) = serde_json::from_str::<ChatResponse>(body) {
        return Ok(resp.message.content);
    }

    let mut joined = String::new();
    let mut saw_any = false;
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(parsed) = serde_json::from_str::<NdjsonLine>(line) {
            saw_any = true;
            if let Some(fragment) = parsed.response {
                joined.push_str(&fragment);
            } else if let Some(message) = parsed.message {
                joined.push_str(&message.content);
            }
        }
    }
    if saw_any {
        return Ok(joined);
    }
    anyhow::bail!("unrecognized chat response body");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_object_response() -> anyhow::Result<()> {
        let body = r#"{"message":{"content":"[{\"term\":\"API\"}]"}}"#;
        let parsed = parse_chat_body(body)?;
        assert_eq!(parsed, r#"[{"term":"API"}]"#);
        Ok(())
    }

    #[test]
    fn parses_ndjson_fallback() -> anyhow::Result<()> {
        let body = "{\"response\":\"[{\"}\n{\"response\":\"\\\"term\\\":\\\"API\\\"}]\"}\n";
        let parsed = parse_chat_body(body)?;
        assert!(parsed.contains("term"));
        Ok(())
    }

    #[test]
    fn unrecognized_body_errors() {
        assert!(parse_chat_body("not json at all").is_err());
    }
}
