// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end scenario tests (§8 S1-S6). Spawns the real
//! `termrelayd` binary as a subprocess, wired to a per-test temp directory
//! and a stub LLM HTTP server, and exercises it over its WebSocket gateway.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use tokio::sync::Mutex;

/// Resolve the path to the compiled `termrelayd` binary.
pub fn termrelayd_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs -> tests -> workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("termrelayd")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A minimal stand-in for the detector/explainer LLM endpoint. Returns a
/// fixed chat-completion body to every request and records how many
/// requests it received, so tests can assert the backend actually called
/// out to it.
pub struct MockLlmServer {
    addr: SocketAddr,
    shutdown: tokio::sync::oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

struct MockLlmState {
    response_body: Mutex<String>,
    call_count: std::sync::atomic::AtomicUsize,
}

impl MockLlmServer {
    /// Starts a server that always answers with `response_body` (the raw
    /// `message.content` value of an Ollama-shaped chat response).
    pub async fn start(response_body: impl Into<String>) -> anyhow::Result<Self> {
        let state = Arc::new(MockLlmState {
            response_body: Mutex::new(response_body.into()),
            call_count: std::sync::atomic::AtomicUsize::new(0),
        });

        let app = axum::Router::new().route("/api/chat", post(handle_chat)).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await;
        });

        Ok(Self { addr, shutdown: tx, handle })
    }

    pub fn chat_url(&self) -> String {
        format!("http://{}/api/chat", self.addr)
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}

async fn handle_chat(
    State(state): State<Arc<MockLlmState>>,
    _body: Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    state.call_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    let content = state.response_body.lock().await.clone();
    Json(serde_json::json!({ "message": { "content": content } }))
}

/// A running `termrelayd` process, killed on drop.
pub struct TermrelayProcess {
    child: Child,
    port: u16,
    _data_dir: tempfile::TempDir,
}

impl TermrelayProcess {
    /// Spawn `termrelayd` pointed at a fresh temp directory for its file
    /// queues/settings, with both LLM endpoints pointed at `llm_url`
    /// (pass the same stub for both detector and explainer in tests that
    /// don't need to distinguish them).
    pub fn start(llm_url: &str) -> anyhow::Result<Self> {
        Self::start_with_llms(llm_url, llm_url)
    }

    /// Like [`start`](Self::start), but with independent detector/explainer
    /// endpoints, for scenarios where the two model workers need different
    /// canned responses.
    pub fn start_with_llms(detector_llm_url: &str, explainer_llm_url: &str) -> anyhow::Result<Self> {
        let binary = termrelayd_binary();
        anyhow::ensure!(binary.exists(), "termrelayd binary not found at {}", binary.display());

        let port = free_port()?;
        let data_dir = tempfile::tempdir()?;

        let child = Command::new(&binary)
            .env("TERMRELAY_HOST", "127.0.0.1")
            .env("TERMRELAY_PORT", port.to_string())
            .env("TERMRELAY_DETECTIONS_FILE", data_dir.path().join("detections.json"))
            .env("TERMRELAY_EXPLANATIONS_FILE", data_dir.path().join("explanations.json"))
            .env("TERMRELAY_SETTINGS_FILE", data_dir.path().join("settings.json"))
            .env("TERMRELAY_DETECTOR_LLM_URL", detector_llm_url)
            .env("TERMRELAY_EXPLAINER_LLM_URL", explainer_llm_url)
            .env("TERMRELAY_LLM_TIMEOUT_MS", "5000")
            .env("TERMRELAY_DELIVERY_POLL_MS", "200")
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, port, _data_dir: data_dir })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_url(&self, client_id: &str) -> String {
        format!("ws://127.0.0.1:{}/ws/{client_id}", self.port)
    }

    /// Poll `/healthz` until it answers or `timeout` elapses.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/healthz", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("termrelayd did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for TermrelayProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
