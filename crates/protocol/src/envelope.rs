// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The universal message envelope carried on every bus queue.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical destination for an envelope.
pub const GROUP_ALL_FRONTENDS: &str = "all_frontends";

/// One step an envelope went through inside a processing component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingStep {
    pub processor: String,
    pub status: Option<String>,
    pub timestamp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ProcessingStep {
    pub fn new(processor: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            processor: processor.into(),
            status: Some(status.into()),
            timestamp: now_secs(),
            completed_at: None,
            details: None,
        }
    }
}

/// One step a router took moving an envelope between named queues.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForwardingStep {
    pub router: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_queue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_queue: Option<String>,
    pub timestamp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ForwardingStep {
    pub fn new(router: impl Into<String>, from_queue: Option<&str>, to_queue: Option<&str>) -> Self {
        Self {
            router: router.into(),
            from_queue: from_queue.map(str::to_owned),
            to_queue: to_queue.map(str::to_owned),
            timestamp: now_secs(),
            details: None,
        }
    }
}

/// The single envelope type carried on every in-memory queue (C1/§3).
///
/// `#[serde(deny_unknown_fields)]` implements the ingress invariant from
/// §4.1: "deserialization rejects extra top-level fields."
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp: f64,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub processing_path: Vec<ProcessingStep>,
    #[serde(default)]
    pub forwarding_path: Vec<ForwardingStep>,
}

impl Envelope {
    /// Construct a new envelope, assigning a fresh id and the current
    /// timestamp (§4.1: "The envelope constructor assigns a fresh `id` and
    /// current `timestamp` when absent").
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: kind.into(),
            payload,
            timestamp: now_secs(),
            origin: None,
            destination: None,
            client_id: None,
            processing_path: Vec::new(),
            forwarding_path: Vec::new(),
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Append a processing step. Path lists only ever grow (§3 invariant).
    pub fn push_processing(&mut self, step: ProcessingStep) {
        self.processing_path.push(step);
    }

    /// Append a forwarding step. Path lists only ever grow (§3 invariant).
    pub fn push_forwarding(&mut self, step: ForwardingStep) {
        self.forwarding_path.push(step);
    }

    /// `true` if this envelope's `client_id` is a member of the
    /// `all_frontends` broadcast group (§6: ids starting with `frontend_`).
    pub fn is_frontend_client(client_id: &str) -> bool {
        client_id.starts_with("frontend_")
    }
}

/// Seconds since the Unix epoch, as an `f64` (§3: "timestamp — seconds since
/// epoch (float)").
pub fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
