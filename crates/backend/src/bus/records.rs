// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Record types stored in the two file-backed queues (§3).

use crate::bus::file_queue::Keyed;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub id: String,
    pub term: String,
    pub context: String,
    pub confidence: f64,
    pub timestamp: f64,
    pub client_id: Option<String>,
    #[serde(default)]
    pub user_session_id: Option<String>,
    pub original_message_id: String,
    pub status: DetectionStatus,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl Keyed for DetectionRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationStatus {
    ReadyForDelivery,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationMessageType {
    #[serde(rename = "explanation.new")]
    New,
    #[serde(rename = "explanation.retry")]
    Retry,
}

impl ExplanationMessageType {
    pub fn as_message_type(&self) -> &'static str {
        match self {
            Self::New => "explanation.new",
            Self::Retry => "explanation.retry",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationRecord {
    pub id: String,
    pub term: String,
    pub explanation: String,
    pub context: String,
    pub confidence: f64,
    pub timestamp: f64,
    pub client_id: Option<String>,
    #[serde(default)]
    pub user_session_id: Option<String>,
    pub original_detection_id: String,
    pub status: ExplanationStatus,
    #[serde(default)]
    pub delivered_at: Option<f64>,
    pub message_type: ExplanationMessageType,
}

impl Keyed for ExplanationRecord {
    fn id(&self) -> &str {
        &self.id
    }
}
