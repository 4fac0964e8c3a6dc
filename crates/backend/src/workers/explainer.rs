// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Main-model worker / explainer (C7, §4.7): drains pending detections in
//! timestamp order, calls the explainer LLM, and appends explanation
//! records for the delivery service (C8) to pick up.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use termrelay_protocol::now_secs;

use crate::bus::file_queue::FileQueue;
use crate::bus::records::{
    DetectionRecord, DetectionStatus, ExplanationMessageType, ExplanationRecord, ExplanationStatus,
};
use crate::llm::LlmClient;
use crate::store::SettingsStore;

/// Main-model worker: one pending detection at a time, ascending
/// `timestamp`, ties broken by `id` (§5 "Ordering guarantees").
pub struct Explainer {
    detections_file: Arc<FileQueue<DetectionRecord>>,
    explanations_file: Arc<FileQueue<ExplanationRecord>>,
    settings: Arc<SettingsStore>,
    llm: Arc<dyn LlmClient>,
    delivery_trigger: Arc<Notify>,
}

impl Explainer {
    pub fn new(
        detections_file: Arc<FileQueue<DetectionRecord>>,
        explanations_file: Arc<FileQueue<ExplanationRecord>>,
        settings: Arc<SettingsStore>,
        llm: Arc<dyn LlmClient>,
        delivery_trigger: Arc<Notify>,
    ) -> Self {
        Self { detections_file, explanations_file, settings, llm, delivery_trigger }
    }

    /// Runs until `shutdown` is cancelled, triggered either by the
    /// detector's one-bit signal or a bounded fallback poll (§9 "polling
    /// loops" redesign note).
    pub async fn run(&self, trigger: Arc<Notify>, shutdown: CancellationToken) {
        info!("explainer: worker loop started");
        loop {
            self.drain_pending().await;
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("explainer: worker loop stopped");
                    return;
                }
                _ = trigger.notified() => {}
                _ = tokio::time::sleep(std::time::Duration::from_secs(2)) => {}
            }
        }
    }

    /// Processes every currently pending detection once (§4.7 steps 1-5).
    /// Cancellation is only observed between records, never mid-LLM-call
    /// (§4.7 "Cancellation").
    async fn drain_pending(&self) {
        let mut pending = match self
            .detections_file
            .load_where(|r| r.status == DetectionStatus::Pending)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(err = %e, "explainer: failed to load pending detections");
                return;
            }
        };
        pending.sort_by(|a, b| {
            a.timestamp.partial_cmp(&b.timestamp).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.id.cmp(&b.id))
        });

        for record in pending {
            self.process_one(record).await;
        }
    }

    async fn process_one(&self, record: DetectionRecord) {
        // A detection carrying a prior "explanation failed: ..." marker was
        // requeued by `requeue_failed`; its eventual success is a retry
        // (§4.7 "Retry policy").
        let is_retry = record.explanation.as_deref().is_some_and(|e| e.starts_with(FAILURE_MARKER));

        let claimed = self
            .detections_file
            .try_transition(&record.id, |r| {
                if r.status == DetectionStatus::Pending {
                    r.status = DetectionStatus::Processing;
                    true
                } else {
                    false
                }
            })
            .await;
        match claimed {
            Ok(true) => {}
            Ok(false) => return, // lost the race; another pass already claimed it
            Err(e) => {
                warn!(err = %e, id = %record.id, "explainer: failed to claim detection");
                return;
            }
        }

        let settings = self.settings.get_all();
        let prompt = build_explanation_prompt(&record, &settings.domain, &settings.explanation_style);

        match self.llm.chat(Some(&explainer_system_prompt()), &prompt).await {
            Ok(explanation) => self.on_success(&record, explanation.trim().to_owned(), is_retry).await,
            Err(e) => self.on_failure(&record, &e.to_string()).await,
        }
    }

    async fn on_success(&self, record: &DetectionRecord, explanation: String, is_retry: bool) {
        let result = self
            .detections_file
            .try_transition(&record.id, |r| {
                r.status = DetectionStatus::Processed;
                r.explanation = Some(explanation.clone());
                true
            })
            .await;
        if let Err(e) = result {
            warn!(err = %e, id = %record.id, "explainer: failed to mark detection processed");
            return;
        }

        let explanation_record = ExplanationRecord {
            id: Uuid::new_v4().to_string(),
            term: record.term.clone(),
            explanation,
            context: record.context.clone(),
            confidence: record.confidence,
            timestamp: now_secs(),
            client_id: record.client_id.clone(),
            user_session_id: record.user_session_id.clone(),
            original_detection_id: record.id.clone(),
            status: ExplanationStatus::ReadyForDelivery,
            delivered_at: None,
            message_type: if is_retry { ExplanationMessageType::Retry } else { ExplanationMessageType::New },
        };
        if let Err(e) = self.explanations_file.append(explanation_record).await {
            warn!(err = %e, id = %record.id, "explainer: failed to persist explanation record");
            return;
        }
        self.delivery_trigger.notify_one();
    }

    async fn on_failure(&self, record: &DetectionRecord, diagnostic: &str) {
        warn!(err = %diagnostic, id = %record.id, term = %record.term, "explainer: LLM call failed");
        let result = self
            .detections_file
            .try_transition(&record.id, |r| {
                r.status = DetectionStatus::Failed;
                r.explanation = Some(format!("{FAILURE_MARKER}{diagnostic}"));
                true
            })
            .await;
        if let Err(e) = result {
            warn!(err = %e, id = %record.id, "explainer: failed to mark detection failed");
        }
    }

    /// Re-enqueues `failed` detections as `pending` for another pass. Their
    /// `explanation` field still carries the `FAILURE_MARKER` diagnostic
    /// from the last attempt, which is how the next `process_one` call
    /// recognizes this as a retry and stamps `message_type:
    /// explanation.retry` on success (§4.7 "Retry policy", an out-of-band
    /// operator action — not called automatically).
    pub async fn requeue_failed(&self, ids: &[String]) -> anyhow::Result<Vec<String>> {
        self.detections_file
            .update_many(ids, |r| {
                if r.status == DetectionStatus::Failed {
                    r.status = DetectionStatus::Pending;
                }
            })
            .await
    }
}

/// Prefix marking a detection's `explanation` field as a failure
/// diagnostic rather than a real explanation, so a subsequent successful
/// retry can be distinguished from a first-time success.
const FAILURE_MARKER: &str = "explanation failed: ";

fn explainer_system_prompt() -> String {
    "You are a concise technical explainer embedded in a live captioning tool. \
Given a term and the sentence it appeared in, respond with a 1-2 sentence, neutral \
explanation suitable for a general audience. Do not repeat the question, do not use \
markdown, and do not add any preamble."
        .to_owned()
}

/// Builds the explanation prompt from `(term, context, domain, style)`
/// (§4.7 step 3, ported from `Backend/AI/MainModel.py`).
fn build_explanation_prompt(record: &DetectionRecord, domain: &str, style: &str) -> String {
    let domain_clause =
        if domain.is_empty() { String::new() } else { format!(" in the domain of {domain}") };
    format!(
        "Explain the term \"{}\" as used in this sentence{domain_clause}: \"{}\"\n\n\
Audience style: {style}. Respond with a short, neutral explanation only.",
        record.term, record.context
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct StubLlm {
        response: Result<String, String>,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn chat(&self, _system: Option<&str>, _user: &str) -> anyhow::Result<String> {
            self.response.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn detection(term: &str, timestamp: f64) -> DetectionRecord {
        DetectionRecord {
            id: Uuid::new_v4().to_string(),
            term: term.to_owned(),
            context: format!("We use {term} here."),
            confidence: 0.2,
            timestamp,
            client_id: Some("frontend_a".to_owned()),
            user_session_id: None,
            original_message_id: "msg-1".to_owned(),
            status: DetectionStatus::Pending,
            explanation: None,
        }
    }

    async fn fixture(
        response: Result<String, String>,
    ) -> (Explainer, Arc<FileQueue<DetectionRecord>>, Arc<FileQueue<ExplanationRecord>>, tempfile::TempDir)
    {
        let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
        let detections_file = Arc::new(FileQueue::new(dir.path().join("detections.json")));
        let explanations_file = Arc::new(FileQueue::new(dir.path().join("explanations.json")));
        let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")));
        let llm = Arc::new(StubLlm { response });
        let trigger = Arc::new(Notify::new());
        let explainer = Explainer::new(
            Arc::clone(&detections_file),
            Arc::clone(&explanations_file),
            settings,
            llm,
            trigger,
        );
        (explainer, detections_file, explanations_file, dir)
    }

    #[tokio::test]
    async fn pending_detection_produces_ready_explanation() -> anyhow::Result<()> {
        let (explainer, detections_file, explanations_file, _dir) =
            fixture(Ok("Backpropagation adjusts model weights using gradients.".to_owned())).await;
        detections_file.append(detection("backpropagation", 1.0)).await?;

        explainer.drain_pending().await;

        let detections = detections_file.snapshot().await?;
        assert_eq!(detections[0].status, DetectionStatus::Processed);
        assert!(detections[0].explanation.is_some());

        let explanations = explanations_file.snapshot().await?;
        assert_eq!(explanations.len(), 1);
        assert_eq!(explanations[0].status, ExplanationStatus::ReadyForDelivery);
        assert_eq!(explanations[0].term, "backpropagation");
        Ok(())
    }

    #[tokio::test]
    async fn llm_failure_marks_detection_failed() -> anyhow::Result<()> {
        let (explainer, detections_file, explanations_file, _dir) =
            fixture(Err("timeout".to_owned())).await;
        detections_file.append(detection("quantization", 1.0)).await?;

        explainer.drain_pending().await;

        let detections = detections_file.snapshot().await?;
        assert_eq!(detections[0].status, DetectionStatus::Failed);
        assert!(explanations_file.snapshot().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn processes_in_ascending_timestamp_order() -> anyhow::Result<()> {
        let (explainer, detections_file, explanations_file, _dir) =
            fixture(Ok("An explanation.".to_owned())).await;
        detections_file.append(detection("second", 2.0)).await?;
        detections_file.append(detection("first", 1.0)).await?;

        explainer.drain_pending().await;

        let explanations = explanations_file.snapshot().await?;
        assert_eq!(explanations[0].term, "first");
        assert_eq!(explanations[1].term, "second");
        Ok(())
    }

    #[tokio::test]
    async fn requeue_failed_resets_status_to_pending() -> anyhow::Result<()> {
        let (explainer, detections_file, _explanations_file, _dir) =
            fixture(Err("timeout".to_owned())).await;
        detections_file.append(detection("term", 1.0)).await?;
        explainer.drain_pending().await;
        let id = detections_file.snapshot().await?[0].id.clone();

        let touched = explainer.requeue_failed(&[id.clone()]).await?;
        assert_eq!(touched, vec![id]);
        let detections = detections_file.snapshot().await?;
        assert_eq!(detections[0].status, DetectionStatus::Pending);
        Ok(())
    }
}
