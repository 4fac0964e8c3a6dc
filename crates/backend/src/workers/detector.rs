// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Small-model worker / detector (C6, §4.6): consumes `stt.transcription`
//! envelopes, calls the detector LLM, filters candidate terms, persists
//! accepted detections, and emits `detection.immediate` feedback.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use termrelay_protocol::hallucination::is_hallucination;
use termrelay_protocol::{now_secs, Envelope};

use crate::bus::file_queue::FileQueue;
use crate::bus::queue::Queue;
use crate::bus::records::{DetectionRecord, DetectionStatus};
use crate::llm::LlmClient;
use crate::store::SettingsStore;
use crate::workers::cooldown::CooldownMap;
use crate::workers::filters::{fallback_detect, passes_input_gate, safe_json_extract, should_pass, RawTerm};

/// Fallback confidence assigned to terms the regex detector finds when the
/// LLM is unreachable or its response cannot be parsed at all (§4.6 step 2,
/// ported from `Backend/AI/SmallModel.py::detect_terms_fallback`).
const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Default confidence for the manual-request path when the LLM doesn't
/// return the requested term (§4.6 "Manual-request path").
const MANUAL_DEFAULT_CONFIDENCE: f64 = 0.7;

/// Consumes transcriptions, detects jargon terms, and hands them off to the
/// explainer (C7) via the detections file queue and a one-bit trigger
/// (§9 "implicit cyclic dependencies").
pub struct Detector {
    detections_file: Arc<FileQueue<DetectionRecord>>,
    outgoing: Arc<Queue>,
    settings: Arc<SettingsStore>,
    llm: Arc<dyn LlmClient>,
    cooldown: Mutex<CooldownMap>,
    explainer_trigger: Arc<Notify>,
}

impl Detector {
    pub fn new(
        detections_file: Arc<FileQueue<DetectionRecord>>,
        outgoing: Arc<Queue>,
        settings: Arc<SettingsStore>,
        llm: Arc<dyn LlmClient>,
        explainer_trigger: Arc<Notify>,
    ) -> Self {
        Self {
            detections_file,
            outgoing,
            settings,
            llm,
            cooldown: Mutex::new(CooldownMap::new()),
            explainer_trigger,
        }
    }

    /// Processes one `stt.transcription` envelope end to end (§4.6 steps
    /// 1-7). Emits no reply envelope to the client — only the
    /// `detection.immediate` broadcast, if any terms were accepted.
    pub async fn process_transcription(&self, envelope: &Envelope) {
        let text = envelope.payload.get("text").and_then(|v| v.as_str()).unwrap_or("").to_owned();
        let user_role = envelope.payload.get("user_role").and_then(|v| v.as_str()).map(str::to_owned);

        if !passes_input_gate(&text) {
            debug!(client_id = ?envelope.client_id, "detector: input gate rejected transcription");
            return;
        }
        if is_hallucination(&text) {
            debug!(client_id = ?envelope.client_id, "detector: hallucination guard rejected transcription");
            return;
        }

        let raw_terms = self.extract_terms(&text, user_role.as_deref()).await;
        if raw_terms.is_empty() {
            return;
        }

        let settings = self.settings.get_all();
        let now = now_secs();
        let mut accepted = Vec::new();
        {
            let mut cooldown = self.cooldown.lock().await;
            for term in raw_terms {
                let confidence = term.confidence.unwrap_or(0.5).clamp(0.0, 1.0);
                if should_pass(
                    confidence,
                    &term.term,
                    &cooldown,
                    now,
                    settings.confidence_threshold,
                    settings.cooldown_seconds,
                ) {
                    cooldown.record_accepted(&term.term, now);
                    accepted.push((term, confidence));
                }
            }
        }

        if accepted.is_empty() {
            return;
        }

        self.emit_immediate_feedback(&accepted, envelope.client_id.as_deref());

        let records: Vec<DetectionRecord> = accepted
            .into_iter()
            .map(|(term, confidence)| DetectionRecord {
                id: Uuid::new_v4().to_string(),
                term: term.term.clone(),
                context: term.context.unwrap_or_else(|| text.clone()),
                confidence,
                timestamp: term.timestamp.unwrap_or(now),
                client_id: envelope.client_id.clone(),
                user_session_id: envelope
                    .payload
                    .get("user_session_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_owned),
                original_message_id: envelope.id.clone(),
                status: DetectionStatus::Pending,
                explanation: None,
            })
            .collect();

        if let Err(e) = self.detections_file.append_many(records).await {
            warn!(err = %e, "detector: failed to persist detection records");
            return;
        }
        self.explainer_trigger.notify_one();
    }

    /// Manual-request path (§4.6 "Manual-request path"): performs only
    /// extraction and persistence for a single term, skipping the input
    /// gate, cooldown and confidence-threshold filters.
    pub async fn process_manual(&self, term: &str, context: &str, client_id: Option<&str>, original_message_id: &str) {
        let raw_terms = self.extract_terms(context, None).await;
        let matched = raw_terms.into_iter().find(|t| t.term.eq_ignore_ascii_case(term));
        let confidence = matched.as_ref().and_then(|t| t.confidence).unwrap_or(MANUAL_DEFAULT_CONFIDENCE);

        let record = DetectionRecord {
            id: Uuid::new_v4().to_string(),
            term: term.to_owned(),
            context: context.to_owned(),
            confidence: confidence.clamp(0.0, 1.0),
            timestamp: now_secs(),
            client_id: client_id.map(str::to_owned),
            user_session_id: None,
            original_message_id: original_message_id.to_owned(),
            status: DetectionStatus::Pending,
            explanation: None,
        };

        if let Err(e) = self.detections_file.append(record).await {
            warn!(err = %e, "detector: failed to persist manual detection record");
            return;
        }
        self.explainer_trigger.notify_one();
    }

    /// Issues the term-extraction request and defensively parses the
    /// response (§4.6 step 2), falling back to the regex detector on total
    /// failure.
    async fn extract_terms(&self, sentence: &str, user_role: Option<&str>) -> Vec<RawTerm> {
        let prompt = build_extraction_prompt(sentence, user_role);
        match self.llm.chat(None, &prompt).await {
            Ok(content) => {
                let terms = safe_json_extract(&content);
                if terms.is_empty() {
                    info!("detector: LLM response had no parseable terms, using fallback detector");
                    fallback_terms(sentence)
                } else {
                    terms
                }
            }
            Err(e) => {
                warn!(err = %e, "detector: LLM call failed, using fallback detector");
                fallback_terms(sentence)
            }
        }
    }

    /// Emits a `detection.immediate` envelope with each accepted term
    /// marked `status: "loading"` so the UI can render before explanations
    /// are ready (§4.6 step 5).
    fn emit_immediate_feedback(&self, accepted: &[(RawTerm, f64)], client_id: Option<&str>) {
        let terms: Vec<_> = accepted
            .iter()
            .map(|(term, confidence)| {
                json!({
                    "term": term.term,
                    "confidence": confidence,
                    "context": term.context,
                    "status": "loading",
                })
            })
            .collect();

        let mut envelope = Envelope::new("detection.immediate", json!({ "terms": terms }))
            .with_origin("SmallModel")
            .with_destination("frontend");
        if let Some(client_id) = client_id {
            envelope = envelope.with_client_id(client_id);
        }
        let outgoing = Arc::clone(&self.outgoing);
        tokio::spawn(async move {
            outgoing.enqueue(envelope).await;
        });
    }
}

fn fallback_terms(sentence: &str) -> Vec<RawTerm> {
    let now = now_secs();
    fallback_detect(sentence)
        .into_iter()
        .map(|term| RawTerm {
            term,
            confidence: Some(FALLBACK_CONFIDENCE),
            context: Some(sentence.to_owned()),
            timestamp: Some(now),
        })
        .collect()
}

/// Builds the term-extraction prompt (§6: "demands a raw JSON array only"),
/// ported from `Backend/AI/SmallModel.py::detect_terms_with_ai`.
fn build_extraction_prompt(sentence: &str, user_role: Option<&str>) -> String {
    let role_clause = user_role.map(|r| format!(", considering the user is a '{r}'")).unwrap_or_default();
    format!(
        "Mark the technical terms or words that might not be understood by a general \
audience in this sentence{role_clause}: \"{sentence}\"\n\n\
Extract technical or domain specific terms and return ONLY a valid JSON array of objects. \
Do not return anything else, no markdown, no comments, no prose.\n\n\
Each object must have these keys: \"term\" (string), \"confidence\" (float, 0.99 = very common, \
0.01 = very technical), \"context\" (string, the full input sentence), \"timestamp\" (int, a Unix \
timestamp). Higher confidence means the term is more common/well known; lower confidence means \
it is more likely to need an explanation.\n\n\
If no technical terms are present, return an empty array [] and nothing else."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubLlm {
        response: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn chat(&self, _system: Option<&str>, _user: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    fn detector_with(response: &str) -> (Detector, Arc<FileQueue<DetectionRecord>>, Arc<Queue>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
        let detections_file = Arc::new(FileQueue::new(dir.path().join("detections.json")));
        let outgoing = Arc::new(Queue::bounded("outgoing"));
        let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")));
        let llm = Arc::new(StubLlm { response: response.to_owned(), calls: AtomicUsize::new(0) });
        let trigger = Arc::new(Notify::new());
        let detector =
            Detector::new(Arc::clone(&detections_file), Arc::clone(&outgoing), settings, llm, trigger);
        (detector, detections_file, outgoing, dir)
    }

    #[tokio::test]
    async fn accepted_term_is_persisted_and_feedback_emitted() -> anyhow::Result<()> {
        let (detector, detections_file, outgoing, _dir) = detector_with(
            r#"[{"term":"backpropagation","confidence":0.2,"context":"We rely on backpropagation.","timestamp":1000}]"#,
        );
        let envelope = Envelope::new(
            "stt.transcription",
            json!({"text": "We rely on backpropagation in our neural network."}),
        )
        .with_client_id("frontend_a");

        detector.process_transcription(&envelope).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let records = detections_file.snapshot().await?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].term, "backpropagation");
        assert_eq!(records[0].status, DetectionStatus::Pending);

        let feedback = outgoing.dequeue().await;
        assert_eq!(feedback.kind, "detection.immediate");
        assert_eq!(feedback.destination.as_deref(), Some("frontend"));
        Ok(())
    }

    #[tokio::test]
    async fn hallucination_guard_drops_transcription() -> anyhow::Result<()> {
        let (detector, detections_file, outgoing, _dir) = detector_with("[]");
        let envelope = Envelope::new("stt.transcription", json!({"text": "Thanks for watching!"}));

        detector.process_transcription(&envelope).await;

        assert!(detections_file.snapshot().await?.is_empty());
        assert_eq!(outgoing.qsize().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn short_input_is_rejected_before_llm_call() -> anyhow::Result<()> {
        let (detector, detections_file, _outgoing, _dir) = detector_with("[]");
        let envelope = Envelope::new("stt.transcription", json!({"text": "hi there"}));

        detector.process_transcription(&envelope).await;

        assert!(detections_file.snapshot().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn manual_request_defaults_confidence_when_llm_omits_term() -> anyhow::Result<()> {
        let (detector, detections_file, _outgoing, _dir) = detector_with("[]");
        detector.process_manual("quantization", "We apply quantization to the model.", Some("frontend_a"), "msg-1").await;

        let records = detections_file.snapshot().await?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].term, "quantization");
        assert_eq!(records[0].confidence, MANUAL_DEFAULT_CONFIDENCE);
        Ok(())
    }
}
