use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use crate::provider::Corrector;
use crate::subtitle::SubtitleSegment;

/// One accepted correction for a finalized segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    pub segment_id: u64,
    pub original_text: String,
    pub corrected_text: String,
}

/// FIFO of finalized segments awaiting a lower-priority LLM correction pass.
///
/// `enqueue` never blocks; batches are drained by the session's correction
/// pump. A batch whose response fails to parse is dropped silently — no
/// retry, no dead-letter.
pub struct CorrectionQueue {
    queue: Mutex<VecDeque<SubtitleSegment>>,
    corrector: Arc<dyn Corrector>,
    batch_size: usize,
}

impl CorrectionQueue {
    pub fn new(corrector: Arc<dyn Corrector>, batch_size: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            corrector,
            batch_size,
        }
    }

    pub fn enqueue(&self, segment: SubtitleSegment) {
        self.queue.lock().push_back(segment);
    }

    /// Drains up to one batch, runs the corrector over it, and returns the
    /// corrections that actually changed their segment's text.
    pub async fn process_batch(&self) -> Vec<Correction> {
        let batch = self.drain_batch();
        if batch.is_empty() {
            return Vec::new();
        }
        let prompt = build_correction_prompt(&batch);
        match self.corrector.correct_batch(&prompt).await {
            Ok(response) => parse_corrections(&response, &batch),
            Err(error) => {
                warn!(error = %error, "LLM correction batch failed");
                Vec::new()
            }
        }
    }

    fn drain_batch(&self) -> Vec<SubtitleSegment> {
        let mut queue = self.queue.lock();
        let take = self.batch_size.min(queue.len());
        queue.drain(..take).collect()
    }
}

fn build_correction_prompt(segments: &[SubtitleSegment]) -> String {
    let lines: Vec<String> = segments
        .iter()
        .enumerate()
        .map(|(index, segment)| format!("{}. {}", index + 1, segment.text))
        .collect();
    format!(
        "Fix typos and spacing in the following live transcript lines.\n\
         Rules:\n\
         - Preserve meaning.\n\
         - Keep proper nouns consistent (e.g., AWS, API).\n\
         - Make minimal edits.\n\
         Input:\n{}\n\nRespond in JSON:\n{{\"corrections\": [\"corrected 1\", \"corrected 2\", \"...\"]}}",
        lines.join("\n")
    )
}

/// Parses the corrector's response. Malformed JSON, a non-object payload, a
/// missing/non-array `corrections` field, or more corrections than inputs all
/// invalidate the whole batch. Non-string array elements are skipped with
/// their index advancing.
fn parse_corrections(response: &str, segments: &[SubtitleSegment]) -> Vec<Correction> {
    let Some(data) = load_json(response) else {
        return Vec::new();
    };
    let Some(list) = data.get("corrections").and_then(Value::as_array) else {
        return Vec::new();
    };
    if list.len() > segments.len() {
        return Vec::new();
    }
    let mut corrections = Vec::new();
    for (segment, corrected) in segments.iter().zip(list) {
        let Some(corrected) = corrected.as_str() else {
            continue;
        };
        let corrected = corrected.trim();
        if !corrected.is_empty() && corrected != segment.text {
            corrections.push(Correction {
                segment_id: segment.segment_id,
                original_text: segment.text.clone(),
                corrected_text: corrected.to_string(),
            });
        }
    }
    corrections
}

/// Tolerant JSON extraction: a direct parse first, then the outermost `{…}`
/// span for responses wrapped in prose.
fn load_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if start >= end {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}
