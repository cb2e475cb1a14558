use std::sync::LazyLock;

use regex::Regex;

use crate::subtitle::{DisplayBuffer, SubtitleSegment};

/// Minimum time between throttled partial emissions.
const PARTIAL_UPDATE_INTERVAL_MS: i64 = 1000;
/// Minimum caption growth (in characters) for a time-triggered emission.
const PARTIAL_UPDATE_MIN_GROWTH: usize = 10;
/// Captions shorter than this are suppressed unless a sentence boundary changed.
const PARTIAL_UPDATE_MIN_LENGTH: usize = 18;

/// Characters that terminate a complete sentence.
const SENTENCE_ENDERS: &[char] = &['.', '!', '?', '。', '？', '！'];

/// Trailing clause punctuation or English connective that marks a natural
/// mid-sentence pause worth an extra caption emission.
static SOFT_BOUNDARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:[,;:]$|\b(?:and|but|so|because|if|when|which|that|or|while|then|however|therefore)$)",
    )
    .expect("soft boundary pattern compiles")
});

/// One accepted final transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub speaker: String,
    pub ts: i64,
    pub text: String,
}

/// One completed translation of a finalized segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationEntry {
    pub speaker: String,
    pub source_ts: i64,
    pub source_text: String,
    pub translated_text: String,
}

/// State of the single in-flight utterance. Cleared when its final arrives;
/// `segment_id` is reserved on the first emission and reused by the final.
#[derive(Debug, Default)]
struct PartialState {
    last_complete_sentence: String,
    last_caption_text: String,
    last_emit_ts: i64,
    last_emit_len: usize,
    last_translation_text: String,
    last_translation_ts: i64,
    last_translation_segment_id: Option<u64>,
    segment_id: Option<u64>,
}

/// The state machine's verdict for one partial result: a caption to show and,
/// when a new complete sentence appeared, a translation trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialEmit {
    pub caption_text: String,
    pub translation_text: Option<String>,
    pub segment_id: u64,
}

/// In-memory state for one meeting session: the transcript and translation
/// logs, the partial-emit state machine, the display buffer and the
/// suggestion cadence counter. Owned by the session's orchestrator.
pub struct MeetingSession {
    session_id: String,
    transcripts: Vec<TranscriptEntry>,
    translations: Vec<TranslationEntry>,
    partial_state: Option<PartialState>,
    display_buffer: DisplayBuffer,
    since_last_suggestion: u32,
    segment_counter: u64,
    suggestions_prompt: String,
}

impl MeetingSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            transcripts: Vec::new(),
            translations: Vec::new(),
            partial_state: None,
            display_buffer: DisplayBuffer::default(),
            since_last_suggestion: 0,
            segment_counter: 0,
            suggestions_prompt: String::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Applies a segment to the display buffer and returns a snapshot.
    pub fn update_display_buffer(&mut self, segment: SubtitleSegment) -> DisplayBuffer {
        self.display_buffer.apply(segment);
        self.display_buffer.clone()
    }

    pub fn display_buffer(&self) -> &DisplayBuffer {
        &self.display_buffer
    }

    /// Accepts a final STT result: clears the partial state, reuses its
    /// reserved segment id (or allocates the next one), and appends the
    /// transcript entry. Returns the trimmed text and segment id.
    pub fn add_final_transcript(&mut self, _speaker: &str, text: &str, ts: i64) -> (String, u64) {
        let partial = self.partial_state.take();
        let segment_id = match partial.and_then(|state| state.segment_id) {
            Some(id) => id,
            None => self.next_segment_id(),
        };

        // Diarization is out of scope; every session runs one speaker label.
        let speaker = "spk_1".to_string();
        self.since_last_suggestion += 1;
        let trimmed = text.trim().to_string();
        self.transcripts.push(TranscriptEntry {
            speaker,
            ts,
            text: trimmed.clone(),
        });

        (trimmed, segment_id)
    }

    /// Runs one partial STT result through the emit gate.
    ///
    /// Emission requires one of: a changed sentence boundary, a soft boundary
    /// at the end of the text, enough time AND growth since the last emit, or
    /// a first emission with enough growth. Duplicate captions and captions
    /// below the minimum length (without a boundary change) are suppressed.
    pub fn extract_partial_emit(
        &mut self,
        _speaker: &str,
        ts: i64,
        text: &str,
    ) -> Option<PartialEmit> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        let mut state = self.partial_state.take().unwrap_or_default();

        let (sentences, remainder) = split_sentences(trimmed);
        let mut boundary_changed = false;
        if let Some(candidate) = sentences.last()
            && *candidate != state.last_complete_sentence
        {
            boundary_changed = true;
            state.last_complete_sentence = candidate.clone();
        }

        let caption_text = build_partial_caption(&sentences, &remainder);
        if caption_text.is_empty() {
            self.partial_state = Some(state);
            return None;
        }
        let caption_len = caption_text.chars().count();
        if caption_len < PARTIAL_UPDATE_MIN_LENGTH && !boundary_changed {
            self.partial_state = Some(state);
            return None;
        }

        let soft_boundary = SOFT_BOUNDARY_RE.is_match(trimmed);
        let growth = if state.last_emit_len == 0 {
            caption_len
        } else {
            caption_len.saturating_sub(state.last_emit_len)
        };
        let time_triggered = state.last_emit_ts > 0
            && ts - state.last_emit_ts >= PARTIAL_UPDATE_INTERVAL_MS
            && growth >= PARTIAL_UPDATE_MIN_GROWTH;
        let first_trigger = state.last_emit_ts == 0 && growth >= PARTIAL_UPDATE_MIN_GROWTH;

        if !(boundary_changed || soft_boundary || time_triggered || first_trigger) {
            self.partial_state = Some(state);
            return None;
        }
        if caption_text == state.last_caption_text {
            self.partial_state = Some(state);
            return None;
        }

        state.last_caption_text = caption_text.clone();
        state.last_emit_ts = ts;
        state.last_emit_len = caption_len;
        let segment_id = match state.segment_id {
            Some(id) => id,
            None => {
                let id = self.next_segment_id();
                state.segment_id = Some(id);
                id
            }
        };

        let mut translation_text = sentences.last().cloned();
        if let Some(candidate) = &translation_text {
            if *candidate != state.last_translation_text {
                state.last_translation_text = candidate.clone();
                state.last_translation_ts = ts;
                state.last_translation_segment_id = Some(segment_id);
            } else {
                translation_text = None;
            }
        }

        self.partial_state = Some(state);
        Some(PartialEmit {
            caption_text,
            translation_text,
            segment_id,
        })
    }

    /// Staleness check for a late partial-translation completion: true iff
    /// the live partial state still records exactly the emitted trigger.
    pub fn is_partial_translation_current(
        &self,
        _speaker: &str,
        ts: i64,
        text: &str,
        segment_id: u64,
    ) -> bool {
        let Some(state) = &self.partial_state else {
            return false;
        };
        state.last_translation_ts == ts
            && state.last_translation_text == text
            && state.last_translation_segment_id == Some(segment_id)
    }

    pub fn add_translation(
        &mut self,
        speaker: &str,
        source_ts: i64,
        source_text: &str,
        translated_text: &str,
    ) {
        self.translations.push(TranslationEntry {
            speaker: speaker.to_string(),
            source_ts,
            source_text: source_text.to_string(),
            translated_text: translated_text.to_string(),
        });
    }

    pub fn translations(&self) -> &[TranslationEntry] {
        &self.translations
    }

    pub fn set_suggestions_prompt(&mut self, prompt: &str) {
        self.suggestions_prompt = prompt.trim().to_string();
    }

    pub fn suggestions_prompt(&self) -> &str {
        &self.suggestions_prompt
    }

    /// Suggestion cadence: fire after the very first transcript, then after
    /// every two further transcripts since the last emitted suggestion set.
    pub fn should_update_suggestions(&self) -> bool {
        if self.transcripts.is_empty() || self.since_last_suggestion == 0 {
            return false;
        }
        if self.transcripts.len() == 1 {
            return true;
        }
        self.since_last_suggestion >= 2
    }

    pub fn mark_suggestions_updated(&mut self) {
        self.since_last_suggestion = 0;
    }

    /// Chronological tail of the transcript log.
    pub fn recent_transcripts(&self, limit: usize) -> Vec<TranscriptEntry> {
        let start = self.transcripts.len().saturating_sub(limit);
        self.transcripts[start..].to_vec()
    }

    /// Up to `limit` most recent non-empty transcripts, excluding the entry
    /// at `exclude_ts`, in chronological order. Feeds the final-translation
    /// context window.
    pub fn recent_context(&self, limit: usize, exclude_ts: Option<i64>) -> Vec<TranscriptEntry> {
        if limit == 0 {
            return Vec::new();
        }
        let mut collected: Vec<TranscriptEntry> = self
            .transcripts
            .iter()
            .rev()
            .filter(|entry| exclude_ts != Some(entry.ts))
            .filter(|entry| !entry.text.trim().is_empty())
            .take(limit)
            .cloned()
            .collect();
        collected.reverse();
        collected
    }

    fn next_segment_id(&mut self) -> u64 {
        self.segment_counter += 1;
        self.segment_counter
    }
}

/// Splits text into complete sentences (terminated by a sentence ender) and a
/// trailing remainder. Unicode enders are honored.
pub(crate) fn split_sentences(text: &str) -> (Vec<String>, String) {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if SENTENCE_ENDERS.contains(&ch) {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }
    (sentences, current.trim().to_string())
}

/// The STT provider emits cumulative partials, so the caption is the whole
/// accumulated text.
fn build_partial_caption(sentences: &[String], remainder: &str) -> String {
    let mut parts: Vec<&str> = sentences.iter().map(String::as_str).collect();
    if !remainder.is_empty() {
        parts.push(remainder);
    }
    parts.join(" ")
}
