use serde::{Deserialize, Serialize};

use crate::subtitle::SubtitleSegment;

/// Error codes the session may surface to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SessionNotFound,
    InvalidMessage,
    TranscribeStreamError,
    BedrockError,
    SuggestionError,
}

/// One suggested phrase pair from the suggestion generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionItem {
    pub source: String,
    pub target: String,
}

/// Outbound WebSocket frames. Serialized as JSON with a `type` discriminator
/// and camelCase field names; `ts` is assigned at emit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "server.pong", rename_all = "camelCase")]
    Pong { ts: i64 },

    #[serde(rename = "session.stop", rename_all = "camelCase")]
    SessionStop { ts: i64 },

    #[serde(rename = "transcript.partial", rename_all = "camelCase")]
    TranscriptPartial {
        ts: i64,
        session_id: String,
        speaker: String,
        text: String,
        segment_id: u64,
    },

    #[serde(rename = "transcript.final", rename_all = "camelCase")]
    TranscriptFinal {
        ts: i64,
        session_id: String,
        speaker: String,
        text: String,
        segment_id: u64,
    },

    #[serde(rename = "translation.final", rename_all = "camelCase")]
    TranslationFinal {
        ts: i64,
        session_id: String,
        source_ts: i64,
        segment_id: Option<u64>,
        speaker: String,
        source_text: String,
        translated_text: String,
    },

    #[serde(rename = "transcript.corrected", rename_all = "camelCase")]
    TranscriptCorrected {
        ts: i64,
        session_id: String,
        segment_id: u64,
        original_text: String,
        corrected_text: String,
    },

    #[serde(rename = "translation.corrected", rename_all = "camelCase")]
    TranslationCorrected {
        ts: i64,
        session_id: String,
        segment_id: u64,
        speaker: String,
        source_text: String,
        translated_text: String,
    },

    #[serde(rename = "display.update", rename_all = "camelCase")]
    DisplayUpdate {
        ts: i64,
        session_id: String,
        confirmed: Vec<SubtitleSegment>,
        current: Option<SubtitleSegment>,
    },

    #[serde(rename = "suggestions.update", rename_all = "camelCase")]
    SuggestionsUpdate {
        ts: i64,
        session_id: String,
        items: Vec<SuggestionItem>,
    },

    #[serde(rename = "error", rename_all = "camelCase")]
    Error {
        ts: i64,
        code: ErrorCode,
        message: String,
        retryable: Option<bool>,
    },
}
