use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::events::SuggestionItem;
use crate::session::TranscriptEntry;

/// One recognition result from the STT backend. Partial results are
/// cumulative text for the ongoing utterance, not deltas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub is_partial: bool,
    pub text: String,
    pub speaker: String,
}

/// Streaming STT backend for a single session.
///
/// `start_stream` returns the result channel; it terminates when
/// `stop_stream` completes or the upstream errors.
#[async_trait]
pub trait SttClient: Send {
    async fn start_stream(
        &mut self,
        session_id: &str,
    ) -> anyhow::Result<mpsc::Receiver<TranscriptResult>>;

    async fn send_audio(&mut self, chunk: &[u8]) -> anyhow::Result<()>;

    async fn stop_stream(&mut self) -> anyhow::Result<()>;

    fn set_input_sample_rate(&mut self, sample_rate: u32);
}

/// Constructs one [`SttClient`] per session.
pub trait SttFactory: Send + Sync {
    fn create(&self) -> anyhow::Result<Box<dyn SttClient>>;
}

/// Text-in/text-out translation collaborator.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Low-latency translation for in-flight partial sentences.
    async fn translate_fast(&self, text: &str) -> anyhow::Result<String>;

    /// Context-aware translation for finalized segments. `recent_context`
    /// entries are pre-formatted `"{speaker}: {text}"` lines.
    async fn translate_with_context(
        &self,
        text: &str,
        recent_context: Option<&[String]>,
    ) -> anyhow::Result<String>;

    /// Reverse-direction translation backing the synchronous HTTP endpoint.
    async fn translate_reverse(&self, text: &str) -> anyhow::Result<String>;
}

/// Generates up to five suggested phrase pairs from recent transcripts.
#[async_trait]
pub trait Suggester: Send + Sync {
    async fn generate(
        &self,
        recent_transcripts: &[TranscriptEntry],
        system_prompt: Option<&str>,
    ) -> anyhow::Result<Vec<SuggestionItem>>;
}

/// Runs one correction prompt and returns the raw model response.
#[async_trait]
pub trait Corrector: Send + Sync {
    async fn correct_batch(&self, prompt: &str) -> anyhow::Result<String>;
}
