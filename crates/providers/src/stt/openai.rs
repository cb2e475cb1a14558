use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use meetbridge_config::Settings;
use meetbridge_core::{SttClient, TranscriptResult};

use crate::ProviderError;

const REALTIME_API_URL: &str = "wss://api.openai.com/v1/realtime";
/// The realtime transcription session consumes PCM16 at 24 kHz.
const REALTIME_SAMPLE_RATE: u32 = 24_000;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Streaming STT over the realtime transcription WebSocket.
///
/// Audio is appended base64-encoded and committed on an interval; the inbound
/// task accumulates per-item transcription deltas into cumulative partials
/// and forwards completed utterances as finals.
pub struct OpenAiSttClient {
    api_key: String,
    model: String,
    language: String,
    commit_interval: Duration,
    input_sample_rate: u32,
    sink: Option<WsSink>,
    inbound: Option<AbortHandle>,
    last_commit: Option<Instant>,
}

impl OpenAiSttClient {
    pub fn new(settings: &Settings) -> Result<Self, ProviderError> {
        let api_key = settings
            .openai_api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(ProviderError::MissingApiKey)?;
        Ok(Self {
            api_key: api_key.to_string(),
            model: settings.openai_stt_model.clone(),
            language: settings.stt_language(),
            commit_interval: Duration::from_millis(settings.openai_commit_interval_ms),
            input_sample_rate: settings.transcribe_sample_rate,
            sink: None,
            inbound: None,
            last_commit: None,
        })
    }

    async fn maybe_commit(&mut self) -> anyhow::Result<()> {
        let due = self
            .last_commit
            .is_none_or(|at| at.elapsed() >= self.commit_interval);
        if !due {
            return Ok(());
        }
        self.last_commit = Some(Instant::now());
        if let Some(sink) = self.sink.as_mut() {
            let commit = serde_json::json!({"type": "input_audio_buffer.commit"});
            sink.send(WsMessage::Text(commit.to_string().into()))
                .await
                .context("failed to commit the upstream audio buffer")?;
        }
        Ok(())
    }
}

#[async_trait]
impl SttClient for OpenAiSttClient {
    async fn start_stream(
        &mut self,
        session_id: &str,
    ) -> anyhow::Result<mpsc::Receiver<TranscriptResult>> {
        let url = format!("{REALTIME_API_URL}?model={}", self.model);
        let mut request = url
            .into_client_request()
            .context("failed to build the realtime STT request")?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {}", self.api_key)
                .parse()
                .context("invalid auth header")?,
        );
        request
            .headers_mut()
            .insert("OpenAI-Beta", "realtime=v1".parse().context("invalid header")?);

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .context("failed to connect to the realtime STT endpoint")?;
        let (mut sink, source) = stream.split();

        let configure = serde_json::json!({
            "type": "session.update",
            "session": {
                "type": "transcription",
                "audio": {
                    "input": {
                        "format": {"type": "audio/pcm", "rate": REALTIME_SAMPLE_RATE},
                        "transcription": {
                            "model": self.model.clone(),
                            "language": self.language.clone(),
                        },
                        "turn_detection": null,
                    }
                }
            }
        });
        sink.send(WsMessage::Text(configure.to_string().into()))
            .await
            .context("failed to configure the realtime STT session")?;

        let (result_tx, result_rx) = mpsc::channel(256);
        let sid = session_id.to_string();
        let handle = tokio::spawn(receive_loop(source, result_tx, sid));
        self.inbound = Some(handle.abort_handle());
        self.sink = Some(sink);
        self.last_commit = None;
        Ok(result_rx)
    }

    async fn send_audio(&mut self, chunk: &[u8]) -> anyhow::Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        let resampled;
        let payload = if self.input_sample_rate == REALTIME_SAMPLE_RATE {
            chunk
        } else {
            resampled = resample_16k_to_24k(chunk);
            &resampled
        };
        if payload.is_empty() {
            return Ok(());
        }
        let append = serde_json::json!({
            "type": "input_audio_buffer.append",
            "audio": BASE64.encode(payload),
        });
        sink.send(WsMessage::Text(append.to_string().into()))
            .await
            .context("failed to forward audio upstream")?;
        self.maybe_commit().await
    }

    async fn stop_stream(&mut self) -> anyhow::Result<()> {
        if let Some(handle) = self.inbound.take() {
            handle.abort();
        }
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.send(WsMessage::Close(None)).await;
        }
        Ok(())
    }

    fn set_input_sample_rate(&mut self, sample_rate: u32) {
        self.input_sample_rate = sample_rate;
    }
}

/// What one upstream server event means for the result stream.
enum RealtimeEvent {
    Results(Vec<TranscriptResult>),
    Failed(String),
    Ignored,
}

async fn receive_loop(
    mut source: WsSource,
    result_tx: mpsc::Sender<TranscriptResult>,
    session_id: String,
) {
    let mut partial_by_item: HashMap<String, String> = HashMap::new();

    while let Some(message) = source.next().await {
        match message {
            Ok(WsMessage::Text(text)) => {
                match parse_realtime_event(&text, &mut partial_by_item) {
                    RealtimeEvent::Results(results) => {
                        for result in results {
                            if result_tx.send(result).await.is_err() {
                                return;
                            }
                        }
                    }
                    RealtimeEvent::Failed(reason) => {
                        warn!(session_id = %session_id, %reason, "Realtime STT stream failed");
                        return;
                    }
                    RealtimeEvent::Ignored => {}
                }
            }
            Ok(WsMessage::Close(frame)) => {
                debug!(session_id = %session_id, ?frame, "Realtime STT connection closed");
                return;
            }
            Ok(_) => {}
            Err(error) => {
                warn!(session_id = %session_id, %error, "Realtime STT receive error");
                return;
            }
        }
    }
}

fn parse_realtime_event(
    text: &str,
    partial_by_item: &mut HashMap<String, String>,
) -> RealtimeEvent {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return RealtimeEvent::Failed("malformed server event".to_string());
    };

    match value.get("type").and_then(Value::as_str).unwrap_or("") {
        "conversation.item.input_audio_transcription.delta" => {
            let item_id = value.get("item_id").and_then(Value::as_str).unwrap_or("");
            let delta = value.get("delta").and_then(Value::as_str).unwrap_or("");
            if item_id.is_empty() {
                return RealtimeEvent::Ignored;
            }
            let accumulated = partial_by_item.entry(item_id.to_string()).or_default();
            accumulated.push_str(delta);
            RealtimeEvent::Results(vec![TranscriptResult {
                is_partial: true,
                text: accumulated.clone(),
                speaker: "spk_1".to_string(),
            }])
        }
        "conversation.item.input_audio_transcription.completed" => {
            if let Some(item_id) = value.get("item_id").and_then(Value::as_str) {
                partial_by_item.remove(item_id);
            }
            let transcript = value
                .get("transcript")
                .and_then(Value::as_str)
                .unwrap_or("");
            RealtimeEvent::Results(vec![TranscriptResult {
                is_partial: false,
                text: transcript.to_string(),
                speaker: "spk_1".to_string(),
            }])
        }
        "conversation.item.input_audio_transcription.failed" => {
            RealtimeEvent::Failed("upstream transcription failed".to_string())
        }
        _ => RealtimeEvent::Ignored,
    }
}

/// Linear interpolation from 16 kHz PCM16 LE to the 24 kHz the realtime
/// session expects.
fn resample_16k_to_24k(audio_16k: &[u8]) -> Vec<u8> {
    let samples: Vec<i16> = audio_16k
        .chunks_exact(2)
        .map(|bytes| i16::from_le_bytes([bytes[0], bytes[1]]))
        .collect();
    if samples.is_empty() {
        return Vec::new();
    }
    let out_len = samples.len() * 3 / 2;
    let mut out = Vec::with_capacity(out_len * 2);
    for j in 0..out_len {
        let pos = j as f64 * 2.0 / 3.0;
        let index = pos as usize;
        let frac = pos - index as f64;
        let left = f64::from(samples[index]);
        let right = if index + 1 < samples.len() {
            f64::from(samples[index + 1])
        } else {
            left
        };
        let sample = (left * (1.0 - frac) + right * frac) as i16;
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}
