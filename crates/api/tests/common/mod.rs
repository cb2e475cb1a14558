#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use meetbridge_api::{build_router, state::AppState};
use meetbridge_config::Settings;
use meetbridge_core::{
    Corrector, SttClient, SttFactory, SuggestionItem, Suggester, TranscriptEntry,
    TranscriptResult, Translator,
};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Scripted STT backend: replays a fixed result sequence, then holds the
/// stream open until the session tears it down.
pub struct FakeSttFactory {
    pub script: Vec<TranscriptResult>,
    pub delay_ms: u64,
}

impl SttFactory for FakeSttFactory {
    fn create(&self) -> anyhow::Result<Box<dyn SttClient>> {
        Ok(Box::new(FakeSttClient {
            script: self.script.clone(),
            delay_ms: self.delay_ms,
            stop_tx: None,
        }))
    }
}

struct FakeSttClient {
    script: Vec<TranscriptResult>,
    delay_ms: u64,
    stop_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

#[async_trait]
impl SttClient for FakeSttClient {
    async fn start_stream(
        &mut self,
        _session_id: &str,
    ) -> anyhow::Result<mpsc::Receiver<TranscriptResult>> {
        let (tx, rx) = mpsc::channel(32);
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
        self.stop_tx = Some(stop_tx);
        let script = std::mem::take(&mut self.script);
        let delay = Duration::from_millis(self.delay_ms);
        tokio::spawn(async move {
            for result in script {
                tokio::time::sleep(delay).await;
                if tx.send(result).await.is_err() {
                    return;
                }
            }
            // Keep the stream alive until the session stops it or drops
            // its receiver.
            tokio::select! {
                _ = tx.closed() => {}
                _ = &mut stop_rx => {}
            }
        });
        Ok(rx)
    }

    async fn send_audio(&mut self, _chunk: &[u8]) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop_stream(&mut self) -> anyhow::Result<()> {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        Ok(())
    }

    fn set_input_sample_rate(&mut self, _sample_rate: u32) {}
}

pub struct FakeTranslator;

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate_fast(&self, _text: &str) -> anyhow::Result<String> {
        Ok("translated".to_string())
    }

    async fn translate_with_context(
        &self,
        _text: &str,
        _recent_context: Option<&[String]>,
    ) -> anyhow::Result<String> {
        Ok("translated_history".to_string())
    }

    async fn translate_reverse(&self, _text: &str) -> anyhow::Result<String> {
        Ok("reversed".to_string())
    }
}

pub struct FakeSuggester {
    pub items: Vec<SuggestionItem>,
}

#[async_trait]
impl Suggester for FakeSuggester {
    async fn generate(
        &self,
        _recent_transcripts: &[TranscriptEntry],
        _system_prompt: Option<&str>,
    ) -> anyhow::Result<Vec<SuggestionItem>> {
        Ok(self.items.clone())
    }
}

pub struct FakeCorrector {
    pub response: String,
}

#[async_trait]
impl Corrector for FakeCorrector {
    async fn correct_batch(&self, _prompt: &str) -> anyhow::Result<String> {
        Ok(self.response.clone())
    }
}

pub fn test_settings() -> Settings {
    Settings {
        llm_correction_enabled: false,
        llm_correction_interval_ms: 50,
        ..Settings::default()
    }
}

pub fn app_state(
    settings: Settings,
    script: Vec<TranscriptResult>,
    suggestions: Vec<SuggestionItem>,
    correction_response: &str,
) -> AppState {
    AppState {
        settings: Arc::new(settings),
        stt_factory: Arc::new(FakeSttFactory {
            script,
            delay_ms: 30,
        }),
        translator: Arc::new(FakeTranslator),
        suggester: Arc::new(FakeSuggester { items: suggestions }),
        corrector: Arc::new(FakeCorrector {
            response: correction_response.to_string(),
        }),
    }
}

pub fn partial(text: &str) -> TranscriptResult {
    TranscriptResult {
        is_partial: true,
        text: text.to_string(),
        speaker: "spk_1".to_string(),
    }
}

pub fn final_result(text: &str) -> TranscriptResult {
    TranscriptResult {
        is_partial: false,
        text: text.to_string(),
        speaker: "spk_1".to_string(),
    }
}

/// Binds an ephemeral port, serves the router, and returns the address.
pub async fn spawn_app(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, build_router(state))
            .await
            .expect("serve test app");
    });
    format!("127.0.0.1:{}", addr.port())
}

pub async fn connect_ws(addr: &str, session_id: &str) -> WsClient {
    let (ws, _response) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws/v1/meetings/{session_id}"))
            .await
            .expect("connect websocket");
    ws
}

/// Reads the next JSON event frame, skipping control frames. Returns `None`
/// on close or timeout.
pub async fn next_json(ws: &mut WsClient) -> Option<Value> {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(3), ws.next())
            .await
            .ok()??;
        match message.ok()? {
            Message::Text(text) => return serde_json::from_str(text.as_str()).ok(),
            Message::Close(_) => return None,
            _ => {}
        }
    }
}

/// Collects events until the predicate is satisfied or the stream ends.
pub async fn collect_until<F>(ws: &mut WsClient, mut done: F, max_events: usize) -> Vec<Value>
where
    F: FnMut(&[Value]) -> bool,
{
    let mut events = Vec::new();
    while events.len() < max_events {
        let Some(event) = next_json(ws).await else {
            break;
        };
        events.push(event);
        if done(&events) {
            break;
        }
    }
    events
}

pub fn first_of<'a>(events: &'a [Value], event_type: &str) -> Option<&'a Value> {
    events
        .iter()
        .find(|event| event["type"] == event_type)
}

pub fn index_of(events: &[Value], event_type: &str) -> Option<usize> {
    events
        .iter()
        .position(|event| event["type"] == event_type)
}
