use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::StreamExt;
use parking_lot::Mutex;
use rand::Rng as _;
use serde_json::Value;
use tokio::sync::{Notify, Semaphore, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use meetbridge_core::{
    CorrectionQueue, ErrorCode, MeetingSession, ServerEvent, SttClient, SubtitleSegment,
    TranscriptEntry, TranscriptResult, epoch_ms,
};

use super::sender::SessionSender;
use super::tasks::BackgroundTasks;
use crate::state::AppState;

/// Transcript entries handed to the translator as context for a final.
const HISTORY_CONTEXT_ENTRIES: usize = 5;
/// In-flight translation calls per session.
const TRANSLATION_CONCURRENCY: usize = 2;
/// How long teardown waits for the result pump to drain.
const RESULT_PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
/// Sampling rates for high-frequency log events.
const LOG_SAMPLE_PARTIAL: f64 = 0.05;
const LOG_SAMPLE_PING: f64 = 0.1;

pub async fn ws_upgrade(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

/// Everything one session's socket loop, STT pump and background tasks share.
struct SessionContext {
    state: AppState,
    session_id: String,
    session: Mutex<MeetingSession>,
    sender: SessionSender,
    tasks: BackgroundTasks,
    translation_semaphore: Semaphore,
    suggestion_semaphore: Semaphore,
    correction_queue: Option<CorrectionQueue>,
    shutdown: Notify,
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    let connection_id = Uuid::new_v4().to_string();
    let (sink, mut receiver) = socket.split();
    let sender = SessionSender::new(sink);

    if session_id.trim().is_empty() {
        sender
            .send(&error_event(
                ErrorCode::SessionNotFound,
                "sessionId is required",
            ))
            .await;
        sender.begin_close();
        sender.close().await;
        return;
    }

    info!(
        session_id = %session_id,
        %connection_id,
        provider = ?state.settings.provider_mode,
        "WebSocket connected"
    );

    let mut stt = match state.stt_factory.create() {
        Ok(client) => client,
        Err(error) => {
            warn!(session_id = %session_id, %error, "Failed to create STT client");
            sender
                .send(&error_event(
                    ErrorCode::TranscribeStreamError,
                    "Failed to start transcription",
                ))
                .await;
            sender.begin_close();
            sender.close().await;
            return;
        }
    };
    let results_rx = match stt.start_stream(&session_id).await {
        Ok(rx) => rx,
        Err(error) => {
            warn!(session_id = %session_id, %error, "Failed to start transcribe stream");
            sender
                .send(&error_event(
                    ErrorCode::TranscribeStreamError,
                    "Failed to start transcription",
                ))
                .await;
            sender.begin_close();
            sender.close().await;
            return;
        }
    };

    let correction_queue = state.settings.llm_correction_enabled.then(|| {
        CorrectionQueue::new(
            Arc::clone(&state.corrector),
            state.settings.llm_correction_batch_size,
        )
    });

    let ctx = Arc::new(SessionContext {
        session: Mutex::new(MeetingSession::new(session_id.clone())),
        session_id,
        sender,
        tasks: BackgroundTasks::new(),
        translation_semaphore: Semaphore::new(TRANSLATION_CONCURRENCY),
        suggestion_semaphore: Semaphore::new(1),
        correction_queue,
        shutdown: Notify::new(),
        state,
    });

    let pump = tokio::spawn(run_result_pump(Arc::clone(&ctx), results_rx));
    let pump_abort = pump.abort_handle();

    if ctx.correction_queue.is_some() {
        let pump_ctx = Arc::clone(&ctx);
        ctx.tasks.spawn(async move {
            run_correction_pump(pump_ctx).await;
        });
    }

    loop {
        tokio::select! {
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Binary(data))) => {
                        if let Err(error) = stt.send_audio(&data).await {
                            warn!(session_id = %ctx.session_id, %error, "Failed to forward audio upstream");
                            ctx.sender
                                .send(&error_event(
                                    ErrorCode::TranscribeStreamError,
                                    "Upstream streaming error",
                                ))
                                .await;
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        let stop = handle_control_message(&ctx, stt.as_mut(), text.as_str()).await;
                        if stop {
                            ctx.sender.send(&ServerEvent::SessionStop { ts: epoch_ms() }).await;
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        ctx.sender.pong(data).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        debug!(session_id = %ctx.session_id, %error, "WebSocket receive error");
                        break;
                    }
                }
            }
            _ = ctx.shutdown.notified() => break,
        }
    }

    // Teardown: mark closing first so every in-flight producer goes quiet,
    // then stop the upstream, cancel and join the task set, and give the
    // pump a bounded window to drain.
    ctx.sender.begin_close();
    info!(session_id = %ctx.session_id, %connection_id, "WebSocket disconnected");

    if let Err(error) = stt.stop_stream().await {
        debug!(session_id = %ctx.session_id, %error, "Failed to stop STT stream");
    }

    let outstanding = ctx.tasks.len();
    if outstanding > 0 {
        debug!(session_id = %ctx.session_id, count = outstanding, "Cancelling background tasks");
    }
    ctx.tasks.abort_all().await;

    if tokio::time::timeout(RESULT_PUMP_DRAIN_TIMEOUT, pump)
        .await
        .is_err()
    {
        pump_abort.abort();
    }

    ctx.sender.close().await;
}

/// Handles one inbound text frame. Returns true for `session.stop`.
async fn handle_control_message(
    ctx: &Arc<SessionContext>,
    stt: &mut dyn SttClient,
    raw: &str,
) -> bool {
    let Ok(payload) = serde_json::from_str::<Value>(raw) else {
        send_invalid_message(ctx, "Invalid JSON control message").await;
        return false;
    };

    match payload.get("type").and_then(Value::as_str) {
        Some("client.ping") => {
            if log_sampled(LOG_SAMPLE_PING) {
                debug!(session_id = %ctx.session_id, "Ping received");
            }
            ctx.sender.send(&ServerEvent::Pong { ts: epoch_ms() }).await;
            false
        }
        Some("suggestions.prompt") => {
            match payload.get("prompt") {
                Some(Value::String(prompt)) => {
                    info!(
                        session_id = %ctx.session_id,
                        text_len = prompt.trim().len(),
                        "Suggestions prompt updated"
                    );
                    ctx.session.lock().set_suggestions_prompt(prompt);
                }
                None => {
                    ctx.session.lock().set_suggestions_prompt("");
                }
                Some(_) => {
                    send_invalid_message(ctx, "Invalid suggestions prompt").await;
                }
            }
            false
        }
        Some("session.start") => {
            if let Some(sample_rate) = payload.get("sampleRate").and_then(Value::as_u64) {
                stt.set_input_sample_rate(sample_rate as u32);
                info!(session_id = %ctx.session_id, sample_rate, "Session started");
            }
            false
        }
        Some("session.stop") => {
            info!(session_id = %ctx.session_id, "Session stop requested");
            true
        }
        _ => {
            send_invalid_message(ctx, "Unknown control message type").await;
            false
        }
    }
}

async fn send_invalid_message(ctx: &Arc<SessionContext>, message: &str) {
    ctx.sender
        .send(&error_event(ErrorCode::InvalidMessage, message))
        .await;
}

fn error_event(code: ErrorCode, message: &str) -> ServerEvent {
    ServerEvent::Error {
        ts: epoch_ms(),
        code,
        message: message.to_string(),
        retryable: None,
    }
}

/// Consumes the STT result stream. The stream only terminates when
/// `stop_stream` completed or the upstream failed, so an end while the
/// session is still live is surfaced as a stream error.
async fn run_result_pump(
    ctx: Arc<SessionContext>,
    mut results: mpsc::Receiver<TranscriptResult>,
) {
    while let Some(result) = results.recv().await {
        if ctx.sender.is_closing() {
            return;
        }
        if result.is_partial {
            handle_partial_result(&ctx, result).await;
        } else {
            handle_final_result(&ctx, result).await;
        }
    }

    if !ctx.sender.is_closing() {
        warn!(session_id = %ctx.session_id, "STT result stream ended unexpectedly");
        ctx.sender
            .send(&error_event(
                ErrorCode::TranscribeStreamError,
                "Upstream streaming error",
            ))
            .await;
        ctx.shutdown.notify_one();
    }
}

async fn handle_partial_result(ctx: &Arc<SessionContext>, result: TranscriptResult) {
    let ts = epoch_ms();
    let speaker = "spk_1".to_string();

    let (emit, display) = {
        let mut session = ctx.session.lock();
        let Some(emit) = session.extract_partial_emit(&speaker, ts, &result.text) else {
            return;
        };
        let segment = build_partial_segment(&session, &emit.caption_text, emit.segment_id, ts, &speaker);
        let display = session.update_display_buffer(segment);
        (emit, display)
    };

    ctx.sender
        .send(&ServerEvent::DisplayUpdate {
            ts: epoch_ms(),
            session_id: ctx.session_id.clone(),
            confirmed: display.confirmed,
            current: display.current,
        })
        .await;

    if log_sampled(LOG_SAMPLE_PARTIAL) {
        info!(
            session_id = %ctx.session_id,
            segment_id = emit.segment_id,
            text_len = emit.caption_text.len(),
            "Partial caption emitted"
        );
    }
    ctx.sender
        .send(&ServerEvent::TranscriptPartial {
            ts,
            session_id: ctx.session_id.clone(),
            speaker: speaker.clone(),
            text: emit.caption_text.clone(),
            segment_id: emit.segment_id,
        })
        .await;

    if let Some(source_text) = emit.translation_text {
        spawn_partial_translation(ctx, source_text, ts, speaker, emit.segment_id);
    }
}

/// Builds the in-flight display segment for a partial caption, keeping the
/// existing display id and start time while the utterance stays the same.
fn build_partial_segment(
    session: &MeetingSession,
    caption_text: &str,
    segment_id: u64,
    ts: i64,
    speaker: &str,
) -> SubtitleSegment {
    let current = session.display_buffer().current.as_ref();
    if let Some(current) = current.filter(|seg| !seg.is_final && seg.segment_id == segment_id) {
        return SubtitleSegment {
            id: current.id.clone(),
            text: caption_text.to_string(),
            speaker: speaker.to_string(),
            start_time: current.start_time,
            end_time: None,
            is_final: false,
            segment_id: current.segment_id,
            translation: None,
        };
    }
    SubtitleSegment {
        id: format!("seg_{segment_id}"),
        text: caption_text.to_string(),
        speaker: speaker.to_string(),
        start_time: ts,
        end_time: None,
        is_final: false,
        segment_id,
        translation: None,
    }
}

async fn handle_final_result(ctx: &Arc<SessionContext>, result: TranscriptResult) {
    let ts = epoch_ms();
    let speaker = "spk_1".to_string();

    let (text, segment_id, segment, display, recent_context, should_suggest, recent, prompt) = {
        let mut session = ctx.session.lock();
        let (text, segment_id) = session.add_final_transcript(&speaker, &result.text, ts);
        let start_time = session
            .display_buffer()
            .current
            .as_ref()
            .filter(|current| current.segment_id == segment_id)
            .map(|current| current.start_time)
            .unwrap_or(ts);
        let segment = SubtitleSegment {
            id: format!("seg_{segment_id}"),
            text: text.clone(),
            speaker: speaker.clone(),
            start_time,
            end_time: Some(ts),
            is_final: true,
            segment_id,
            translation: None,
        };
        let display = session.update_display_buffer(segment.clone());
        let recent_context: Vec<String> = session
            .recent_context(HISTORY_CONTEXT_ENTRIES, Some(ts))
            .iter()
            .map(|entry| format!("{}: {}", entry.speaker, entry.text))
            .collect();
        let should_suggest = session.should_update_suggestions();
        let recent = session.recent_transcripts(5);
        let prompt = session.suggestions_prompt().to_string();
        (text, segment_id, segment, display, recent_context, should_suggest, recent, prompt)
    };

    info!(
        session_id = %ctx.session_id,
        segment_id,
        text_len = text.len(),
        "Final transcript"
    );

    ctx.sender
        .send(&ServerEvent::DisplayUpdate {
            ts: epoch_ms(),
            session_id: ctx.session_id.clone(),
            confirmed: display.confirmed,
            current: display.current,
        })
        .await;
    ctx.sender
        .send(&ServerEvent::TranscriptFinal {
            ts,
            session_id: ctx.session_id.clone(),
            speaker: speaker.clone(),
            text: text.clone(),
            segment_id,
        })
        .await;

    // Enqueued after the final frame so a correction can never precede it.
    if let Some(queue) = &ctx.correction_queue {
        queue.enqueue(segment);
    }

    spawn_final_translation(ctx, text, ts, speaker, recent_context, segment_id);

    if should_suggest {
        spawn_suggestions(ctx, recent, prompt);
    }
}

fn spawn_partial_translation(
    ctx: &Arc<SessionContext>,
    source_text: String,
    ts: i64,
    speaker: String,
    segment_id: u64,
) {
    let tasks = ctx.tasks.clone();
    let ctx = Arc::clone(ctx);
    tasks.spawn(async move {
        if ctx.sender.is_closing() {
            return;
        }
        let Ok(_permit) = ctx.translation_semaphore.acquire().await else {
            return;
        };
        let started = Instant::now();
        let translated = match ctx.state.translator.translate_fast(&source_text).await {
            Ok(translated) => translated,
            Err(error) => {
                warn!(session_id = %ctx.session_id, %error, "Translation failed");
                ctx.sender
                    .send(&error_event(ErrorCode::BedrockError, "Translation failed"))
                    .await;
                return;
            }
        };
        // A newer caption may have superseded this trigger while the call
        // was in flight; stale results are dropped, not displayed.
        if !ctx
            .session
            .lock()
            .is_partial_translation_current(&speaker, ts, &source_text, segment_id)
        {
            return;
        }
        debug!(
            session_id = %ctx.session_id,
            segment_id,
            latency_ms = started.elapsed().as_millis() as u64,
            "Partial translation ready"
        );
        ctx.sender
            .send(&ServerEvent::TranslationFinal {
                ts: epoch_ms(),
                session_id: ctx.session_id.clone(),
                source_ts: ts,
                segment_id: Some(segment_id),
                speaker,
                source_text,
                translated_text: translated,
            })
            .await;
    });
}

fn spawn_final_translation(
    ctx: &Arc<SessionContext>,
    text: String,
    ts: i64,
    speaker: String,
    recent_context: Vec<String>,
    segment_id: u64,
) {
    let tasks = ctx.tasks.clone();
    let ctx = Arc::clone(ctx);
    tasks.spawn(async move {
        if ctx.sender.is_closing() {
            return;
        }
        let Ok(_permit) = ctx.translation_semaphore.acquire().await else {
            return;
        };
        let started = Instant::now();
        let context = (!recent_context.is_empty()).then_some(recent_context.as_slice());
        let translated = match ctx
            .state
            .translator
            .translate_with_context(&text, context)
            .await
        {
            Ok(translated) => translated,
            Err(error) => {
                warn!(session_id = %ctx.session_id, %error, "Translation failed");
                ctx.sender
                    .send(&error_event(ErrorCode::BedrockError, "Translation failed"))
                    .await;
                return;
            }
        };
        ctx.session
            .lock()
            .add_translation(&speaker, ts, &text, &translated);
        info!(
            session_id = %ctx.session_id,
            segment_id,
            text_len = text.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Final translation ready"
        );
        ctx.sender
            .send(&ServerEvent::TranslationFinal {
                ts: epoch_ms(),
                session_id: ctx.session_id.clone(),
                source_ts: ts,
                segment_id: Some(segment_id),
                speaker,
                source_text: text,
                translated_text: translated,
            })
            .await;
    });
}

fn spawn_suggestions(ctx: &Arc<SessionContext>, recent: Vec<TranscriptEntry>, prompt: String) {
    let tasks = ctx.tasks.clone();
    let ctx = Arc::clone(ctx);
    tasks.spawn(async move {
        if ctx.sender.is_closing() {
            return;
        }
        // A trigger that fires while a generation is in flight is dropped.
        let Ok(_permit) = ctx.suggestion_semaphore.try_acquire() else {
            return;
        };
        let started = Instant::now();
        let system_prompt = (!prompt.is_empty()).then_some(prompt.as_str());
        let items = match ctx.state.suggester.generate(&recent, system_prompt).await {
            Ok(items) => items,
            Err(error) => {
                warn!(session_id = %ctx.session_id, %error, "Suggestion generation failed");
                ctx.sender
                    .send(&error_event(ErrorCode::SuggestionError, "Suggestions failed"))
                    .await;
                return;
            }
        };
        if items.is_empty() {
            return;
        }
        info!(
            session_id = %ctx.session_id,
            item_count = items.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Suggestions ready"
        );
        ctx.sender
            .send(&ServerEvent::SuggestionsUpdate {
                ts: epoch_ms(),
                session_id: ctx.session_id.clone(),
                items,
            })
            .await;
        ctx.session.lock().mark_suggestions_updated();
    });
}

/// Drains correction batches on an interval, reconciling finals that the
/// corrector improved.
async fn run_correction_pump(ctx: Arc<SessionContext>) {
    let Some(queue) = &ctx.correction_queue else {
        return;
    };
    let interval = Duration::from_millis(ctx.state.settings.llm_correction_interval_ms);
    while !ctx.sender.is_closing() {
        for correction in queue.process_batch().await {
            info!(
                session_id = %ctx.session_id,
                segment_id = correction.segment_id,
                "Transcript corrected"
            );
            ctx.sender
                .send(&ServerEvent::TranscriptCorrected {
                    ts: epoch_ms(),
                    session_id: ctx.session_id.clone(),
                    segment_id: correction.segment_id,
                    original_text: correction.original_text.clone(),
                    corrected_text: correction.corrected_text.clone(),
                })
                .await;
            spawn_corrected_translation(&ctx, correction.corrected_text, correction.segment_id);
        }
        tokio::time::sleep(interval).await;
    }
}

fn spawn_corrected_translation(ctx: &Arc<SessionContext>, corrected_text: String, segment_id: u64) {
    let tasks = ctx.tasks.clone();
    let ctx = Arc::clone(ctx);
    tasks.spawn(async move {
        if ctx.sender.is_closing() {
            return;
        }
        let Ok(_permit) = ctx.translation_semaphore.acquire().await else {
            return;
        };
        let translated = match ctx
            .state
            .translator
            .translate_with_context(&corrected_text, None)
            .await
        {
            Ok(translated) => translated,
            Err(error) => {
                warn!(session_id = %ctx.session_id, %error, "Corrected translation failed");
                ctx.sender
                    .send(&error_event(
                        ErrorCode::BedrockError,
                        "Corrected translation failed",
                    ))
                    .await;
                return;
            }
        };
        ctx.sender
            .send(&ServerEvent::TranslationCorrected {
                ts: epoch_ms(),
                session_id: ctx.session_id.clone(),
                segment_id,
                speaker: "spk_1".to_string(),
                source_text: corrected_text,
                translated_text: translated,
            })
            .await;
    });
}

fn log_sampled(rate: f64) -> bool {
    rand::rng().random::<f64>() < rate
}
