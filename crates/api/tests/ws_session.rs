mod common;

use common::*;
use futures::SinkExt;
use meetbridge_core::SuggestionItem;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn partial_then_final_share_a_segment_id() {
    let state = app_state(
        test_settings(),
        vec![
            partial("Hello world this is a test"),
            final_result("Hello world this is a test."),
        ],
        Vec::new(),
        "",
    );
    let addr = spawn_app(state).await;
    let mut ws = connect_ws(&addr, "test-session").await;

    let events = collect_until(
        &mut ws,
        |events| events.iter().any(|event| event["type"] == "transcript.final"),
        30,
    )
    .await;

    let partial_event = first_of(&events, "transcript.partial").expect("partial emitted");
    let final_event = first_of(&events, "transcript.final").expect("final emitted");
    assert_eq!(partial_event["segmentId"], 1);
    assert_eq!(final_event["segmentId"], 1);
    assert_eq!(partial_event["text"], "Hello world this is a test");
    assert_eq!(final_event["text"], "Hello world this is a test.");
    assert_eq!(final_event["sessionId"], "test-session");

    // The display view was refreshed along the way.
    assert!(first_of(&events, "display.update").is_some());
}

#[tokio::test]
async fn translation_follows_the_final_with_the_same_segment_id() {
    let state = app_state(
        test_settings(),
        vec![final_result("Hello.")],
        Vec::new(),
        "",
    );
    let addr = spawn_app(state).await;
    let mut ws = connect_ws(&addr, "test-session").await;

    let events = collect_until(
        &mut ws,
        |events| events.iter().any(|event| event["type"] == "translation.final"),
        30,
    )
    .await;

    let final_index = index_of(&events, "transcript.final").expect("final emitted");
    let translation_index = index_of(&events, "translation.final").expect("translation emitted");
    assert!(final_index < translation_index);

    let final_event = &events[final_index];
    let translation = &events[translation_index];
    assert_eq!(translation["segmentId"], final_event["segmentId"]);
    assert_eq!(translation["translatedText"], "translated_history");
    assert_eq!(translation["sourceText"], "Hello.");
}

#[tokio::test]
async fn invalid_json_control_message_yields_an_error() {
    let state = app_state(test_settings(), Vec::new(), Vec::new(), "");
    let addr = spawn_app(state).await;
    let mut ws = connect_ws(&addr, "test-session").await;

    ws.send(Message::text("not-json")).await.unwrap();
    let event = next_json(&mut ws).await.expect("error event");
    assert_eq!(event["type"], "error");
    assert_eq!(event["code"], "INVALID_MESSAGE");
}

#[tokio::test]
async fn unknown_control_type_yields_an_error() {
    let state = app_state(test_settings(), Vec::new(), Vec::new(), "");
    let addr = spawn_app(state).await;
    let mut ws = connect_ws(&addr, "test-session").await;

    ws.send(Message::text(r#"{"type": "bogus"}"#)).await.unwrap();
    let event = next_json(&mut ws).await.expect("error event");
    assert_eq!(event["type"], "error");
    assert_eq!(event["code"], "INVALID_MESSAGE");
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let state = app_state(test_settings(), Vec::new(), Vec::new(), "");
    let addr = spawn_app(state).await;
    let mut ws = connect_ws(&addr, "test-session").await;

    ws.send(Message::text(r#"{"type": "client.ping", "ts": 1}"#))
        .await
        .unwrap();
    let event = next_json(&mut ws).await.expect("pong event");
    assert_eq!(event["type"], "server.pong");
    assert!(event["ts"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn session_stop_is_echoed_and_the_socket_closes() {
    let state = app_state(test_settings(), Vec::new(), Vec::new(), "");
    let addr = spawn_app(state).await;
    let mut ws = connect_ws(&addr, "test-session").await;

    ws.send(Message::text(r#"{"type": "session.stop"}"#))
        .await
        .unwrap();
    let event = next_json(&mut ws).await.expect("session.stop event");
    assert_eq!(event["type"], "session.stop");

    // No further events: the server closes the connection.
    assert!(next_json(&mut ws).await.is_none());
}

#[tokio::test]
async fn corrections_are_reconciled_after_the_final() {
    let mut settings = test_settings();
    settings.llm_correction_enabled = true;
    let state = app_state(
        settings,
        vec![final_result("Welcome to AWS reinvent.")],
        Vec::new(),
        r#"{"corrections": ["Welcome to AWS re:Invent."]}"#,
    );
    let addr = spawn_app(state).await;
    let mut ws = connect_ws(&addr, "test-session").await;

    let events = collect_until(
        &mut ws,
        |events| {
            events
                .iter()
                .any(|event| event["type"] == "translation.corrected")
        },
        40,
    )
    .await;

    let final_index = index_of(&events, "transcript.final").expect("final emitted");
    let corrected_index = index_of(&events, "transcript.corrected").expect("correction emitted");
    let corrected_translation_index =
        index_of(&events, "translation.corrected").expect("corrected translation emitted");
    assert!(final_index < corrected_index);
    assert!(corrected_index < corrected_translation_index);

    let corrected = &events[corrected_index];
    assert_eq!(corrected["originalText"], "Welcome to AWS reinvent.");
    assert_eq!(corrected["correctedText"], "Welcome to AWS re:Invent.");
    assert_eq!(corrected["segmentId"], events[final_index]["segmentId"]);

    let corrected_translation = &events[corrected_translation_index];
    assert_eq!(corrected_translation["segmentId"], corrected["segmentId"]);
    assert_eq!(
        corrected_translation["sourceText"],
        "Welcome to AWS re:Invent."
    );
}

#[tokio::test]
async fn suggestions_follow_the_first_final_and_then_every_two() {
    let state = app_state(
        test_settings(),
        vec![
            final_result("First thing."),
            final_result("Second thing."),
            final_result("Third thing."),
        ],
        vec![SuggestionItem {
            source: "Could you repeat that?".to_string(),
            target: "다시 말씀해 주시겠어요?".to_string(),
        }],
        "",
    );
    let addr = spawn_app(state).await;
    let mut ws = connect_ws(&addr, "test-session").await;

    let events = collect_until(
        &mut ws,
        |events| {
            events
                .iter()
                .filter(|event| event["type"] == "suggestions.update")
                .count()
                >= 2
        },
        60,
    )
    .await;

    let updates: Vec<_> = events
        .iter()
        .filter(|event| event["type"] == "suggestions.update")
        .collect();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0]["items"][0]["source"], "Could you repeat that?");

    // The first suggestion set arrives after the first final, the second
    // only once two further finals have landed.
    let first_final = index_of(&events, "transcript.final").unwrap();
    let first_update = index_of(&events, "suggestions.update").unwrap();
    assert!(first_final < first_update);
}

#[tokio::test]
async fn suggestions_prompt_control_message_is_accepted() {
    let state = app_state(test_settings(), Vec::new(), Vec::new(), "");
    let addr = spawn_app(state).await;
    let mut ws = connect_ws(&addr, "test-session").await;

    ws.send(Message::text(
        r#"{"type": "suggestions.prompt", "prompt": "Focus on scheduling"}"#,
    ))
    .await
    .unwrap();

    // A non-string prompt is rejected.
    ws.send(Message::text(r#"{"type": "suggestions.prompt", "prompt": 42}"#))
        .await
        .unwrap();
    let event = next_json(&mut ws).await.expect("error event");
    assert_eq!(event["type"], "error");
    assert_eq!(event["code"], "INVALID_MESSAGE");
}
