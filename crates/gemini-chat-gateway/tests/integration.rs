//! Gateway integration tests: drive the router in-process against a scripted
//! model.
//!
//! Run with: `cargo test -p gemini-chat-gateway --test integration`

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tokio_stream::StreamExt;
use tower::ServiceExt;

use gemini_chat_core::config::{Config, ThinkingLevel};
use gemini_chat_core::types::{ConversationTurn, Part};
use gemini_chat_gateway::{GatewayState, router};
use gemini_chat_providers::ModelClient;
use gemini_chat_providers::scripted::{ScriptStep, ScriptedModelClient};

fn test_state(client: &ScriptedModelClient) -> Arc<GatewayState> {
    let config = Config::default();
    let client: Arc<dyn ModelClient> = Arc::new(client.clone());
    Arc::new(GatewayState::new(
        Arc::new(config),
        client,
        Arc::new(gemini_chat_tools::builtin_registry()),
    ))
}

fn chat_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// POST to /chat and split the streamed body into JSON events.
async fn post_chat(state: Arc<GatewayState>, body: Value) -> (StatusCode, Vec<Value>) {
    let response = router(state, false).oneshot(chat_request(body)).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let events = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    (status, events)
}

fn types(events: &[Value]) -> Vec<&str> {
    events.iter().map(|e| e["type"].as_str().unwrap()).collect()
}

fn fib_call(n: u64) -> Part {
    Part::function_call("fibonacci", json!({ "n": n }).as_object().cloned().unwrap())
}

#[tokio::test]
async fn test_health() {
    let client = ScriptedModelClient::default();
    let response = router(test_state(&client), false)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let health: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["model"], "gemini-2.5-flash");
    assert_eq!(health["tools"], json!(["fibonacci", "listFiles", "findFiles"]));
    assert_eq!(health["active_requests"], 0);
}

#[tokio::test]
async fn test_empty_message_streams_error() {
    let client = ScriptedModelClient::default();
    let response = router(test_state(&client), false)
        .oneshot(chat_request(json!({ "message": "   " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let events: Vec<Value> = String::from_utf8(bytes.to_vec())
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(types(&events), vec!["error"]);
    assert_eq!(events[0]["data"], "message must not be empty");
    assert_eq!(client.calls(), 0);
    assert!(client.opened().is_empty());
}

#[tokio::test]
async fn test_first_event_arrives_while_turn_is_open() {
    let client = ScriptedModelClient::new([ScriptStep::Stall(vec![Part::text("early")])]);
    let state = test_state(&client);

    let response = router(state.clone(), false)
        .oneshot(chat_request(json!({ "message": "hi" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut frames = response.into_body().into_data_stream();
    let first = tokio::time::timeout(Duration::from_secs(1), frames.next())
        .await
        .expect("no body frame while the model was still streaming")
        .unwrap()
        .unwrap();
    let event: Value = serde_json::from_slice(&first).unwrap();
    assert_eq!(event, json!({ "type": "text", "data": "early" }));
    assert_eq!(state.active_requests(), 1);
}

#[tokio::test]
async fn test_streams_tool_round_trip() {
    let client = ScriptedModelClient::new([
        ScriptStep::Reply(vec![Part::thought("T1"), fib_call(5)]),
        ScriptStep::Reply(vec![Part::text("The answer is 5.")]),
    ]);
    let state = test_state(&client);

    let response = router(state.clone(), false)
        .oneshot(chat_request(json!({ "message": "What is fib(5)?" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let events: Vec<Value> = String::from_utf8(bytes.to_vec())
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(types(&events), vec!["thought", "tool", "text", "history"]);
    assert_eq!(events[0]["data"], "T1");
    assert_eq!(
        events[1]["data"],
        json!({ "name": "fibonacci", "args": { "n": 5 }, "result": 5 })
    );
    assert_eq!(events[2]["data"], "The answer is 5.");
    assert_eq!(events[3]["data"].as_array().unwrap().len(), 4);
    assert_eq!(
        events[3]["data"][2]["parts"][0]["functionResponse"],
        json!({ "name": "fibonacci", "response": { "result": 5 } })
    );
    assert_eq!(client.calls(), 2);
    assert_eq!(state.active_requests(), 0);
}

#[tokio::test]
async fn test_unknown_tool_has_no_history() {
    let client = ScriptedModelClient::new([ScriptStep::Reply(vec![Part::function_call(
        "rm",
        serde_json::Map::new(),
    )])]);

    let (status, events) = post_chat(test_state(&client), json!({ "message": "clean up" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(types(&events), vec!["error"]);
    assert_eq!(events[0]["data"], "Unknown tool: rm");
}

#[tokio::test]
async fn test_api_error_is_streamed() {
    let client = ScriptedModelClient::new([ScriptStep::Reject {
        status: 400,
        message: "API key not valid".into(),
    }]);

    let (status, events) = post_chat(test_state(&client), json!({ "message": "hi" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(types(&events), vec!["error"]);
    assert!(events[0]["data"].as_str().unwrap().contains("API key not valid"));
}

#[tokio::test]
async fn test_model_selection_and_history_replay() {
    let client = ScriptedModelClient::new([ScriptStep::Reply(vec![Part::text("Again: hello.")])]);
    let history = json!([
        { "role": "user", "parts": [{ "text": "hi" }] },
        { "role": "model", "parts": [{ "text": "Deep thought", "thought": true, "thoughtSignature": "c2ln" }, { "text": "hello" }] }
    ]);

    let (_, events) = post_chat(
        test_state(&client),
        json!({ "message": "say it again", "history": history, "model": "gemini-3-pro-preview" }),
    )
    .await;
    assert_eq!(types(&events), vec!["text", "history"]);

    let opened = client.opened();
    let (replayed, config) = &opened[0];
    let expected: Vec<ConversationTurn> = serde_json::from_value(history.clone()).unwrap();
    assert_eq!(replayed, &expected);
    assert_eq!(config.model, "gemini-3-pro-preview");
    assert_eq!(config.thinking.thinking_level, Some(ThinkingLevel::Low));
    assert_eq!(config.thinking.thinking_budget, None);
    assert_eq!(config.tools.len(), 3);

    // The signature survives the round trip untouched.
    let returned = &events[1]["data"];
    assert_eq!(returned.as_array().unwrap()[..2], history.as_array().unwrap()[..]);
    assert_eq!(returned[1]["parts"][0]["thoughtSignature"], "c2ln");
    assert_eq!(returned.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_default_model_is_flash() {
    let client = ScriptedModelClient::new([ScriptStep::Reply(vec![Part::text("ok")])]);
    post_chat(test_state(&client), json!({ "message": "hi" })).await;

    let config = &client.opened()[0].1;
    assert_eq!(config.model, "gemini-2.5-flash");
    assert_eq!(config.thinking.thinking_budget, Some(1024));
    assert_eq!(config.thinking.thinking_level, None);
    assert!(config.thinking.include_thoughts);
}
