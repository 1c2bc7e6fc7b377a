//! Integration tests for the chat HTTP API
//!
//! Drive the axum router with scripted model providers, both in-process and
//! served on a socket for the chat client.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tabiwa_assistant::catalog::Catalog;
use tabiwa_assistant::config::Config;
use tabiwa_assistant::llm::{LlmProvider, ScriptedProvider, ScriptedStep, ScriptedTurn};
use tabiwa_assistant::protocol::{
    ChatRequest, ChatRequestMessage, ChatRole, ChatStreamEvent, RATE_LIMIT_MESSAGE,
};
use tabiwa_assistant::tools::ToolRegistry;
use tabiwa_assistant::transport::{router, AppState, ChatClient, TransportError};
use tabiwa_assistant::ui::{ChatBackend, ChatSession, ExchangeState, Settlement};
use tower::ServiceExt;

fn tools(config: &Config) -> Arc<ToolRegistry> {
    Arc::new(ToolRegistry::with_defaults(config, Arc::new(Catalog::builtin())).unwrap())
}

fn scripted_state(turns: Vec<ScriptedTurn>) -> Arc<AppState> {
    let config = Config::default();
    let tools = tools(&config);
    let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider::new(turns));
    Arc::new(
        AppState::new(config, tools).with_provider_factory(Arc::new(move |_: &Config| {
            Ok(provider.clone())
        })),
    )
}

fn chat_request(body: Value) -> Request<Body> {
    Request::post("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Serve the router on an ephemeral port and return its base URL
async fn spawn_router(state: Arc<AppState>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

fn user_request(text: &str) -> ChatRequest {
    ChatRequest {
        messages: vec![ChatRequestMessage::text(ChatRole::User, text)],
        conversation_id: None,
    }
}

fn catalog_turns() -> Vec<ScriptedTurn> {
    vec![
        ScriptedTurn::Reply(vec![ScriptedStep::ToolCall {
            name: "searchTabiwa".into(),
            arguments: json!({"query": "広島"}),
        }]),
        ScriptedTurn::text("広島ワイドパスがおすすめです。"),
    ]
}

/// Decode every `data:` line of an SSE body
fn sse_events(body: &str) -> Vec<ChatStreamEvent> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

#[tokio::test]
async fn missing_credential_is_500_without_stream() {
    let mut config = Config::default();
    config.llm.api_key_env = "TABIWA_TEST_KEY_THAT_IS_NEVER_SET".to_string();
    let tools = tools(&config);
    let app = router(Arc::new(AppState::new(config, tools)));

    let response = app
        .oneshot(chat_request(json!({
            "messages": [{"role": "user", "content": "広島"}],
            "conversationId": "c1"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        body,
        json!({"error": "TABIWA_TEST_KEY_THAT_IS_NEVER_SET not configured"})
    );
}

#[tokio::test]
async fn catalog_tool_call_streams_in_order() {
    let state = scripted_state(vec![
        ScriptedTurn::Reply(vec![
            ScriptedStep::Thinking("広島で検索".into()),
            ScriptedStep::ToolCall {
                name: "searchTabiwa".into(),
                arguments: json!({"query": "広島"}),
            },
        ]),
        ScriptedTurn::text("広島ワイドパスがおすすめです。"),
    ]);

    let response = router(state)
        .oneshot(chat_request(json!({
            "messages": [{"role": "user", "parts": [{"type": "text", "text": "広島"}]}]
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .starts_with("text/event-stream"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let events = sse_events(&String::from_utf8(bytes.to_vec()).unwrap());

    let call = events
        .iter()
        .position(|e| matches!(e, ChatStreamEvent::ToolCall { .. }))
        .unwrap();
    let result = events
        .iter()
        .position(|e| matches!(e, ChatStreamEvent::ToolResult { .. }))
        .unwrap();
    let text = events
        .iter()
        .position(|e| matches!(e, ChatStreamEvent::TextDelta { .. }))
        .unwrap();
    assert!(matches!(events.first(), Some(ChatStreamEvent::Start { .. })));
    assert!(call < result && result < text);
    assert!(matches!(events.last(), Some(ChatStreamEvent::Done { .. })));

    match &events[call] {
        ChatStreamEvent::ToolCall {
            tool_name, input, ..
        } => {
            assert_eq!(tool_name, "searchTabiwa");
            assert_eq!(input["query"], "広島");
        }
        other => panic!("unexpected event {:?}", other),
    }
    match &events[result] {
        ChatStreamEvent::ToolResult { output, .. } => {
            let pass = &output["results"][0];
            assert_eq!(pass["id"], "hiroshima-wide-pass");
            assert_eq!(pass["price"], 3000);
            assert_eq!(pass["validDays"], 2);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn rate_limit_substrings_map_to_429() {
    for message in ["HTTP 429", "quota exceeded", "RESOURCE_EXHAUSTED", "Too Many Requests"] {
        let state = scripted_state(vec![ScriptedTurn::Fail {
            status: 500,
            message: message.to_string(),
        }]);
        let response = router(state)
            .oneshot(chat_request(json!({
                "messages": [{"role": "user", "content": "広島"}]
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS, "{}", message);
    }
}

#[tokio::test]
async fn failure_after_start_becomes_error_event() {
    let state = scripted_state(vec![ScriptedTurn::Interrupted {
        steps: vec![ScriptedStep::Text("途中まで".into())],
        message: "connection reset".into(),
    }]);
    let response = router(state)
        .oneshot(chat_request(json!({
            "messages": [{"role": "user", "content": "広島"}]
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let events = sse_events(&String::from_utf8(bytes.to_vec()).unwrap());
    assert!(matches!(
        events.last(),
        Some(ChatStreamEvent::Error { .. })
    ));
    assert!(!events
        .iter()
        .any(|e| matches!(e, ChatStreamEvent::Done { .. })));
}

#[tokio::test]
async fn client_receives_served_stream_in_order() {
    let base = spawn_router(scripted_state(catalog_turns())).await;
    let client = ChatClient::new(&base);

    let mut events = Vec::new();
    client
        .send(&user_request("広島"), |event| events.push(event))
        .await
        .unwrap();

    assert!(matches!(events.first(), Some(ChatStreamEvent::Start { .. })));
    assert!(matches!(events.last(), Some(ChatStreamEvent::Done { .. })));
    let call = events
        .iter()
        .position(|e| matches!(e, ChatStreamEvent::ToolCall { .. }))
        .unwrap();
    let result = events
        .iter()
        .position(|e| matches!(e, ChatStreamEvent::ToolResult { .. }))
        .unwrap();
    let text = events
        .iter()
        .position(|e| matches!(e, ChatStreamEvent::TextDelta { .. }))
        .unwrap();
    assert!(call < result && result < text);
}

#[tokio::test]
async fn remote_session_settles_successfully() {
    let base = spawn_router(scripted_state(catalog_turns())).await;
    let backend = ChatBackend::Remote(ChatClient::new(&base));

    let mut session = ChatSession::new();
    session.set_input("広島");
    let request = session.submit().unwrap();
    let mut seen = 0;
    backend.exchange(&mut session, request, |_| seen += 1).await;

    assert!(seen > 0);
    assert_eq!(session.state(), &ExchangeState::Settled(Settlement::Success));
    let reply = session.messages().last().unwrap();
    assert_eq!(reply.role, ChatRole::Assistant);
    assert_eq!(reply.displayed_text(), "広島ワイドパスがおすすめです。");
}

#[tokio::test]
async fn client_surfaces_missing_credential_status() {
    let mut config = Config::default();
    config.llm.api_key_env = "TABIWA_TEST_KEY_THAT_IS_NEVER_SET".to_string();
    let tools = tools(&config);
    let base = spawn_router(Arc::new(AppState::new(config, tools))).await;

    let mut events = Vec::new();
    let err = ChatClient::new(&base)
        .send(&user_request("広島"), |event| events.push(event))
        .await
        .unwrap_err();

    assert!(events.is_empty());
    match err {
        TransportError::Http { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "TABIWA_TEST_KEY_THAT_IS_NEVER_SET not configured");
        }
        other => panic!("expected HTTP error, got {:?}", other),
    }
}

#[tokio::test]
async fn client_surfaces_rate_limit_status() {
    let base = spawn_router(scripted_state(vec![ScriptedTurn::Fail {
        status: 500,
        message: "RESOURCE_EXHAUSTED".into(),
    }]))
    .await;

    let err = ChatClient::new(&base)
        .send(&user_request("広島"), |_| {})
        .await
        .unwrap_err();

    match err {
        TransportError::Http { status, message } => {
            assert_eq!(status, 429);
            assert_eq!(message, RATE_LIMIT_MESSAGE);
        }
        other => panic!("expected HTTP error, got {:?}", other),
    }
}
