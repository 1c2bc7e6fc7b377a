//! HTTP server for the chat API
//!
//! - `POST /api/chat`: SSE stream of [`ChatStreamEvent`]s
//! - `GET /health`: liveness and build info
//! - `POST /api/tools/:name`: run one tool directly, for debugging

use crate::agent::{AgentError, ChatAgent};
use crate::config::Config;
use crate::llm::{self, LlmError, LlmProvider};
use crate::protocol::{ChatFailure, ChatRequest, ChatStreamEvent};
use crate::tools::ToolRegistry;
use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builds a model provider per request, so a credential set after startup
/// is picked up without a restart
pub type ProviderFactory =
    Arc<dyn Fn(&Config) -> Result<Arc<dyn LlmProvider>, LlmError> + Send + Sync>;

/// Shared application state
pub struct AppState {
    config: Config,
    tools: Arc<ToolRegistry>,
    provider_factory: ProviderFactory,
}

impl AppState {
    pub fn new(config: Config, tools: Arc<ToolRegistry>) -> Self {
        Self {
            config,
            tools,
            provider_factory: Arc::new(|config: &Config| {
                llm::create_provider(config).map(Arc::from)
            }),
        }
    }

    pub fn with_provider_factory(mut self, factory: ProviderFactory) -> Self {
        self.provider_factory = factory;
        self
    }
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    model: String,
    tools: Vec<String>,
}

/// Build the router; split from [`run_http_server`] so tests can drive it
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/chat", post(handle_chat))
        .route("/api/tools/:name", post(handle_tool))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until Ctrl-C
pub async fn run_http_server(state: AppState) -> Result<()> {
    let addr: SocketAddr =
        format!("{}:{}", state.config.server.host, state.config.server.port).parse()?;
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

fn failure_response(failure: ChatFailure) -> Response {
    let status =
        StatusCode::from_u16(failure.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_response(status, failure.message())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::version(),
        model: state.config.llm.model.clone(),
        tools: state.tools.names(),
    })
}

async fn handle_chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Response {
    let provider = match (state.provider_factory)(&state.config) {
        Ok(provider) => provider,
        Err(e) => {
            tracing::error!("Cannot create model provider: {}", e);
            return failure_response(ChatFailure::classify(&e));
        }
    };

    let history = req.to_llm_messages();
    if history.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "messages must contain at least one non-empty message",
        );
    }
    tracing::info!(
        conversation = req.conversation_id.as_deref().unwrap_or("-"),
        messages = history.len(),
        provider = provider.name(),
        "Chat request"
    );

    let agent = ChatAgent::new(provider, state.tools.clone())
        .with_max_iterations(state.config.agent.max_iterations)
        .with_max_history(state.config.agent.max_history_messages);
    let (tx, mut rx) = mpsc::channel(state.config.agent.event_buffer.max(1));
    let task = tokio::spawn(async move { agent.run(history, tx).await });

    // The first event decides between an SSE stream and a plain error status
    let Some(first) = rx.recv().await else {
        let failure = match task.await {
            Ok(Err(AgentError::Llm(e))) => {
                tracing::error!("Chat failed before streaming: {}", e);
                ChatFailure::classify(&e)
            }
            Ok(Err(AgentError::Disconnected)) | Ok(Ok(_)) => ChatFailure::Upstream,
            Err(e) => {
                tracing::error!("Chat task aborted: {}", e);
                ChatFailure::Upstream
            }
        };
        return failure_response(failure);
    };

    let events = futures::stream::once(async move { first })
        .chain(ReceiverStream::new(rx))
        .map(|event: ChatStreamEvent| Event::default().json_data(&event));

    Sse::new(events)
        .keep_alive(KeepAlive::new())
        .into_response()
}

async fn handle_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Response {
    if state.tools.get(&name).is_none() {
        return error_response(StatusCode::NOT_FOUND, format!("Unknown tool: {}", name));
    }

    match state.tools.execute(&name, params).await {
        Ok(result) => Json(serde_json::json!({
            "success": result.success,
            "output": result.output_value(),
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(tool = %name, "Tool execution failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::llm::{ScriptedProvider, ScriptedTurn};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn state_with(turns: Vec<ScriptedTurn>) -> Arc<AppState> {
        let config = Config::default();
        let tools =
            ToolRegistry::with_defaults(&config, Arc::new(Catalog::builtin())).unwrap();
        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider::new(turns));
        Arc::new(
            AppState::new(config, Arc::new(tools))
                .with_provider_factory(Arc::new(move |_: &Config| Ok(provider.clone()))),
        )
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn chat_request(text: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"messages": [{"role": "user", "content": text}]}).to_string(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn health_lists_tools() {
        let response = router(state_with(vec![]))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model"], "gemini-2.5-flash");
        assert_eq!(body["tools"], serde_json::json!(["searchTabiwa", "searchWeb"]));
    }

    #[tokio::test]
    async fn rate_limit_before_stream_is_429() {
        let state = state_with(vec![ScriptedTurn::Fail {
            status: 500,
            message: "RESOURCE_EXHAUSTED: quota exceeded".into(),
        }]);
        let response = router(state).oneshot(chat_request("広島")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            json_body(response).await["error"],
            crate::protocol::RATE_LIMIT_MESSAGE
        );
    }

    #[tokio::test]
    async fn generic_failure_before_stream_is_500() {
        let state = state_with(vec![ScriptedTurn::Fail {
            status: 400,
            message: "invalid argument".into(),
        }]);
        let response = router(state).oneshot(chat_request("広島")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await["error"],
            crate::protocol::GENERIC_FAILURE_MESSAGE
        );
    }

    #[tokio::test]
    async fn empty_history_is_400() {
        let response = router(state_with(vec![]))
            .oneshot(chat_request("   "))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn tool_endpoint_runs_catalog_search() {
        let request = Request::post("/api/tools/searchTabiwa")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"query":"岡山"}"#))
            .unwrap();
        let response = router(state_with(vec![])).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["output"]["results"][0]["id"], "okayama-kurashiki-pass");
    }

    #[tokio::test]
    async fn unknown_tool_is_404() {
        let request = Request::post("/api/tools/bookHotel")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = router(state_with(vec![])).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
