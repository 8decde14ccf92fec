//! # Nebula Server
//!
//! The HTTP surface of the Nebula chat service: user registration,
//! chat turns, and health. Handlers stay thin; all conversation
//! semantics live in `nebula-engine`, and histories go through the
//! injected `ConversationStore`.

pub mod chat;
pub mod users;

use axum::extract::State;
use axum::http::{Method, header};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use nebula_core::event::{DomainEvent, EventBus};
use nebula_core::store::ConversationStore;
use nebula_engine::TurnEngine;
use nebula_store::{InMemoryConversationStore, SessionLocks};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use users::UserDirectory;

/// Shared application state.
pub struct AppState {
    pub engine: TurnEngine,
    pub store: Arc<dyn ConversationStore>,
    pub locks: SessionLocks,
    pub users: UserDirectory,
    pub counters: HealthCounters,
    pub started_at: DateTime<Utc>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(engine: TurnEngine, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            engine,
            store,
            locks: SessionLocks::new(),
            users: UserDirectory::new(),
            counters: HealthCounters::default(),
            started_at: Utc::now(),
        }
    }
}

/// Counters kept current by the domain event listener.
#[derive(Default)]
pub struct HealthCounters {
    pub turns_completed: AtomicU64,
    pub tools_executed: AtomicU64,
}

/// Standard error body for non-2xx responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Build the router with all routes and layers.
pub fn build_router(state: SharedState) -> Router {
    // The browser frontend may be served from anywhere during
    // development, so the CORS policy is permissive.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/chat", post(chat::chat_handler))
        .route("/chat/start", post(users::start_chat_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Subscribe to the engine's event bus and keep the health counters
/// current. Runs until the bus is dropped.
pub fn spawn_event_listener(
    state: SharedState,
    event_bus: Arc<EventBus>,
) -> tokio::task::JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match event.as_ref() {
                    DomainEvent::TurnCompleted { .. } => {
                        state.counters.turns_completed.fetch_add(1, Ordering::Relaxed);
                    }
                    DomainEvent::ToolExecuted { .. } => {
                        state.counters.tools_executed.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {}
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event listener fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Start the HTTP server. Blocks until the listener fails or the
/// process is stopped.
pub async fn start(
    config: &nebula_config::AppConfig,
    engine: TurnEngine,
    event_bus: Arc<EventBus>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let store: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new(
        config.server.max_conversations,
    ));
    let state = Arc::new(AppState::new(engine, store));
    spawn_event_listener(state.clone(), event_bus);

    let app = build_router(state);

    info!(addr = %addr, "Server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ── Handlers ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
}

async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Welcome to the Nebula AI Chat API",
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: i64,
    turns_completed: u64,
    tools_executed: u64,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        turns_completed: state.counters.turns_completed.load(Ordering::Relaxed),
        tools_executed: state.counters.tools_executed.load(Ordering::Relaxed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use nebula_core::error::{ProviderError, RetrievalError, ToolError};
    use nebula_core::message::Message;
    use nebula_core::provider::{ProviderRequest, ProviderResponse};
    use nebula_core::tool::{Tool, ToolRegistry, ToolResult};
    use nebula_core::{Provider, Retriever};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Plays back scripted responses, one per model call.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<ProviderResponse>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ProviderResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
            })
        }

        fn text(content: &str) -> ProviderResponse {
            ProviderResponse {
                message: Message::assistant(content),
                usage: None,
                model: "mock-model".into(),
            }
        }

        fn tool_call(id: &str, url: &str) -> ProviderResponse {
            ProviderResponse {
                message: Message::assistant_with_tool_calls(
                    "",
                    vec![nebula_core::message::ToolCallRequest {
                        id: id.into(),
                        name: "fetch_job_description_content".into(),
                        arguments: serde_json::json!({ "url": url }),
                    }],
                ),
                usage: None,
                model: "mock-model".into(),
            }
        }
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.responses.lock().unwrap().pop_front().ok_or_else(|| {
                ProviderError::ApiError {
                    status_code: 500,
                    message: "script exhausted".into(),
                }
            })
        }
    }

    struct StubRetriever;

    #[async_trait::async_trait]
    impl Retriever for StubRetriever {
        fn name(&self) -> &str {
            "stub"
        }

        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<String>, RetrievalError> {
            Ok(vec!["Nebula was founded in 2021.".into()])
        }
    }

    struct StubFetchTool;

    #[async_trait::async_trait]
    impl Tool for StubFetchTool {
        fn name(&self) -> &str {
            "fetch_job_description_content"
        }
        fn description(&self) -> &str {
            "Fetches plain text content from a given URL"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "url": { "type": "string" } },
                "required": ["url"]
            })
        }
        async fn execute(
            &self,
            call_id: &str,
            _arguments: &serde_json::Value,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult {
                call_id: call_id.into(),
                success: true,
                output: "Senior Rust Engineer wanted.".into(),
            })
        }
    }

    fn test_state(responses: Vec<ProviderResponse>, tools: ToolRegistry) -> SharedState {
        let engine = TurnEngine::new(
            ScriptedProvider::new(responses),
            Arc::new(StubRetriever),
            Arc::new(tools),
            "mock-model",
            Arc::new(EventBus::default()),
        );
        let store: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new(100));
        Arc::new(AppState::new(engine, store))
    }

    fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(body).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let app = build_router(test_state(vec![], ToolRegistry::new()));

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["turns_completed"], 0);
    }

    #[tokio::test]
    async fn root_returns_welcome() {
        let app = build_router(test_state(vec![], ToolRegistry::new()));

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let root: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(root["message"].as_str().unwrap().contains("Nebula"));
    }

    #[tokio::test]
    async fn chat_start_registers_and_reuses_users() {
        let state = test_state(vec![], ToolRegistry::new());

        let body = serde_json::json!({
            "name": "Ada",
            "email": "ada@example.com",
            "organisation": "Nebula"
        });
        let response = build_router(state.clone())
            .oneshot(post_json("/chat/start", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let user: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(user["userID"], 1);

        // Same email comes back with the same id.
        let response = build_router(state)
            .oneshot(post_json("/chat/start", &body))
            .await
            .unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let again: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(again["userID"], 1);
    }

    #[tokio::test]
    async fn chat_start_requires_name_and_email() {
        let app = build_router(test_state(vec![], ToolRegistry::new()));

        let body = serde_json::json!({ "name": "", "email": "" });
        let response = app.oneshot(post_json("/chat/start", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_turn_roundtrip() {
        let state = test_state(
            vec![ScriptedProvider::text("Nebula builds data tooling.")],
            ToolRegistry::new(),
        );

        let body = serde_json::json!({ "message": "What does Nebula do?", "userId": 7 });
        let response = build_router(state)
            .oneshot(post_json("/chat", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let chat: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(chat["response"], "Nebula builds data tooling.");

        let history = chat["history"].as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["sender"], "user");
        assert_eq!(history[1]["sender"], "bot");
    }

    #[tokio::test]
    async fn chat_missing_user_id_rejected() {
        let app = build_router(test_state(vec![], ToolRegistry::new()));

        let body = serde_json::json!({ "message": "Hello" });
        let response = app.oneshot(post_json("/chat", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let error: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(error["error"], "userId and message are required");
    }

    #[tokio::test]
    async fn chat_empty_message_rejected() {
        let app = build_router(test_state(vec![], ToolRegistry::new()));

        let body = serde_json::json!({ "message": "   ", "userId": 1 });
        let response = app.oneshot(post_json("/chat", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn second_turn_sees_prior_history() {
        let state = test_state(
            vec![
                ScriptedProvider::text("First answer."),
                ScriptedProvider::text("Second answer."),
            ],
            ToolRegistry::new(),
        );

        let body = serde_json::json!({ "message": "First question", "userId": 9 });
        build_router(state.clone())
            .oneshot(post_json("/chat", &body))
            .await
            .unwrap();

        let body = serde_json::json!({ "message": "Second question", "userId": 9 });
        let response = build_router(state)
            .oneshot(post_json("/chat", &body))
            .await
            .unwrap();

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let chat: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(chat["response"], "Second answer.");
        assert_eq!(chat["history"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn tool_turn_projects_thinking_entry() {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(StubFetchTool));

        let state = test_state(
            vec![
                ScriptedProvider::tool_call("call_1", "https://example.com/job"),
                ScriptedProvider::text("Looks like a great fit."),
            ],
            tools,
        );

        let body = serde_json::json!({
            "message": "Check https://example.com/job",
            "userId": 3
        });
        let response = build_router(state)
            .oneshot(post_json("/chat", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let chat: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        // user, thinking marker, final answer; the tool result stays
        // internal.
        let history = chat["history"].as_array().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1]["text"], "Thinking...");
        assert_eq!(history[1]["tool_calls"], true);
        assert!(
            history
                .iter()
                .all(|e| e["text"] != "Senior Rust Engineer wanted.")
        );
    }

    #[tokio::test]
    async fn event_listener_updates_counters() {
        let state = test_state(vec![], ToolRegistry::new());
        let bus = Arc::new(EventBus::default());
        spawn_event_listener(state.clone(), bus.clone());

        bus.publish(DomainEvent::TurnCompleted {
            conversation_id: "7".into(),
            cycles: 1,
            duration_ms: 5,
            timestamp: Utc::now(),
        });
        bus.publish(DomainEvent::ToolExecuted {
            tool_name: "fetch_job_description_content".into(),
            success: true,
            duration_ms: 3,
            timestamp: Utc::now(),
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(state.counters.turns_completed.load(Ordering::Relaxed), 1);
        assert_eq!(state.counters.tools_executed.load(Ordering::Relaxed), 1);
    }
}
