//! Web chat server.
//!
//! Serves a single-page chat UI and the JSON/SSE API behind it.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Chat page (transcript plus one input box) |
//! | `POST` | `/api/chat` | Run one turn; streams SSE events |
//! | `GET`  | `/api/sessions/{id}/messages` | Full history of a session |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Streaming contract
//!
//! `POST /api/chat` takes `{"session_id": "...", "message": "..."}`
//! (`session_id` optional) and answers with `text/event-stream`:
//!
//! | Event | Data |
//! |-------|------|
//! | `session` | `{"session_id": "..."}`, always first |
//! | `fragment` | `{"text": "..."}`, the text added since the last fragment |
//! | `done` | `{"outcome": "...", "content": "..."}`, always last |
//!
//! `content` in `done` is the assistant message that was appended to the
//! session, and replaces the concatenated fragments.
//!
//! # Sessions
//!
//! Sessions live in process memory. Each one sits behind its own
//! `tokio::sync::Mutex`, so turns in one session run one at a time while
//! separate sessions proceed independently. Sessions idle for longer than
//! `[server].session_idle_secs` are dropped.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use groundchat_core::error::ErrorKind;
use groundchat_core::models::ChatMessage;
use groundchat_core::orchestrator::{ChatOrchestrator, TurnOutcome};
use groundchat_core::session::Session;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use crate::config::Config;

const INDEX_HTML: &str = include_str!("../static/index.html");

type SharedSession = Arc<Mutex<Session>>;

/// Default for [`SessionStore::new`].
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(3600);

struct StoredSession {
    session: SharedSession,
    last_used: Instant,
}

/// In-memory session registry.
///
/// Sessions idle for longer than the timeout are dropped on the next
/// lookup, unless a turn still holds them.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_SESSION_IDLE)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Existing session, or a new one under `id` (a fresh id when `None`).
    pub async fn get_or_create(&self, id: Option<&str>) -> SharedSession {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        self.evict_idle(&mut sessions, now, id);

        let session = match id {
            Some(id) => Session::with_id(id),
            None => Session::new(),
        };
        let entry = sessions
            .entry(session.id().to_string())
            .or_insert_with(|| StoredSession {
                session: Arc::new(Mutex::new(session)),
                last_used: now,
            });
        entry.last_used = now;
        entry.session.clone()
    }

    pub async fn get(&self, id: &str) -> Option<SharedSession> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        entry.last_used = Instant::now();
        Some(entry.session.clone())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn evict_idle(
        &self,
        sessions: &mut HashMap<String, StoredSession>,
        now: Instant,
        keep: Option<&str>,
    ) {
        let before = sessions.len();
        sessions.retain(|id, entry| {
            Some(id.as_str()) == keep
                || Arc::strong_count(&entry.session) > 1
                || now.duration_since(entry.last_used) < self.idle_timeout
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "dropped idle sessions");
        }
    }
}

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<ChatOrchestrator>,
    sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(orchestrator: Arc<ChatOrchestrator>) -> Self {
        Self::with_sessions(orchestrator, SessionStore::new())
    }

    pub fn with_sessions(orchestrator: Arc<ChatOrchestrator>, sessions: SessionStore) -> Self {
        Self {
            orchestrator,
            sessions: Arc::new(sessions),
        }
    }
}

/// Build the router. Exposed separately from [`run_server`] for tests.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/api/chat", post(handle_chat))
        .route("/api/sessions/{id}/messages", get(handle_messages))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Start the chat server on `[server].bind` and run until terminated.
pub async fn run_server(config: &Config, orchestrator: Arc<ChatOrchestrator>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let sessions =
        SessionStore::with_idle_timeout(Duration::from_secs(config.server.session_idle_secs));
    let app = router(AppState::with_sessions(orchestrator, sessions));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "chat server listening");
    println!("Chat server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

// ============ GET / ============

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /api/sessions/{id}/messages ============

#[derive(Serialize)]
struct MessagesResponse {
    session_id: String,
    created_at: String,
    messages: Vec<ChatMessage>,
}

/// Full history of a session. Waits for a running turn in that session to
/// finish first.
async fn handle_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessagesResponse>, AppError> {
    let session = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| not_found(format!("no session with id: {}", id)))?;
    let session = session.lock().await;
    Ok(Json(MessagesResponse {
        session_id: session.id().to_string(),
        created_at: session.created_at().to_rfc3339(),
        messages: session.messages().to_vec(),
    }))
}

// ============ POST /api/chat ============

#[derive(Debug, Deserialize)]
struct ChatBody {
    #[serde(default)]
    session_id: Option<String>,
    message: String,
}

#[derive(Serialize)]
struct SessionPayload<'a> {
    session_id: &'a str,
}

#[derive(Serialize)]
struct FragmentPayload<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct DonePayload<'a> {
    outcome: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
}

fn sse_event(name: &str, payload: &impl Serialize) -> Event {
    Event::default()
        .event(name)
        .json_data(payload)
        .unwrap_or_else(|_| Event::default().event(name))
}

fn done_event(outcome: &TurnOutcome) -> Event {
    let error_kind = match outcome {
        TurnOutcome::Failed { kind, .. } => Some(*kind),
        _ => None,
    };
    sse_event(
        "done",
        &DonePayload {
            outcome: outcome.label(),
            content: outcome.reply().unwrap_or_default(),
            error_kind,
        },
    )
}

/// Run one chat turn and stream its progress.
///
/// The turn runs in its own task, so it completes (and the session is
/// updated) even if the client disconnects mid-stream.
async fn handle_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if body.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let session = state.sessions.get_or_create(body.session_id.as_deref()).await;
    let orchestrator = state.orchestrator.clone();
    let (tx, rx) = mpsc::unbounded_channel::<Event>();

    tokio::spawn(async move {
        let mut session = session.lock().await;
        let _ = tx.send(sse_event(
            "session",
            &SessionPayload {
                session_id: session.id(),
            },
        ));

        let fragment_tx = tx.clone();
        let mut sent = 0;
        let outcome = orchestrator
            .process_turn(&mut session, &body.message, move |buffer| {
                // The buffer only grows, so the unsent part is its tail.
                let delta = buffer.get(sent..).unwrap_or(buffer);
                sent = buffer.len();
                let _ = fragment_tx.send(sse_event("fragment", &FragmentPayload { text: delta }));
            })
            .await;

        debug!(session = session.id(), outcome = outcome.label(), "turn finished");
        let _ = tx.send(done_event(&outcome));
    });

    let stream = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::new()))
}
