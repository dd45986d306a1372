//! HTTP + WebSocket API for Repwatch
//!
//! Endpoints:
//! - GET /health - Health check
//! - POST /session/new - Create new session
//! - GET /session/{id} - Get session status
//! - POST /session/{id}/rule - Activate a rule (JSON rule record)
//! - POST /session/{id}/frame - Feed a keypoint frame
//! - POST /session/{id}/score - Feed a remote scorer response
//! - POST /session/{id}/action/{action} - start/pause/resume/rest/finish/stop
//! - POST /session/{id}/reset - Reset count and engine state
//! - WS /ws/{id} - Live updates

use axum::{
    extract::{Path, State, WebSocketUpgrade, ws::{Message, WebSocket}},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::core::{BackendKind, EngineConfig, RemoteMode, RepSession, RuleEvaluator};
use crate::types::{
    EngineError, EvalReason, FrameOutput, KeypointFrame, Phase, RemoteScore, Rule, SessionAction,
    SessionState,
};

/// Session state
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub session: RepSession,
    pub update_tx: broadcast::Sender<SessionUpdate>,
}

impl Session {
    fn update(&self, completed: bool, reason: Option<EvalReason>) -> SessionUpdate {
        SessionUpdate {
            session_id: self.id.clone(),
            state: self.session.state(),
            phase: self.session.phase(),
            count: self.session.count(),
            completed,
            reason,
        }
    }

    fn broadcast(&self, completed: bool, reason: Option<EvalReason>) {
        // No subscribers is fine
        let _ = self.update_tx.send(self.update(completed, reason));
    }
}

/// Live update message
#[derive(Debug, Clone, Serialize)]
pub struct SessionUpdate {
    pub session_id: String,
    pub state: SessionState,
    pub phase: Phase,
    pub count: u64,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<EvalReason>,
}

/// App state
pub struct AppState {
    pub sessions: RwLock<HashMap<String, Session>>,
    pub config: EngineConfig,
    next_id: AtomicU64,
}

/// Create new session request
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NewSessionRequest {
    pub backend: Option<BackendKind>,
    pub rule: Option<Rule>,
    pub target_reps: Option<u64>,
    pub remote_mode: Option<RemoteMode>,
}

/// Create new session response
#[derive(Debug, Serialize)]
pub struct NewSessionResponse {
    pub session_id: String,
    pub websocket_url: String,
}

/// Session status response
#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub state: SessionState,
    pub phase: Phase,
    pub count: u64,
    pub backend: BackendKind,
    pub rule: Option<Rule>,
    pub target_reps: Option<u64>,
}

/// Score response
#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub count: u64,
    pub completed: bool,
    pub state: SessionState,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions_active: usize,
}

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error mapped to an HTTP status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(id: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("session {} not found", id),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match e {
            EngineError::InvalidRuleConfig(_) | EngineError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::InvalidTransition { .. }
            | EngineError::NotRecording(_)
            | EngineError::NoActiveRule
            | EngineError::WrongBackend(_) => StatusCode::CONFLICT,
            EngineError::StaleSession => StatusCode::GONE,
            EngineError::Transport(_) => StatusCode::BAD_GATEWAY,
            EngineError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, message: e.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

/// Create the API router
pub fn create_router(config: EngineConfig) -> Router {
    let state = Arc::new(AppState {
        sessions: RwLock::new(HashMap::new()),
        config,
        next_id: AtomicU64::new(0),
    });

    Router::new()
        .route("/health", get(health))
        .route("/session/new", post(create_session))
        .route("/session/:id", get(get_session))
        .route("/session/:id/rule", post(activate_rule))
        .route("/session/:id/frame", post(push_frame))
        .route("/session/:id/score", post(push_score))
        .route("/session/:id/action/:action", post(session_action))
        .route("/session/:id/reset", post(reset_session))
        .route("/ws/:id", get(websocket_handler))
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let sessions = state.sessions.read().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        sessions_active: sessions.len(),
    })
}

/// Create new session
async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewSessionRequest>,
) -> Result<Json<NewSessionResponse>, ApiError> {
    let config = &state.config;
    let backend = req.backend.unwrap_or(BackendKind::Local);

    let mut session = match backend {
        BackendKind::Local => RepSession::local(RuleEvaluator::with_confidence_floor(config.confidence_floor)),
        BackendKind::Remote => RepSession::remote(
            req.remote_mode.unwrap_or(config.remote_mode),
            config.remote_confirm_frames,
        ),
    }
    .with_target(req.target_reps);

    if let Some(rule) = req.rule {
        session.activate(rule)?;
    }

    let seq = state.next_id.fetch_add(1, Ordering::Relaxed);
    let session_id = generate_session_id(seq);
    let (tx, _) = broadcast::channel(100);

    let mut sessions = state.sessions.write().await;
    sessions.insert(
        session_id.clone(),
        Session {
            id: session_id.clone(),
            session,
            update_tx: tx,
        },
    );
    info!(session = %session_id, ?backend, "session created");

    Ok(Json(NewSessionResponse {
        session_id: session_id.clone(),
        websocket_url: format!("/ws/{}", session_id),
    }))
}

/// Get session status
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatusResponse>, ApiError> {
    let sessions = state.sessions.read().await;
    let entry = sessions.get(&id).ok_or_else(|| ApiError::not_found(&id))?;
    let s = &entry.session;

    Ok(Json(SessionStatusResponse {
        session_id: id,
        state: s.state(),
        phase: s.phase(),
        count: s.count(),
        backend: s.backend_kind(),
        rule: s.active_rule().cloned(),
        target_reps: s.target_reps(),
    }))
}

/// Activate a rule from its JSON record. An invalid rule deactivates the
/// current one and is reported as 422.
async fn activate_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: String,
) -> Result<Json<SessionStatusResponse>, ApiError> {
    {
        let mut sessions = state.sessions.write().await;
        let entry = sessions.get_mut(&id).ok_or_else(|| ApiError::not_found(&id))?;
        let result = entry.session.activate_json(&body).map(|_| ());
        entry.broadcast(false, None);
        result?;
    }
    get_session(State(state), Path(id)).await
}

/// Feed one keypoint frame
async fn push_frame(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(frame): Json<KeypointFrame>,
) -> Result<Json<FrameOutput>, ApiError> {
    let mut sessions = state.sessions.write().await;
    let entry = sessions.get_mut(&id).ok_or_else(|| ApiError::not_found(&id))?;

    let output = entry.session.process(&frame)?;
    entry.broadcast(output.completed, Some(output.reason));
    Ok(Json(output))
}

/// Feed one remote scorer response
async fn push_score(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(score): Json<RemoteScore>,
) -> Result<Json<ScoreResponse>, ApiError> {
    let mut sessions = state.sessions.write().await;
    let entry = sessions.get_mut(&id).ok_or_else(|| ApiError::not_found(&id))?;

    let update = entry.session.apply_score(&score)?;
    entry.broadcast(update.completed, None);
    Ok(Json(ScoreResponse {
        count: update.count,
        completed: update.completed,
        state: entry.session.state(),
    }))
}

/// Apply a session action
async fn session_action(
    State(state): State<Arc<AppState>>,
    Path((id, action)): Path<(String, String)>,
) -> Result<Json<SessionStatusResponse>, ApiError> {
    let action: SessionAction = action.parse().map_err(|e: EngineError| ApiError {
        status: StatusCode::BAD_REQUEST,
        message: e.to_string(),
    })?;
    {
        let mut sessions = state.sessions.write().await;
        let entry = sessions.get_mut(&id).ok_or_else(|| ApiError::not_found(&id))?;
        entry.session.apply(action)?;
        entry.broadcast(false, None);
    }
    get_session(State(state), Path(id)).await
}

/// Reset count and engine state
async fn reset_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatusResponse>, ApiError> {
    {
        let mut sessions = state.sessions.write().await;
        let entry = sessions.get_mut(&id).ok_or_else(|| ApiError::not_found(&id))?;
        entry.session.reset();
        entry.broadcast(false, None);
    }
    get_session(State(state), Path(id)).await
}

/// WebSocket handler for live updates
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or_else(|| ApiError::not_found(&id))?;
    let rx = session.update_tx.subscribe();
    drop(sessions);

    Ok(ws.on_upgrade(move |socket| async move {
        handle_websocket(socket, rx).await;
    }))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, mut rx: broadcast::Receiver<SessionUpdate>) {
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Ok(update) => {
                    let json = serde_json::to_string(&update).unwrap_or_default();
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "websocket client lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Generate session ID
fn generate_session_id(seq: u64) -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("session_{:x}_{}", nanos, seq)
}

/// Run the API server
pub async fn run_server(addr: &str, config: EngineConfig) -> Result<(), EngineError> {
    let router = create_router(config);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "repwatch API listening");
    info!("  POST /session/new                    - Create session");
    info!("  GET  /session/:id                    - Get status");
    info!("  POST /session/:id/rule               - Activate rule");
    info!("  POST /session/:id/frame              - Push keypoint frame");
    info!("  POST /session/:id/score              - Push remote score");
    info!("  POST /session/:id/action/:action     - Session transition");
    info!("  POST /session/:id/reset              - Reset count");
    info!("  WS   /ws/:id                         - Live updates");
    info!("  GET  /health                         - Health check");
    axum::serve(listener, router).await?;
    Ok(())
}
