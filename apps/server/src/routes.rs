//! HTTP control-plane routes.
//!
//! Every response carries a `success` flag and a human-readable `message`;
//! session-specific responses include the tenant number. Failures are
//! structured JSON, never raw errors.

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::debug;

use courier_core::error::CourierError;
use courier_core::session::{SessionInfo, SessionManager};
use courier_core::store::{SessionHealth, SessionStore, StoreCounts};

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    /// The session manager instance owning all mutable session state.
    pub manager: Arc<SessionManager>,
    /// Durable store, for status reporting.
    pub store: Arc<dyn SessionStore>,
    /// Process start, for uptime reporting.
    pub started_at: Instant,
}

/// Builds the control-plane router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(create_or_report))
        .route("/active", get(active_sessions))
        .route("/ping", get(ping))
        .route("/session-health", get(session_health))
        .route("/sync-store", get(sync_store))
        .route("/restore-all", get(restore_all))
        .route("/cleanup", get(cleanup))
        .route("/session/:number", delete(delete_session))
        .route("/store-status", get(store_status))
        .route("/api/request-pair", post(request_pair))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct StatusMessage {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    number: Option<String>,
}

fn ok(message: impl Into<String>) -> (StatusCode, Json<StatusMessage>) {
    (StatusCode::OK, Json(StatusMessage { success: true, message: message.into(), number: None }))
}

fn failure(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<StatusMessage>) {
    (status, Json(StatusMessage { success: false, message: message.into(), number: None }))
}

/// Maps a manager error to a structured failure response.
fn error_response(err: &CourierError) -> (StatusCode, Json<StatusMessage>) {
    let status = match err {
        CourierError::InvalidNumber(_) => StatusCode::BAD_REQUEST,
        CourierError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    failure(status, err.to_string())
}

#[derive(Debug, Deserialize)]
struct CreateQuery {
    number: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateResponse {
    success: bool,
    message: String,
    number: String,
    session: SessionInfo,
}

/// `GET /?number=<digits>` — create a session or report the existing one.
async fn create_or_report(
    State(state): State<AppState>,
    Query(query): Query<CreateQuery>,
) -> Response {
    let Some(number) = query.number else {
        return failure(
            StatusCode::BAD_REQUEST,
            "Phone number required; usage: /?number=94XXXXXXXXX",
        )
        .into_response();
    };

    let already_live = state.manager.session_info(&number).await.is_some();
    match state.manager.create_session(&number, None, false).await {
        Ok(session) => {
            let message = if already_live {
                "Session already active"
            } else {
                "Session creation initiated"
            };
            (
                StatusCode::OK,
                Json(CreateResponse {
                    success: true,
                    message: message.to_string(),
                    number: session.number.clone(),
                    session,
                }),
            )
                .into_response()
        }
        Err(CourierError::CreateInProgress(number)) => {
            debug!(number = %number, "Create raced an in-flight attempt");
            ok("Session creation already in progress").into_response()
        }
        Err(err) => error_response(&err).into_response(),
    }
}

#[derive(Debug, Serialize)]
struct SessionListResponse {
    success: bool,
    count: usize,
    sessions: Vec<SessionInfo>,
}

/// `GET /active` — enumerate live sessions.
async fn active_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    let sessions = state.manager.list_sessions().await;
    Json(SessionListResponse { success: true, count: sessions.len(), sessions })
}

#[derive(Debug, Serialize)]
struct HealthOverall {
    total: usize,
    active: usize,
    reconnecting: usize,
    disconnected: usize,
}

#[derive(Debug, Serialize)]
struct SessionHealthResponse {
    success: bool,
    sessions: Vec<SessionInfo>,
    overall: HealthOverall,
}

/// `GET /session-health` — per-session health plus aggregate counts.
async fn session_health(State(state): State<AppState>) -> Json<SessionHealthResponse> {
    let sessions = state.manager.list_sessions().await;
    let count_health =
        |health: SessionHealth| sessions.iter().filter(|s| s.health == health).count();
    let overall = HealthOverall {
        total: sessions.len(),
        active: count_health(SessionHealth::Active),
        reconnecting: count_health(SessionHealth::Reconnecting),
        disconnected: count_health(SessionHealth::Disconnected),
    };
    Json(SessionHealthResponse { success: true, sessions, overall })
}

#[derive(Debug, Serialize)]
struct PingResponse {
    success: bool,
    message: String,
    store_connected: bool,
    active_sessions: usize,
    uptime_secs: u64,
}

/// `GET /ping` — liveness.
async fn ping(State(state): State<AppState>) -> Json<PingResponse> {
    Json(PingResponse {
        success: true,
        message: "pong".to_string(),
        store_connected: state.store.ping().await,
        active_sessions: state.manager.session_count().await,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

#[derive(Debug, Serialize)]
struct SyncResponse {
    success: bool,
    message: String,
    saved: usize,
    buffered: usize,
    synced: Vec<String>,
}

/// `GET /sync-store` — force a persistence sync and pending-write flush.
async fn sync_store(State(state): State<AppState>) -> Json<SyncResponse> {
    let report = state.manager.sync_store().await;
    Json(SyncResponse {
        success: true,
        message: "Store sync completed".to_string(),
        saved: report.saved,
        buffered: report.buffered,
        synced: report.flushed,
    })
}

#[derive(Debug, Serialize)]
struct RestoreResponse {
    success: bool,
    message: String,
    count: usize,
}

/// `GET /restore-all` — trigger the cold restore sweep.
async fn restore_all(State(state): State<AppState>) -> Json<RestoreResponse> {
    let count = state.manager.restore_sweep().await;
    Json(RestoreResponse { success: true, message: "Restoration completed".to_string(), count })
}

#[derive(Debug, Serialize)]
struct CleanupResponse {
    success: bool,
    message: String,
    evicted: Vec<String>,
    idle_removed: Vec<String>,
    purged: usize,
}

/// `GET /cleanup` — trigger the stale-session eviction sweep.
async fn cleanup(State(state): State<AppState>) -> Json<CleanupResponse> {
    let report = state.manager.evict_stale().await;
    Json(CleanupResponse {
        success: true,
        message: "Cleanup completed".to_string(),
        evicted: report.evicted,
        idle_removed: report.idle_removed,
        purged: report.purged,
    })
}

/// `DELETE /session/:number` — logout and remove every trace of a session.
async fn delete_session(State(state): State<AppState>, Path(number): Path<String>) -> Response {
    match state.manager.delete_session(&number).await {
        Ok(()) => {
            let body = StatusMessage {
                success: true,
                message: "Session deleted successfully".to_string(),
                number: Some(number),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => error_response(&err).into_response(),
    }
}

#[derive(Debug, Serialize)]
struct StoreStatusResponse {
    success: bool,
    connected: bool,
    pending_writes: usize,
    records: StoreCounts,
}

/// `GET /store-status` — store connectivity and record counts.
async fn store_status(State(state): State<AppState>) -> Json<StoreStatusResponse> {
    let connected = state.store.ping().await;
    let records = state.store.counts().await.unwrap_or_default();
    Json(StoreStatusResponse {
        success: true,
        connected,
        pending_writes: state.manager.pending_count().await,
        records,
    })
}

#[derive(Debug, Deserialize)]
struct PairRequest {
    number: String,
}

#[derive(Debug, Serialize)]
struct PairResponse {
    success: bool,
    message: String,
    number: String,
    code: String,
}

/// `POST /api/request-pair` — short pairing code for out-of-band linking.
async fn request_pair(
    State(state): State<AppState>,
    Json(request): Json<PairRequest>,
) -> Response {
    match state.manager.request_pairing_code(&request.number).await {
        Ok(code) => (
            StatusCode::OK,
            Json(PairResponse {
                success: true,
                message: "Pairing code issued".to_string(),
                number: request.number,
                code,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}
