//! REST fallback endpoints for non-WebSocket clients.
//!
//! Endpoints:
//! - POST /api/v1/chat/sessions              - Start a session
//! - GET  /api/v1/chat/sessions              - Admin queue (filter by status)
//! - GET  /api/v1/chat/sessions/open         - The caller's open session
//! - GET  /api/v1/chat/sessions/{id}         - Get a single session
//! - POST /api/v1/chat/sessions/{id}/end     - End a session
//! - POST /api/v1/chat/sessions/{id}/claim   - Admin claims a waiting session
//! - GET  /api/v1/chat/sessions/{id}/messages - Message history read path
//!
//! These enforce the same invariants as the WebSocket path: they go
//! through the same lifecycle manager, so the single-open-session rule
//! and the atomic admin claim hold regardless of transport.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use hostdesk_core::chat::repository::ChatRepository;
use hostdesk_types::chat::{ChatMessage, ChatSession, SessionStatus};
use hostdesk_types::error::ChatError;

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Request body for starting a session.
#[derive(Debug, Deserialize)]
pub struct StartSessionBody {
    #[serde(default)]
    pub subject: Option<String>,
    pub department: String,
}

/// Query parameters for the admin queue view.
#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    #[serde(default = "default_queue_status")]
    pub status: String,
    #[serde(default = "default_queue_limit")]
    pub limit: i64,
}

fn default_queue_status() -> String {
    "waiting".to_string()
}

fn default_queue_limit() -> i64 {
    50
}

/// Query parameters for message listing.
#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    #[serde(default = "default_message_limit")]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

fn default_message_limit() -> Option<i64> {
    Some(100)
}

/// Parse a UUID from a path parameter, returning a 400 error on invalid format.
fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    s.parse::<Uuid>()
        .map_err(|_| AppError::Validation(format!("Invalid UUID: {s}")))
}

/// POST /api/v1/chat/sessions - Start a session for the caller.
pub async fn start_session(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    Json(body): Json<StartSessionBody>,
) -> Result<Json<ApiResponse<ChatSession>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    if body.department.trim().is_empty() {
        return Err(AppError::Validation("department must not be empty".to_string()));
    }

    let session = state
        .lifecycle
        .start_session(&identity, None, body.subject, body.department)
        .await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(session, request_id, elapsed)))
}

/// GET /api/v1/chat/sessions - Admin queue view, filtered by status.
pub async fn list_sessions(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    Query(query): Query<QueueQuery>,
) -> Result<Json<ApiResponse<Vec<ChatSession>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    if !identity.is_admin() {
        return Err(AppError::Chat(ChatError::AdminRequired));
    }

    let status: SessionStatus = query
        .status
        .parse()
        .map_err(|e: String| AppError::Validation(e))?;

    let sessions = state
        .repo
        .list_sessions_by_status(status, Some(query.limit))
        .await
        .map_err(ChatError::Storage)?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(sessions, request_id, elapsed)))
}

/// GET /api/v1/chat/sessions/open - The caller's open session, if any.
pub async fn get_open_session(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
) -> Result<Json<ApiResponse<Option<ChatSession>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let session = state
        .repo
        .get_open_session_for_user(&identity.user_id)
        .await
        .map_err(ChatError::Storage)?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(session, request_id, elapsed)))
}

/// GET /api/v1/chat/sessions/{id} - Get a session by ID.
pub async fn get_session(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<ChatSession>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    let session = require_readable(&state, &identity, &sid).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(session, request_id, elapsed)))
}

/// POST /api/v1/chat/sessions/{id}/end - End a session.
pub async fn end_session(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    state.lifecycle.end_session(&identity, &sid).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(
        serde_json::json!({"ended": true}),
        request_id,
        elapsed,
    )))
}

/// POST /api/v1/chat/sessions/{id}/claim - Admin claims a waiting session.
pub async fn claim_session(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<ChatSession>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    let session = state.lifecycle.claim_session(&identity, None, &sid).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(session, request_id, elapsed)))
}

/// GET /api/v1/chat/sessions/{id}/messages - Message history read path.
///
/// This is how a resumed client rebuilds the transcript; the WebSocket
/// resume event intentionally carries only session metadata.
pub async fn get_messages(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    Path(session_id): Path<String>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<ApiResponse<Vec<ChatMessage>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    require_readable(&state, &identity, &sid).await?;

    let messages = state
        .repo
        .get_messages(&sid, query.limit, query.offset)
        .await
        .map_err(ChatError::Storage)?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(messages, request_id, elapsed)))
}

/// A session is readable by its participants, and by any admin (the
/// support tooling needs to inspect waiting sessions before claiming).
async fn require_readable(
    state: &AppState,
    identity: &hostdesk_types::identity::Identity,
    session_id: &Uuid,
) -> Result<ChatSession, AppError> {
    let session = state
        .repo
        .get_session(session_id)
        .await
        .map_err(ChatError::Storage)?
        .ok_or(AppError::Chat(ChatError::SessionNotFound))?;

    if !session.is_participant(&identity.user_id) && !identity.is_admin() {
        return Err(AppError::Chat(ChatError::NotAParticipant));
    }
    Ok(session)
}
