//! Session endpoints.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use super::routes::AppState;
use super::types::{ChatMessage, ChatRole, MessagesResponse, SessionStateRequest};
use crate::agent::APP_NAME;
use crate::session::{Event, Session, SessionError};

type ApiResult<T> = Result<T, (StatusCode, String)>;

pub(crate) fn session_error(err: SessionError) -> (StatusCode, String) {
    let status = match err {
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::AlreadyExists(_) => StatusCode::CONFLICT,
    };
    (status, err.to_string())
}

/// Parse an optional `{ "state": {...} }` body. An empty body means no state.
fn parse_state(body: &Bytes) -> ApiResult<Map<String, Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    serde_json::from_slice::<SessionStateRequest>(body)
        .map(|req| req.state)
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Invalid request body: {}", e),
            )
        })
}

pub async fn list_apps() -> Json<Vec<String>> {
    Json(vec![APP_NAME.to_string()])
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Path((app_name, user_id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<Session>> {
    create(&state, &app_name, &user_id, None, &body).await
}

pub async fn create_session_with_id(
    State(state): State<Arc<AppState>>,
    Path((app_name, user_id, session_id)): Path<(String, String, String)>,
    body: Bytes,
) -> ApiResult<Json<Session>> {
    create(&state, &app_name, &user_id, Some(&session_id), &body).await
}

async fn create(
    state: &AppState,
    app_name: &str,
    user_id: &str,
    session_id: Option<&str>,
    body: &Bytes,
) -> ApiResult<Json<Session>> {
    state.ensure_app(app_name)?;
    let initial = parse_state(body)?;
    let session = state
        .sessions
        .create_session(app_name, user_id, session_id, initial)
        .await
        .map_err(session_error)?;
    tracing::info!(user_id = %user_id, session_id = %session.id, "Created session");
    Ok(Json(session))
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Path((app_name, user_id)): Path<(String, String)>,
) -> ApiResult<Json<Vec<Session>>> {
    state.ensure_app(&app_name)?;
    state
        .sessions
        .list_sessions(&app_name, &user_id)
        .await
        .map(Json)
        .map_err(session_error)
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path((app_name, user_id, session_id)): Path<(String, String, String)>,
) -> ApiResult<Json<Session>> {
    state.ensure_app(&app_name)?;
    load(&state, &app_name, &user_id, &session_id).await.map(Json)
}

pub async fn update_session(
    State(state): State<Arc<AppState>>,
    Path((app_name, user_id, session_id)): Path<(String, String, String)>,
    body: Bytes,
) -> ApiResult<Json<Session>> {
    state.ensure_app(&app_name)?;
    let delta = parse_state(&body)?;
    state
        .sessions
        .update_state(&app_name, &user_id, &session_id, delta)
        .await
        .map(Json)
        .map_err(session_error)
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path((app_name, user_id, session_id)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    state.ensure_app(&app_name)?;
    state
        .sessions
        .delete_session(&app_name, &user_id, &session_id)
        .await
        .map_err(session_error)?;
    tracing::info!(user_id = %user_id, session_id = %session_id, "Deleted session");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path((app_name, user_id, session_id)): Path<(String, String, String)>,
) -> ApiResult<Json<MessagesResponse>> {
    state.ensure_app(&app_name)?;
    let session = load(&state, &app_name, &user_id, &session_id).await?;
    Ok(Json(MessagesResponse {
        messages: session.events.iter().filter_map(chat_message).collect(),
    }))
}

async fn load(
    state: &AppState,
    app_name: &str,
    user_id: &str,
    session_id: &str,
) -> ApiResult<Session> {
    state
        .sessions
        .get_session(app_name, user_id, session_id)
        .await
        .map_err(session_error)?
        .ok_or_else(|| session_error(SessionError::NotFound(session_id.to_string())))
}

/// Flatten an event into a chat message. Events without text (tool traffic)
/// are skipped.
fn chat_message(event: &Event) -> Option<ChatMessage> {
    let content = event.content.text()?;
    let role = if event.is_from_user() {
        ChatRole::User
    } else {
        ChatRole::Assistant
    };
    Some(ChatMessage {
        id: event.id.clone(),
        content,
        role,
        timestamp: format_timestamp(event.timestamp),
    })
}

fn format_timestamp(seconds: f64) -> String {
    let micros = (seconds * 1_000_000.0).round() as i64;
    DateTime::<Utc>::from_timestamp_micros(micros)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
