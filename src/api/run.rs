//! Agent run endpoints.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde_json::json;

use super::routes::AppState;
use super::sessions::session_error;
use super::types::RunAgentRequest;
use crate::agent::RunError;
use crate::llm::LlmError;
use crate::session::{Event, SessionError};

fn run_error(err: RunError) -> (StatusCode, String) {
    let status = match &err {
        RunError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        RunError::EmptyMessage => StatusCode::BAD_REQUEST,
        RunError::Session(e) => return session_error(e.clone()),
        RunError::Llm(LlmError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
        RunError::Llm(_) | RunError::EmptyResponse(_) => StatusCode::BAD_GATEWAY,
        RunError::MaxIterations(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

/// POST /run - run the agent and return all of its events at once.
pub async fn run(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunAgentRequest>,
) -> Result<Json<Vec<Event>>, (StatusCode, String)> {
    state.ensure_app(&req.app_name)?;
    tracing::info!(user_id = %req.user_id, session_id = %req.session_id, "Run requested");

    state
        .runner
        .run(&req.app_name, &req.user_id, &req.session_id, req.new_message)
        .await
        .map(Json)
        .map_err(run_error)
}

/// POST /run_sse - run the agent, streaming each event as it is produced.
///
/// A blank message, an unknown app or a missing session is a plain HTTP
/// error. Failures during the run arrive as a final `{"error": ...}` event.
pub async fn run_sse(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunAgentRequest>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, (StatusCode, String)> {
    state.ensure_app(&req.app_name)?;
    if !req.new_message.has_text() {
        return Err(run_error(RunError::EmptyMessage));
    }
    let exists = state
        .sessions
        .get_session(&req.app_name, &req.user_id, &req.session_id)
        .await
        .map_err(session_error)?
        .is_some();
    if !exists {
        return Err(session_error(SessionError::NotFound(req.session_id)));
    }
    tracing::info!(
        user_id = %req.user_id,
        session_id = %req.session_id,
        "Streaming run requested"
    );

    let mut rx = state
        .runner
        .run_stream(&req.app_name, &req.user_id, &req.session_id, req.new_message);

    let stream = async_stream::stream! {
        while let Some(item) = rx.recv().await {
            let data = match item {
                Ok(event) => serde_json::to_string(&event)
                    .unwrap_or_else(|e| json!({ "error": e.to_string() }).to_string()),
                Err(e) => json!({ "error": e.to_string() }).to_string(),
            };
            yield Ok::<_, Infallible>(SseEvent::default().data(data));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
