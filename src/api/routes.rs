//! Router construction and shared state.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use super::types::{HealthResponse, ServerInfo};
use super::{run, sessions, web};
use crate::agent::{AgentDefinition, Runner, APP_NAME};
use crate::config::Config;
use crate::llm::LlmClient;
use crate::session::{InMemorySessionStore, SessionStore};

/// State shared by every handler.
pub struct AppState {
    pub config: Config,
    pub agent: Arc<AgentDefinition>,
    pub sessions: Arc<dyn SessionStore>,
    pub runner: Runner,
}

impl AppState {
    pub fn new(config: Config, agent: AgentDefinition, llm: Arc<dyn LlmClient>) -> Self {
        let agent = Arc::new(agent);
        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let runner = Runner::new(
            Arc::clone(&agent),
            llm,
            Arc::clone(&sessions),
            config.max_iterations,
        );
        Self {
            config,
            agent,
            sessions,
            runner,
        }
    }

    /// Reject app names other than the one this server hosts.
    pub fn ensure_app(&self, app_name: &str) -> Result<(), (StatusCode, String)> {
        if app_name == APP_NAME {
            Ok(())
        } else {
            Err((
                StatusCode::NOT_FOUND,
                format!("App not found: {}", app_name),
            ))
        }
    }
}

/// Build the full application router, CORS and request tracing included.
pub fn router(state: Arc<AppState>) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config.allowed_origins)?;

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/list-apps", get(sessions::list_apps))
        .route(
            "/apps/:app_name/users/:user_id/sessions",
            post(sessions::create_session).get(sessions::list_sessions),
        )
        .route(
            "/apps/:app_name/users/:user_id/sessions/:session_id",
            post(sessions::create_session_with_id)
                .get(sessions::get_session)
                .put(sessions::update_session)
                .delete(sessions::delete_session),
        )
        .route(
            "/apps/:app_name/users/:user_id/sessions/:session_id/messages",
            get(sessions::get_messages),
        )
        .route("/run", post(run::run))
        .route("/run_sse", post(run::run_sse));

    if state.config.serve_web_interface {
        app = app.merge(web::routes());
    }

    Ok(app
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors))
}

/// CORS policy for the configured allow-list.
///
/// Credentials are allowed, so a `*` entry cannot be sent literally; it
/// mirrors the request origin instead. Methods and headers are mirrored too.
pub fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        let values = origins
            .iter()
            .map(|o| {
                HeaderValue::from_str(o)
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {:?}: {}", o, e))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        AllowOrigin::list(values)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn info(State(state): State<Arc<AppState>>) -> Json<ServerInfo> {
    Json(ServerInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        app: APP_NAME.to_string(),
        agent: state.agent.name.clone(),
        model: state.agent.model.clone(),
        description: state.agent.description.clone(),
        web: state.config.serve_web_interface,
        tools: state.agent.tools.list_tools(),
    })
}
