//! HTTP API.
//!
//! Exposes session management and agent runs for the counselor, plus the
//! bundled web UI when enabled.

mod routes;
mod run;
mod sessions;
pub mod types;
mod web;

pub use routes::{cors_layer, router, AppState};

use std::future::Future;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::agent::AgentDefinition;
use crate::config::Config;
use crate::llm::{GeminiClient, LlmClient, UnconfiguredClient};

/// Handle to a running server: the bound port and a shutdown trigger.
pub struct ServeHandle {
    /// The port the server is listening on.
    pub port: u16,
    shutdown_tx: oneshot::Sender<()>,
    join: JoinHandle<std::io::Result<()>>,
}

impl ServeHandle {
    /// Trigger graceful shutdown and wait for the server to stop.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown_tx.send(());
        self.join.await??;
        Ok(())
    }

    /// Serve until `signal` resolves, then shut down gracefully.
    ///
    /// If `signal` fails the server is still stopped, and the signal's error
    /// is returned.
    pub async fn run_until<F>(self, signal: F) -> anyhow::Result<()>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        let ServeHandle {
            shutdown_tx,
            mut join,
            ..
        } = self;

        let signal_result = tokio::select! {
            result = &mut join => {
                result??;
                return Ok(());
            }
            result = signal => result,
        };
        match &signal_result {
            Ok(()) => tracing::info!("Received shutdown signal"),
            Err(e) => tracing::error!("Failed to wait for shutdown signal: {}", e),
        }

        let _ = shutdown_tx.send(());
        join.await??;
        signal_result?;
        Ok(())
    }
}

/// Start the server for `agent`, talking to Gemini when an API key is set.
pub async fn serve(config: Config, agent: AgentDefinition) -> anyhow::Result<ServeHandle> {
    let llm: Arc<dyn LlmClient> = match &config.api_key {
        Some(key) => Arc::new(GeminiClient::new(key.clone(), config.gemini_base_url.clone())),
        None => {
            tracing::warn!("GOOGLE_API_KEY is not set; agent runs will fail until it is");
            Arc::new(UnconfiguredClient)
        }
    };
    serve_with_client(config, agent, llm).await
}

/// Start the server with an explicit model client.
pub async fn serve_with_client(
    config: Config,
    agent: AgentDefinition,
    llm: Arc<dyn LlmClient>,
) -> anyhow::Result<ServeHandle> {
    if config.allows_any_origin() && config.allowed_origins.len() > 1 {
        tracing::warn!(
            "CORS allow-list contains '*' alongside explicit origins; every origin is accepted"
        );
    }

    let bind = config.bind_address();
    let state = Arc::new(AppState::new(config, agent, llm));
    if !state.sessions.is_persistent() {
        tracing::info!("Sessions are kept in memory and are lost on restart");
    }
    let app = router(state)?;

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    let port = listener.local_addr()?.port();
    tracing::info!("Listening on {} (port {})", bind, port);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    Ok(ServeHandle {
        port,
        shutdown_tx,
        join,
    })
}
