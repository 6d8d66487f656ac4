//! Leslie - HTTP Server Entry Point
//!
//! Starts the HTTP server that exposes the counselor agent.

use leslie::{agent::AgentDefinition, api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leslie=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let agent = AgentDefinition::mental_health_counselor();
    info!(
        "Loaded configuration: agent={} model={} web={}",
        agent.name, agent.model, config.serve_web_interface
    );

    // Start HTTP server
    let handle = api::serve(config, agent).await?;
    handle.run_until(shutdown_signal()).await?;

    info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
