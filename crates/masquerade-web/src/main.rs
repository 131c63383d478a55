//! masquerade-web — Axum WebSocket server entry point.
//! Starts the orchestrator task and serves the chat transport + stats API.

mod server;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use masquerade_core::config::Config;
use masquerade_core::generator::CannedGenerator;
use masquerade_core::orchestrator::{Command, Orchestrator};
use masquerade_core::stats::{JsonlStatsSink, StatsSink};

use server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env();
    let sink: Arc<dyn StatsSink> = Arc::new(JsonlStatsSink::new(config.stats_path.clone()));
    let generator = Arc::new(CannedGenerator);

    let mut orchestrator = Orchestrator::new(config, generator, Arc::clone(&sink));
    let commands = orchestrator.command_sender();
    tokio::spawn(async move {
        orchestrator.run().await;
    });

    let state = Arc::new(AppState {
        commands: commands.clone(),
        sink,
    });
    let app = server::router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let addr = format!("0.0.0.0:{}", port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on http://localhost:{}", port);

    // Graceful shutdown on Ctrl+C — open sessions get a chat_ended first.
    let shutdown = async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = commands.send(Command::Shutdown);
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;

    info!("Server stopped.");
    Ok(())
}
