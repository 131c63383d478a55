//! Web server — Axum router + shared state.

pub mod api;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use masquerade_core::orchestrator::Command;
use masquerade_core::stats::StatsSink;

/// Shared application state — the orchestrator's command channel plus the
/// sink the reporting endpoint reads.
pub struct AppState {
    pub commands: mpsc::UnboundedSender<Command>,
    pub sink: Arc<dyn StatsSink>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::very_permissive();

    let mut app = Router::new()
        .merge(api::routes())
        .merge(ws::routes())
        .layer(cors)
        .with_state(state);

    // Serve the chat frontend if a public/ directory exists.
    let public = std::path::Path::new("public");
    if public.is_dir() {
        let index_html = public.join("index.html");
        app = app.fallback_service(
            ServeDir::new(public).not_found_service(ServeFile::new(index_html)),
        );
    }

    app
}
