mod audit;
mod config;
mod error;
mod guests;
mod handlers;
mod persistence;
mod realtime;
mod state;
mod store;

use anyhow::Context;
use socketioxide::SocketIo;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use audit::AuditLogger;
use config::AppConfig;
use persistence::load_snapshot;
use state::AppState;

// ─── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "seating_backend=info,seating_engine=info,socketioxide=warn,tower_http=info".into()
            }),
        )
        .init();

    info!("🪑 Seating backend starting...");

    let config = AppConfig::from_env();
    info!(
        "State file {}, audit log {}, generation timeout {} ms",
        config.state_file.display(),
        config.audit_log.display(),
        config.generation_timeout.as_millis()
    );

    // Load persisted plans and guest rosters
    let snapshot = load_snapshot(&config.state_file).await;
    let audit = AuditLogger::resume(config.audit_log.clone()).await;

    // Build Socket.IO layer; AppState registers the namespace
    let (socket_layer, io) = SocketIo::builder().build_layer();
    let port = config.port;
    let state = AppState::new(config, snapshot, audit, io);

    // CORS: the planner UI is served from a different origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = handlers::router(state)
        .layer(socket_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{port}");
    info!("🚀 Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
