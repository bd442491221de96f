use anyhow::Result;
use clap::Parser;
use spinroom_core::persist::SnapshotBackend;
use spinroom_core::{AppState, CoreConfig};
use std::path::PathBuf;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("spinroom=info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let mut config = config::Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    let backend = match config.snapshot.backend {
        config::SnapshotBackendKind::Memory => {
            SnapshotBackend::memory(Duration::from_secs(config.snapshot.ttl_seconds))
        }
        config::SnapshotBackendKind::File => {
            let dir = PathBuf::from(&config.snapshot.dir);
            std::fs::create_dir_all(&dir)?;
            SnapshotBackend::file(dir)
        }
    };
    let state = AppState::new(
        backend,
        CoreConfig {
            worker_id: config.server.worker_id,
            snapshot_interval: Duration::from_secs(config.snapshot.interval_seconds),
            snapshot_ttl: Duration::from_secs(config.snapshot.ttl_seconds),
        },
    );

    let cors = match &config.server.public_url {
        Some(url) => match url.parse::<axum::http::HeaderValue>() {
            Ok(origin) => CorsLayer::new()
                .allow_origin(origin)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
            Err(_) => {
                tracing::warn!("public_url '{}' is not a valid origin, allowing any", url);
                CorsLayer::permissive()
            }
        },
        None => CorsLayer::permissive(),
    };

    let app = spinroom_ws::gateway_router()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!("Spinroom listening on {}", config.server.bind_address);
    tracing::info!(
        "Gateway: ws://{}/gateway?room=<roomId>&client=<clientId>&name=<name>",
        config.server.bind_address
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutting down");
}
