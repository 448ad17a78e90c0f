use airq_server::services::alerts::{AlertCoordinator, LogNotifier};
use airq_server::services::collector::{CollectorService, HttpBridgeSource};
use airq_server::{cli, config, db, openapi, routes, state};
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

async fn bind_listener(addr: &str) -> Result<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Failed to bind airq-server listener on {addr}: port already in use. Stop the other service using this port or re-run with --port to choose another port.",
            );
        }
        Err(err) => {
            Err(err).with_context(|| format!("failed to bind airq-server listener on {addr}"))
        }
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        return;
    }
    tracing::info!("shutdown requested");
    cancel.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    if args.print_openapi {
        println!(
            "{}",
            serde_json::to_string_pretty(&openapi::openapi_json())?
        );
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::AppConfig::from_env()?;
    let pool = db::connect_lazy(&config.database_url)?;
    let state = state::AppState::new(config.clone(), pool);

    let cancel = CancellationToken::new();
    match config.collector_bridge_url() {
        Some(bridge_url) => {
            let source = HttpBridgeSource::new(
                bridge_url,
                Duration::from_secs(config.device_timeout_seconds),
            )?;
            let alerts = Arc::new(AlertCoordinator::new(
                LogNotifier,
                config.alert_cooldown_seconds,
            ));
            CollectorService::new(
                state.store.clone(),
                source,
                alerts,
                Duration::from_secs(config.poll_interval_seconds),
            )
            .start(cancel.clone());
            tracing::info!(
                bridge_url,
                interval_seconds = config.poll_interval_seconds,
                "device collector started"
            );
        }
        None => tracing::info!("device collector disabled"),
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = routes::router(state).layer(cors);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = bind_listener(&addr).await?;
    tracing::info!(%addr, "airq-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;
    cancel.cancel();
    Ok(())
}
