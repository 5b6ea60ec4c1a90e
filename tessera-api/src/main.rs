use anyhow::Context;
use std::net::SocketAddr;
use tessera_api::{app, worker, AppState};
use tessera_store::app_config::Config;
use tokio::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tessera_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Tessera API on port {}", config.server.port);

    let app_state = AppState::from_config(&config).await?;

    let rules = &config.business_rules;
    worker::start_hold_sweeper(
        app_state.booking.clone(),
        app_state.metrics.clone(),
        Duration::from_secs(rules.sweep_interval_seconds.max(1)),
        rules.sweep_batch_size,
    );

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
