//! Jovey API server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{Method, header};
use jovey_api::config::Config;
use jovey_api::state::AppState;
use jovey_api::telemetry;
use jovey_core::clock::SystemClock;
use jovey_event_store::{MIGRATOR, PgEventStore, PgProjectionStore};
use jovey_projector::domain::dispatch::catalog;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::from_env()?;
    let tracer_provider = telemetry::init(config.otlp_endpoint.as_deref())?;

    tracing::info!("Starting Jovey API server");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    MIGRATOR.run(&pool).await?;
    tracing::info!("database migrations applied");

    let event_store = PgEventStore::new(pool.clone());
    let catalog = catalog();
    event_store.register_event_types(&catalog).await?;
    tracing::info!(event_types = catalog.len(), "event type catalog registered");

    let app_state = AppState::new(
        Arc::new(SystemClock),
        Arc::new(event_store),
        Arc::new(PgProjectionStore::new(pool)),
        config.projector,
        &config.jwt_secret,
    );

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(config.cors_origins.clone()))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let app = jovey_api::app(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("invalid HOST:PORT combination: {e}"))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    if let Some(provider) = tracer_provider
        && let Err(err) = provider.shutdown()
    {
        tracing::warn!(error = %err, "failed to flush trace exporter");
    }

    Ok(())
}
