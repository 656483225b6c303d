// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stride-Import API Server
//!
//! Pulls activities from connected providers (currently Strava), normalizes
//! them into the canonical activity schema, and persists them with a
//! per-page audit trail.

use std::sync::Arc;
use stride_import::{config::Config, db::PgStore, services::StravaClient, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Stride-Import API");

    // Connect to Postgres and run migrations
    let store = PgStore::connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // Initialize the Strava client
    let strava = StravaClient::new(&config.strava_base_url, &config.import);
    tracing::info!(base_url = %config.strava_base_url, "Strava client initialized");

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        strava,
    });

    // Build router
    let app = stride_import::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stride_import=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
