// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Somno-Sync API Server
//!
//! Connects accounts to Google Fit and keeps their sleep and heart-rate
//! history in sync, both on demand and on a daily schedule.

use somno_sync::{
    config::Config,
    db::FirestoreDb,
    services::{KmsService, SchedulerConfig, SyncScheduler},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Somno-Sync API");

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");

    // Initialize KMS service
    let kms = KmsService::new(
        &config.gcp_project_id,
        &config.gcp_region,
        "token-encryption",
    )
    .await
    .expect("Failed to initialize KMS service");
    tracing::info!("KMS service initialized");

    let store = Arc::new(db);
    let state = Arc::new(
        AppState::new(config.clone(), store.clone(), kms).expect("Failed to build services"),
    );

    // Daily sync of every connected account
    let scheduler = SyncScheduler::new(
        state.sync.clone(),
        store,
        SchedulerConfig {
            cron_expression: config.sync_cron.clone(),
            concurrency: config.sync_concurrency,
        },
    );
    let _job_scheduler = scheduler
        .start()
        .await
        .expect("Failed to start sync scheduler");

    // Build router
    let app = somno_sync::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("somno_sync=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
