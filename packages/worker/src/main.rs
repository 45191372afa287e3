// Main entry point for the communication worker

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use worker_core::kernel::jobs::PgJobStore;
use worker_core::kernel::messaging::{
    DealershipTemplates, HttpAttachmentFetcher, SendGridMessenger, TwilioMessenger,
};
use worker_core::kernel::tenants::PgTenantGateway;
use worker_core::kernel::{Supervisor, WorkerKernel};
use worker_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,worker_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Dealer Communication Worker");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to the central database
    tracing::info!("Connecting to central database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.central_db_url)
        .await
        .context("Failed to connect to central database")?;
    tracing::info!("Central database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Wire up the kernel
    let kernel = Arc::new(WorkerKernel::new(
        pool.clone(),
        Arc::new(PgJobStore::new(pool.clone())),
        Arc::new(PgTenantGateway::new(pool)),
        Arc::new(SendGridMessenger::new()),
        Arc::new(TwilioMessenger::new()),
        Arc::new(DealershipTemplates::new().context("Failed to build templates")?),
        Arc::new(HttpAttachmentFetcher::new()),
    ));

    Supervisor::new(kernel, config).run().await
}
