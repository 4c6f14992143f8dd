//! Restaurant Operations Inventory Core - alerting daemon
//!
//! Runs the rule-engine polling loop and the escalation timers against the
//! shared Postgres store. Order fulfillment and the administrative surface
//! embed the same services as a library; this binary only hosts the
//! background work.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resto_ops_backend::services::{
    ActionExecutor, ActionHooks, AlertRuleEngine, AlertService, EscalationScheduler, LogDispatcher,
};
use resto_ops_backend::store::{AlertStore, InventoryStore, PgStore};
use resto_ops_backend::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resto_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting inventory core");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    // Wire the services
    let store = Arc::new(PgStore::new(db_pool));
    let inventory: Arc<dyn InventoryStore> = store.clone();
    let alert_store: Arc<dyn AlertStore> = store.clone();

    let dispatcher = Arc::new(LogDispatcher);
    let executor = Arc::new(ActionExecutor::new(dispatcher, ActionHooks::default()));
    let scheduler = EscalationScheduler::new(alert_store.clone(), executor.clone());

    let restored = scheduler.restore().await?;
    tracing::info!(restored, "escalation scheduler ready");

    let alerts = Arc::new(AlertService::new(
        alert_store.clone(),
        executor,
        scheduler.clone(),
    ));

    let engine = AlertRuleEngine::new(
        inventory,
        alert_store,
        alerts,
        Duration::from_secs(config.alerting.poll_interval_secs),
    );
    let engine_handle = engine.clone().start();

    tracing::info!("Inventory core running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    engine.stop();
    engine_handle.await.ok();
    scheduler.shutdown().await;

    Ok(())
}
