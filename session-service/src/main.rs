/// Session Service Main Entry Point
///
/// Starts the HTTP server with:
/// - PostgreSQL connection pool (sessions + revocation blacklist)
/// - Optional Redis revocation cache
/// - Background purge task
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use session_service::{
    config::Settings,
    db::{PgRevocationStore, PgSessionStore, RevocationStore, SessionStore},
    http::{self, AppState},
    security::RevocationCache,
    services::{maintenance, SessionManager, TokenService},
};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "session_service=info,info".into()),
        )
        .with_target(false)
        .init();

    info!("Starting session service");

    let settings = Settings::load().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    let db_pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .acquire_timeout(Duration::from_secs(settings.database.acquire_timeout_secs))
        .connect(&settings.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    info!(
        "Database pool initialized with {} max connections",
        settings.database.max_connections
    );

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations completed");

    let cache = match &settings.redis {
        Some(redis) => match RevocationCache::connect(&redis.url).await {
            Ok(cache) => {
                info!("Redis revocation cache initialized");
                Some(cache)
            }
            Err(err) => {
                warn!(error = %err, "Redis unavailable; running without revocation cache");
                None
            }
        },
        None => {
            info!("REDIS_URL not configured; running without revocation cache");
            None
        }
    };

    let op_timeout = Duration::from_secs(settings.storage.operation_timeout_secs);
    let sessions: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(
        db_pool.clone(),
        settings.sessions.max_sessions,
        op_timeout,
    ));
    let revocations: Arc<dyn RevocationStore> =
        Arc::new(PgRevocationStore::new(db_pool.clone(), op_timeout));

    let tokens = Arc::new(
        TokenService::from_settings(
            &settings.jwt,
            Arc::clone(&revocations),
            cache,
            settings.revocation.failure_policy,
        )
        .context("Failed to initialize token service")?,
    );
    let manager = Arc::new(SessionManager::new(
        Arc::clone(&sessions),
        Arc::clone(&tokens),
        settings.sessions.limit_policy,
    ));

    let _maintenance = maintenance::spawn(
        Arc::clone(&sessions),
        Arc::clone(&revocations),
        chrono::Duration::seconds(settings.sessions.inactive_timeout_secs as i64),
        Duration::from_secs(settings.storage.maintenance_interval_secs),
    );
    info!("Maintenance task started");

    http::serve(
        AppState { manager, tokens },
        &settings.server.host,
        settings.server.port,
    )
    .await
    .context("HTTP server error")?;

    info!("Session service shutdown complete");

    Ok(())
}
