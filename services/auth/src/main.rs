use anyhow::Result;
use common::cache::{EphemeralStore, RedisConfig, RedisPool};
use common::database::{self, DatabaseConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use auth::config::AuthConfig;
use auth::email::{EmailConfig, EmailSender, LogEmailSender, ResendEmailSender};
use auth::queue::{JobQueue, Worker, WorkerConfig};
use auth::repositories::PgStore;
use auth::session::SessionManager;
use auth::signup::SignupService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting authentication service");

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    auth::database::run_migrations(&pool).await?;

    // Ephemeral store is optional; without it sessions do not persist
    let sessions = match RedisConfig::from_env() {
        Some(redis_config) => {
            let redis_pool = RedisPool::new(&redis_config).await?;
            if !redis_pool.health_check().await? {
                anyhow::bail!("Failed to connect to Redis");
            }
            let store: Arc<dyn EphemeralStore> = Arc::new(redis_pool);
            SessionManager::new(store)
        }
        None => {
            warn!("REDIS_URL not set, running without session persistence");
            SessionManager::disabled()
        }
    };

    let auth_config = AuthConfig::from_env();
    let worker_config = WorkerConfig::from_env();

    let store = Arc::new(PgStore::new(pool));
    let queue = JobQueue::new(store.clone());

    let sender: Arc<dyn EmailSender> = match EmailConfig::from_env() {
        Some(email_config) => Arc::new(ResendEmailSender::new(email_config)),
        None => {
            warn!("RESEND_API_KEY not set, emails will be logged instead of sent");
            Arc::new(LogEmailSender)
        }
    };

    let signup_service = SignupService::new(store, sessions, queue.clone(), auth_config)?;
    info!(
        frontend_url = %signup_service.config().frontend_url,
        "Authentication pipeline initialized"
    );

    let worker = Worker::new(queue, sender, worker_config).spawn();

    // Keep the service running
    tokio::signal::ctrl_c().await?;
    info!("Shutting down authentication service");

    worker.stop().await;

    Ok(())
}
