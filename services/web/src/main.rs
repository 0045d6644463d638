use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod authorizer;
mod config;
mod error;
mod gatekeeper;
mod login_throttle;
mod models;
mod rate_limiter;
mod rate_store;
mod repositories;
mod response;
mod routes;
mod session;
mod validation;
mod verifier;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::login_throttle::{LoginThrottle, LoginThrottleConfig};
use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::rate_store::MemoryRateStore;
use crate::repositories::{PostRepository, UserRepository};
use crate::session::{SessionConfig, SessionStore};
use crate::verifier::CredentialVerifier;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub config: Arc<AppConfig>,
    pub sessions: SessionStore,
    pub users: UserRepository,
    pub posts: PostRepository,
    pub verifier: CredentialVerifier,
    pub rate_limiter: RateLimiter<MemoryRateStore>,
    pub login_throttle: LoginThrottle<MemoryRateStore>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting web service");

    let config = Arc::new(AppConfig::from_env()?);
    error::init_dev_mode(config.dev_mode);
    if config.dev_mode {
        warn!("Development override enabled: admission and authorization checks are bypassed");
    }

    // Initialize database connection pool
    let db_config = common::database::DatabaseConfig::from_env()?;
    let pool = common::database::init_pool(&db_config).await?;

    if common::database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    // Initialize the session store
    let redis_config = common::cache::RedisConfig::from_env()?;
    let redis_pool = common::cache::RedisPool::new(&redis_config).await?;
    let sessions = SessionStore::new(redis_pool, SessionConfig::from_env());

    let users = UserRepository::new(pool.clone());
    let posts = PostRepository::new(pool.clone());
    let verifier = CredentialVerifier::new(users.clone());

    // Throttling components, each with its own counter table, plus the
    // periodic sweep of stale entries.
    let limiter_config = RateLimiterConfig::from_env();
    let throttle_config = LoginThrottleConfig::from_env();
    let limiter_store = MemoryRateStore::new();
    let throttle_store = MemoryRateStore::new();

    rate_store::start_sweeper(
        "0 */5 * * * *",
        vec![
            (limiter_store.clone(), limiter_config.window),
            (throttle_store.clone(), throttle_config.window),
        ],
    )
    .await?;

    let rate_limiter = RateLimiter::new(limiter_config, limiter_store);
    let login_throttle = LoginThrottle::new(throttle_config, throttle_store);

    let app_state = AppState {
        db_pool: pool,
        config: config.clone(),
        sessions,
        users,
        posts,
        verifier,
        rate_limiter,
        login_throttle,
    };

    info!("Web service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Web service listening on {}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
