use crate::config::AppConfig;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Pool shared by every service. Repository functions also accept an open
/// transaction in its place.
pub type DbPool = DatabaseConnection;

/// Pool tuning derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

impl DbConfig {
    /// Each connection to `sqlite::memory:` opens its own empty database.
    fn is_in_memory(&self) -> bool {
        self.url.starts_with("sqlite:") && self.url.contains(":memory:")
    }

    fn connect_options(&self) -> ConnectOptions {
        let (max, min) = if self.is_in_memory() {
            (1, 1)
        } else {
            (self.max_connections.max(1), self.min_connections.min(self.max_connections))
        };

        let mut opt = ConnectOptions::new(self.url.clone());
        opt.max_connections(max)
            .min_connections(min)
            .connect_timeout(self.connect_timeout)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .sqlx_logging(false);
        opt
    }
}

pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, DbErr> {
    debug!(?config, "Configuring order ledger database");
    if config.is_in_memory() && config.max_connections > 1 {
        warn!("In-memory SQLite is limited to a single connection");
    }

    let opt = config.connect_options();
    metrics::gauge!("edd_orders.db.max_connections", config.max_connections as f64);

    let pool = Database::connect(opt).await.map_err(|e| {
        error!(error = %e, "Could not open the order ledger database");
        e
    })?;

    info!(backend = ?pool.get_database_backend(), "Order ledger database connected");
    Ok(pool)
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, DbErr> {
    establish_connection_with_config(&DbConfig::from(cfg)).await
}

/// Brings the ledger schema up to the latest embedded migration.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbErr> {
    let start = Instant::now();
    let result = crate::migrator::Migrator::up(pool, None).await;

    match &result {
        Ok(()) => info!(elapsed = ?start.elapsed(), "Ledger migrations applied"),
        Err(e) => error!(elapsed = ?start.elapsed(), error = %e, "Ledger migrations failed"),
    }
    result
}
