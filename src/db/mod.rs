use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

pub mod participant;
pub mod relation;
pub mod ledger_entry;

const SCHEMA: &str = include_str!("../../migrations/create_tables.sql");

/// Open the SQLite connection pool and create tables
pub async fn init_db(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    create_tables(&pool).await?;
    info!("Database ready at {}", database_url);

    Ok(pool)
}

/// Create all tables (idempotent)
async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

/// Single-connection in-memory database for tests
#[cfg(test)]
pub async fn init_memory_db() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("valid in-memory url")
        .foreign_keys(true);

    // Every connection to :memory: is its own database, so the pool must never recycle it
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None::<Duration>)
        .max_lifetime(None::<Duration>)
        .connect_with(options)
        .await
        .expect("in-memory database");

    create_tables(&pool).await.expect("schema");
    pool
}
