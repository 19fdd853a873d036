use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Creates the PostgreSQL pool for the screening store.
///
/// A batch analysis holds one connection for its whole transaction, LLM
/// calls included, so the pool is sized well above the number of screenings
/// expected to run at once and acquisition is given a generous timeout
/// rather than failing dispatch calls queued behind a long batch.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to the screening database...");

    let pool = PgPoolOptions::new()
        .max_connections(16)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;

    info!("Screening database pool ready");
    Ok(pool)
}
