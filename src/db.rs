use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Connection pool for the usage-events database.
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        // Fail at startup rather than on the first run
        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Pool that connects on first use. For tests and CLI runs that may never touch the database.
    pub fn lazy(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(database_url)?;
        Ok(Self { pool })
    }
}
