//! SQLite connection pool with the pragmas the durable store relies on.

use tracing::info;

use crate::error::DbError;

pub type DbPool = sqlx::SqlitePool;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DbConfig {
    /// File-backed SQLite database, created if it does not exist.
    pub fn sqlite(path: impl AsRef<str>) -> Self {
        Self {
            url: format!("sqlite:{}?mode=rwc", path.as_ref()),
            max_connections: 5,
        }
    }

    /// In-memory SQLite database, for tests and the reconciler's unit suite.
    ///
    /// Uses a single connection: SQLite's `:memory:` database is private to
    /// the connection that created it, so a pool would otherwise hand out
    /// independent, empty databases to concurrent callers.
    pub fn sqlite_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

/// Create a database pool from configuration and apply WAL-mode pragmas.
pub async fn create_pool(config: DbConfig) -> Result<DbPool, DbError> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    apply_sqlite_pragmas(&pool).await?;

    info!(url = %config.url, "connected to durable store");
    Ok(pool)
}

async fn apply_sqlite_pragmas(pool: &DbPool) -> Result<(), DbError> {
    sqlx::query("PRAGMA journal_mode=WAL")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA synchronous=NORMAL")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys=ON")
        .execute(pool)
        .await?;
    // Let a writer that loses the race for SQLite's single write lock block
    // and retry instead of failing immediately, so concurrent dispatcher
    // tasks serialize through SQLite rather than erroring out (§5).
    sqlx::query("PRAGMA busy_timeout=5000")
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_pool_connects() {
        let config = DbConfig::sqlite_memory();
        let pool = create_pool(config).await;
        assert!(pool.is_ok());
    }

    #[tokio::test]
    async fn file_backed_pool_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orbital.db");
        let path_str = path.to_str().unwrap().to_string();

        let pool = create_pool(DbConfig::sqlite(&path_str)).await.unwrap();
        sqlx::query("CREATE TABLE marker (id INTEGER PRIMARY KEY)")
            .execute(&pool)
            .await
            .unwrap();
        drop(pool);

        let pool = create_pool(DbConfig::sqlite(&path_str)).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM marker")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
