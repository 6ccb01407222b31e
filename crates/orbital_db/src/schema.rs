//! Schema creation for all Orbital durable-store tables.
//!
//! All `CREATE TABLE` statements live here — single source of truth.

use crate::error::Result;
use crate::OrbitalDb;
use tracing::info;

impl OrbitalDb {
    /// Ensure all tables and indexes exist. Idempotent.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        self.create_worker_table().await?;
        self.create_planet_table().await?;
        self.create_task_attempt_table().await?;
        info!("durable store schema verified");
        Ok(())
    }

    async fn create_worker_table(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS workers (
                worker_id TEXT PRIMARY KEY,
                address TEXT,
                state TEXT NOT NULL DEFAULT 'offline',
                last_heartbeat TEXT,
                idle_cpu REAL,
                idle_ram REAL,
                peak_cpu REAL,
                peak_ram REAL,
                disk REAL,
                current_job TEXT,
                assigned INTEGER NOT NULL DEFAULT 0,
                completed INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                connected_at TEXT,
                disconnected_at TEXT
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_workers_last_heartbeat ON workers(last_heartbeat)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_workers_state ON workers(state)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn create_planet_table(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS planets (
                planet_id TEXT PRIMARY KEY,
                next_run_time TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'queued',
                season INTEGER NOT NULL DEFAULT 1,
                round INTEGER NOT NULL DEFAULT 0,
                round_number INTEGER NOT NULL DEFAULT 0,
                last_processed TEXT,
                processing_worker TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_planets_next_run_status ON planets(next_run_time, status)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_planets_status ON planets(status)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn create_task_attempt_table(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS task_attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                planet_id TEXT NOT NULL,
                worker_id TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT,
                outcome TEXT NOT NULL DEFAULT 'started',
                error_detail TEXT
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_attempts_start_time ON task_attempts(start_time DESC)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_attempts_planet ON task_attempts(planet_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
