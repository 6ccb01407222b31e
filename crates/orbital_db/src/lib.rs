//! Durable store (DS) for Orbital.
//!
//! Authoritative record of workers, planets and task-attempt history (§3,
//! §4.2). Backed by SQLite via `sqlx`; every cross-entity mutation the
//! dispatcher performs goes through a single transaction (`dispatch.rs`) so
//! that concurrent tick/event/sweep tasks serialize per `worker_id` /
//! `planet_id` on SQLite's own row-level write locking.

pub mod dispatch;
pub mod error;
mod planet;
mod pool;
mod schema;
mod task_attempt;
pub mod types;
mod worker;

pub use error::{DbError, Result};
pub use pool::{create_pool, DbConfig, DbPool};
pub use types::{
    parse_planet_status, parse_worker_state, PlanetRow, TaskAttemptRow, WorkerRow,
};

/// Handle to the durable store. Cheap to clone: wraps a pooled connection.
#[derive(Clone)]
pub struct OrbitalDb {
    pool: DbPool,
}

impl OrbitalDb {
    /// Connect and ensure the schema exists.
    pub async fn connect(config: DbConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Wrap an already-open pool (used by tests and by `orbital_test_utils`).
    pub async fn from_pool(pool: DbPool) -> Result<Self> {
        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}
