//! Read-only TaskAttempt queries (§3 TaskAttempt). Attempts are otherwise
//! only ever created, reopened or closed inside the composite transactions
//! in `dispatch.rs`.

use orbital_protocol::PlanetId;

use crate::error::Result;
use crate::types::TaskAttemptRow;
use crate::OrbitalDb;

impl OrbitalDb {
    pub async fn list_attempts_for_planet(&self, planet_id: &PlanetId) -> Result<Vec<TaskAttemptRow>> {
        let rows = sqlx::query_as::<_, TaskAttemptRow>(
            "SELECT * FROM task_attempts WHERE planet_id = ? ORDER BY start_time DESC",
        )
        .bind(planet_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_attempt(&self, id: i64) -> Result<Option<TaskAttemptRow>> {
        let row = sqlx::query_as::<_, TaskAttemptRow>("SELECT * FROM task_attempts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}
