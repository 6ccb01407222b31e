//! Planet CRUD and admission (§3 Planet, §6 admission API contract).

use chrono::{DateTime, Utc};
use orbital_protocol::PlanetId;

use crate::error::{DbError, Result};
use crate::types::PlanetRow;
use crate::OrbitalDb;

/// Raised by `create_planet` when a planet with the same id already exists.
#[derive(Debug)]
pub struct DuplicatePlanet;

impl OrbitalDb {
    /// Admit a new planet. Returns `Err(DbError::Constraint)` if the id is
    /// already taken (maps to the admission API's 409, §6).
    pub async fn create_planet(
        &self,
        planet_id: &PlanetId,
        next_run_time: DateTime<Utc>,
        season: i64,
    ) -> Result<PlanetRow> {
        let existing = self.get_planet(planet_id).await?;
        if existing.is_some() {
            return Err(DbError::Constraint(format!(
                "planet {planet_id} already exists"
            )));
        }

        sqlx::query(
            r#"INSERT INTO planets (planet_id, next_run_time, status, season, round, round_number, retry_count)
               VALUES (?, ?, 'queued', ?, 0, 0, 0)"#,
        )
        .bind(planet_id.as_str())
        .bind(next_run_time)
        .bind(season)
        .execute(&self.pool)
        .await?;

        Ok(self.get_planet(planet_id).await?.expect("just inserted"))
    }

    pub async fn get_planet(&self, planet_id: &PlanetId) -> Result<Option<PlanetRow>> {
        let row = sqlx::query_as::<_, PlanetRow>("SELECT * FROM planets WHERE planet_id = ?")
            .bind(planet_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Delete a planet. Forbidden while PROCESSING (§3, §6 -> 409).
    ///
    /// Callers that also maintain a scheduling index MUST remove the
    /// planet's SI entry before (or immediately after, within the same
    /// logical operation) this call returns — the "pre-deletion hook" of
    /// §4.5 is implemented at the call site that owns both the DS and SI
    /// handles, since the DS layer itself has no dependency on SI.
    pub async fn delete_planet(&self, planet_id: &PlanetId) -> Result<()> {
        let planet = self
            .get_planet(planet_id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("planet {planet_id}")))?;

        if planet.status() == orbital_protocol::PlanetStatus::Processing {
            return Err(DbError::invalid_state(format!(
                "planet {planet_id} is PROCESSING, cannot delete"
            )));
        }

        sqlx::query("DELETE FROM planets WHERE planet_id = ?")
            .bind(planet_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Planets QUEUED with `next_run_time <= now`, ordered by `next_run_time`
    /// (§4.5 missed-schedule recovery).
    pub async fn list_due_queued_planets(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PlanetRow>> {
        let rows = sqlx::query_as::<_, PlanetRow>(
            r#"SELECT * FROM planets
               WHERE status = 'queued' AND next_run_time <= ?
               ORDER BY next_run_time ASC
               LIMIT ?"#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Planets stuck in ERROR status (§4.5 error-state recovery, §4.4 L3
    /// belt-and-braces self-heal).
    pub async fn list_error_planets(&self, limit: i64) -> Result<Vec<PlanetRow>> {
        let rows = sqlx::query_as::<_, PlanetRow>(
            "SELECT * FROM planets WHERE status = 'error' ORDER BY planet_id ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Reset an ERROR (or otherwise stuck) planet back to QUEUED, ready for
    /// immediate reassignment (§4.5 subtask 2, §4.4 L3 self-heal).
    pub async fn requeue_planet_for_recovery(
        &self,
        planet_id: &PlanetId,
        now: DateTime<Utc>,
    ) -> Result<PlanetRow> {
        sqlx::query(
            r#"UPDATE planets SET
                   status = 'queued',
                   retry_count = 0,
                   processing_worker = NULL,
                   next_run_time = ?
               WHERE planet_id = ?"#,
        )
        .bind(now)
        .bind(planet_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(self.get_planet(planet_id).await?.expect("just updated"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;

    async fn test_db() -> OrbitalDb {
        OrbitalDb::connect(DbConfig::sqlite_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn create_planet_rejects_duplicate_id() {
        let db = test_db().await;
        let id = PlanetId::new("mars-1").unwrap();
        db.create_planet(&id, Utc::now(), 1).await.unwrap();
        let err = db.create_planet(&id, Utc::now(), 1).await.unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
    }

    #[tokio::test]
    async fn delete_forbidden_while_processing() {
        let db = test_db().await;
        let id = PlanetId::new("mars-1").unwrap();
        db.create_planet(&id, Utc::now(), 1).await.unwrap();
        sqlx::query("UPDATE planets SET status = 'processing' WHERE planet_id = ?")
            .bind(id.as_str())
            .execute(db.pool())
            .await
            .unwrap();
        let err = db.delete_planet(&id).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidState(_)));
    }
}
