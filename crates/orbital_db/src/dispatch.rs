//! Composite, cross-entity transactions that back the dispatcher's job
//! lifecycle (§4.4, §4.6). Each public function here is exactly one DS
//! transaction: the write-ahead order DS -> SI -> SR (§4.2, §5) requires
//! that these commit before the caller touches the scheduling index or
//! sends anything over the session registry.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use orbital_protocol::{AttemptOutcome, PlanetId, PlanetStatus, WorkerId, WorkerState, MAX_RETRIES};
use sqlx::Row;

use crate::error::Result;
use crate::types::{parse_planet_status, parse_worker_state};
use crate::OrbitalDb;

/// Grace period after exhausting the retry budget (§4.4, COOLDOWN).
pub const COOLDOWN: ChronoDuration = ChronoDuration::seconds(30);

/// The planet handed to a worker, in the shape `assign_job` needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub planet_id: String,
    pub season: i64,
    pub round: i64,
}

/// Result of a successful `job_done` application, carrying what the caller
/// needs to upsert the scheduling index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rescheduled {
    pub planet_id: String,
    pub next_run_time: DateTime<Utc>,
}

impl OrbitalDb {
    /// Attempt to hand `planet_id` to `worker_id` (§4.4 L1 step 4 / L2
    /// `WORKER_READY`).
    ///
    /// Returns `Ok(None)` if the planet is no longer QUEUED (deleted or
    /// already in flight — the caller should remove it from SI and move on)
    /// or if the worker is no longer IDLE (lost the race — the caller
    /// should just skip this worker, per §4.4's double-assignment defense).
    pub async fn assign_planet(
        &self,
        worker_id: &WorkerId,
        planet_id: &PlanetId,
        now: DateTime<Utc>,
    ) -> Result<Option<Assignment>> {
        let mut tx = self.pool.begin().await?;

        let planet_row = sqlx::query("SELECT status, season, round, retry_count FROM planets WHERE planet_id = ?")
            .bind(planet_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(planet_row) = planet_row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let status: String = planet_row.get("status");
        if parse_planet_status(&status) != PlanetStatus::Queued {
            tx.rollback().await?;
            return Ok(None);
        }

        let worker_row = sqlx::query("SELECT state FROM workers WHERE worker_id = ?")
            .bind(worker_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(worker_row) = worker_row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let worker_state: String = worker_row.get("state");
        if parse_worker_state(&worker_state) != WorkerState::Idle {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            "UPDATE workers SET state = 'busy', current_job = ?, assigned = assigned + 1 WHERE worker_id = ?",
        )
        .bind(planet_id.as_str())
        .bind(worker_id.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE planets SET status = 'processing', processing_worker = ? WHERE planet_id = ?")
            .bind(worker_id.as_str())
            .bind(planet_id.as_str())
            .execute(&mut *tx)
            .await?;

        let retry_count: i64 = planet_row.get("retry_count");
        if retry_count > 0 {
            // Retry-reuse rule (§3): reopen the most recent FAILED attempt
            // rather than growing the history unboundedly under retry storms.
            sqlx::query(
                r#"UPDATE task_attempts SET
                       worker_id = ?, start_time = ?, end_time = NULL, outcome = 'started', error_detail = NULL
                   WHERE id = (
                       SELECT id FROM task_attempts
                       WHERE planet_id = ? AND outcome = 'failed'
                       ORDER BY start_time DESC LIMIT 1
                   )"#,
            )
            .bind(worker_id.as_str())
            .bind(now)
            .bind(planet_id.as_str())
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                "INSERT INTO task_attempts (planet_id, worker_id, start_time, outcome) VALUES (?, ?, ?, 'started')",
            )
            .bind(planet_id.as_str())
            .bind(worker_id.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let season: i64 = planet_row.get("season");
        let round: i64 = planet_row.get("round");

        tx.commit().await?;

        Ok(Some(Assignment {
            planet_id: planet_id.as_str().to_string(),
            season,
            round,
        }))
    }

    /// Apply a `job_done` event (§4.4 L2 `JOB_COMPLETED`).
    ///
    /// No-ops (`Ok(None)`) if the planet is not currently PROCESSING by this
    /// worker — this is the guard that makes replaying `job_done` idempotent.
    pub async fn complete_job(
        &self,
        worker_id: &WorkerId,
        planet_id: &PlanetId,
        next_run_time: DateTime<Utc>,
        season: Option<i64>,
        round: Option<i64>,
        round_number: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Option<Rescheduled>> {
        let mut tx = self.pool.begin().await?;

        if !planet_is_processing_by(&mut tx, planet_id, worker_id).await? {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            "UPDATE workers SET state = 'idle', current_job = NULL, completed = completed + 1 WHERE worker_id = ?",
        )
        .bind(worker_id.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"UPDATE planets SET
                   status = 'queued',
                   processing_worker = NULL,
                   retry_count = 0,
                   last_processed = ?,
                   next_run_time = ?,
                   season = COALESCE(?, season),
                   round = COALESCE(?, round + 1),
                   round_number = COALESCE(?, round_number)
               WHERE planet_id = ?"#,
        )
        .bind(now)
        .bind(next_run_time)
        .bind(season)
        .bind(round)
        .bind(round_number)
        .bind(planet_id.as_str())
        .execute(&mut *tx)
        .await?;

        close_open_attempt(&mut tx, planet_id, AttemptOutcome::Completed, now, None).await?;

        tx.commit().await?;

        Ok(Some(Rescheduled {
            planet_id: planet_id.as_str().to_string(),
            next_run_time,
        }))
    }

    /// Apply an `error` event (§4.4 L2 `JOB_FAILED`).
    pub async fn fail_job(
        &self,
        worker_id: &WorkerId,
        planet_id: &PlanetId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Rescheduled>> {
        let mut tx = self.pool.begin().await?;

        if !planet_is_processing_by(&mut tx, planet_id, worker_id).await? {
            tx.rollback().await?;
            return Ok(None);
        }

        let retry_count: i64 = sqlx::query("SELECT retry_count FROM planets WHERE planet_id = ?")
            .bind(planet_id.as_str())
            .fetch_one(&mut *tx)
            .await?
            .get("retry_count");
        let k = retry_count + 1;

        let detail = format!("[retry {k}/{MAX_RETRIES}] {reason}");
        close_open_attempt(&mut tx, planet_id, AttemptOutcome::Failed, now, Some(&detail)).await?;

        sqlx::query(
            "UPDATE workers SET state = 'idle', current_job = NULL, failed = failed + 1 WHERE worker_id = ?",
        )
        .bind(worker_id.as_str())
        .execute(&mut *tx)
        .await?;

        let next_run_time = if k < i64::from(MAX_RETRIES) {
            now
        } else {
            now + COOLDOWN
        };
        let new_retry_count = if k < i64::from(MAX_RETRIES) { k } else { 0 };

        sqlx::query(
            r#"UPDATE planets SET
                   status = 'queued',
                   processing_worker = NULL,
                   retry_count = ?,
                   next_run_time = ?
               WHERE planet_id = ?"#,
        )
        .bind(new_retry_count)
        .bind(next_run_time)
        .bind(planet_id.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(Rescheduled {
            planet_id: planet_id.as_str().to_string(),
            next_run_time,
        }))
    }

    /// Recover a worker's orphaned job, if it has one (§4.6 `recover`).
    ///
    /// Returns `Ok(None)` if the worker is unknown or already has no
    /// current job — repeated calls after the first are no-ops, as required
    /// by §8's idempotence laws.
    pub async fn recover_worker(
        &self,
        worker_id: &WorkerId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Rescheduled>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT current_job FROM workers WHERE worker_id = ?")
            .bind(worker_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let current_job: Option<String> = row.get("current_job");

        let Some(planet_id) = current_job else {
            sqlx::query(
                "UPDATE workers SET state = 'offline', disconnected_at = ? WHERE worker_id = ?",
            )
            .bind(now)
            .bind(worker_id.as_str())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(None);
        };

        let next_run_time: DateTime<Utc> =
            sqlx::query("SELECT next_run_time FROM planets WHERE planet_id = ?")
                .bind(&planet_id)
                .fetch_one(&mut *tx)
                .await?
                .get("next_run_time");

        sqlx::query(
            "UPDATE planets SET status = 'queued', processing_worker = NULL WHERE planet_id = ?",
        )
        .bind(&planet_id)
        .execute(&mut *tx)
        .await?;

        let planet_for_close = PlanetId::from_trusted(planet_id.clone());
        close_open_attempt(&mut tx, &planet_for_close, AttemptOutcome::Timeout, now, Some(reason)).await?;

        sqlx::query(
            "UPDATE workers SET state = 'offline', current_job = NULL, disconnected_at = ? WHERE worker_id = ?",
        )
        .bind(now)
        .bind(worker_id.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(Rescheduled {
            planet_id,
            next_run_time,
        }))
    }
}

async fn planet_is_processing_by(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    planet_id: &PlanetId,
    worker_id: &WorkerId,
) -> Result<bool> {
    let row = sqlx::query("SELECT status, processing_worker FROM planets WHERE planet_id = ?")
        .bind(planet_id.as_str())
        .fetch_optional(&mut **tx)
        .await?;
    let Some(row) = row else {
        return Ok(false);
    };
    let status: String = row.get("status");
    let processing_worker: Option<String> = row.get("processing_worker");
    Ok(parse_planet_status(&status) == PlanetStatus::Processing
        && processing_worker.as_deref() == Some(worker_id.as_str()))
}

/// Close the single open (STARTED) attempt for a planet (I5, §4.6 step 2).
async fn close_open_attempt(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    planet_id: &PlanetId,
    outcome: AttemptOutcome,
    now: DateTime<Utc>,
    error_detail: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE task_attempts SET end_time = ?, outcome = ?, error_detail = ?
           WHERE id = (
               SELECT id FROM task_attempts
               WHERE planet_id = ? AND outcome = 'started'
               ORDER BY start_time DESC LIMIT 1
           )"#,
    )
    .bind(now)
    .bind(outcome.as_str())
    .bind(error_detail)
    .bind(planet_id.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use chrono::Duration;

    async fn setup() -> (OrbitalDb, WorkerId, PlanetId) {
        let db = OrbitalDb::connect(DbConfig::sqlite_memory()).await.unwrap();
        let worker_id = WorkerId::new("w1").unwrap();
        let planet_id = PlanetId::new("mars-1").unwrap();
        let now = Utc::now();
        db.open_worker_session(&worker_id, None, now).await.unwrap();
        db.create_planet(&planet_id, now, 1).await.unwrap();
        (db, worker_id, planet_id)
    }

    #[tokio::test]
    async fn happy_path_assign_complete_cycle() {
        let (db, worker_id, planet_id) = setup().await;
        let now = Utc::now();

        let assignment = db.assign_planet(&worker_id, &planet_id, now).await.unwrap().unwrap();
        assert_eq!(assignment.planet_id, "mars-1");

        let worker = db.get_worker(&worker_id).await.unwrap().unwrap();
        assert_eq!(worker.state, "busy");
        assert_eq!(worker.current_job.as_deref(), Some("mars-1"));
        assert_eq!(worker.assigned, 1);

        let planet = db.get_planet(&planet_id).await.unwrap().unwrap();
        assert_eq!(planet.status(), PlanetStatus::Processing);
        assert_eq!(planet.processing_worker.as_deref(), Some("w1"));

        let attempts = db.list_attempts_for_planet(&planet_id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].outcome(), AttemptOutcome::Started);

        let next_ts = now + Duration::seconds(3600);
        let rescheduled = db
            .complete_job(&worker_id, &planet_id, next_ts, None, None, None, now + Duration::seconds(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rescheduled.next_run_time, next_ts);

        let worker = db.get_worker(&worker_id).await.unwrap().unwrap();
        assert_eq!(worker.state, "idle");
        assert_eq!(worker.current_job, None);
        assert_eq!(worker.completed, 1);

        let planet = db.get_planet(&planet_id).await.unwrap().unwrap();
        assert_eq!(planet.status(), PlanetStatus::Queued);
        assert_eq!(planet.round, 1); // incremented, no round supplied

        let attempts = db.list_attempts_for_planet(&planet_id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].outcome(), AttemptOutcome::Completed);
    }

    #[tokio::test]
    async fn replaying_job_done_is_a_noop() {
        let (db, worker_id, planet_id) = setup().await;
        let now = Utc::now();
        db.assign_planet(&worker_id, &planet_id, now).await.unwrap();
        let next_ts = now + Duration::seconds(60);
        let first = db
            .complete_job(&worker_id, &planet_id, next_ts, None, None, None, now)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = db
            .complete_job(&worker_id, &planet_id, next_ts + Duration::seconds(1), None, None, None, now)
            .await
            .unwrap();
        assert!(second.is_none());

        let planet = db.get_planet(&planet_id).await.unwrap().unwrap();
        assert_eq!(planet.next_run_time, next_ts); // untouched by the replay
    }

    #[tokio::test]
    async fn retry_below_threshold_reopens_same_attempt_row() {
        let (db, worker_id, planet_id) = setup().await;
        let now = Utc::now();
        db.assign_planet(&worker_id, &planet_id, now).await.unwrap();

        let rescheduled = db
            .fail_job(&worker_id, &planet_id, "boom", now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rescheduled.next_run_time, now);

        let planet = db.get_planet(&planet_id).await.unwrap().unwrap();
        assert_eq!(planet.retry_count, 1);
        assert_eq!(planet.status(), PlanetStatus::Queued);

        let attempts = db.list_attempts_for_planet(&planet_id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].outcome(), AttemptOutcome::Failed);
        assert_eq!(attempts[0].error_detail.as_deref(), Some("[retry 1/5] boom"));
        let first_attempt_id = attempts[0].id;

        // Second assignment reopens the same row (load-bearing for I5).
        db.assign_planet(&worker_id, &planet_id, now).await.unwrap();
        let attempts = db.list_attempts_for_planet(&planet_id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].id, first_attempt_id);
        assert_eq!(attempts[0].outcome(), AttemptOutcome::Started);
    }

    #[tokio::test]
    async fn fifth_failure_triggers_cooldown_not_fourth() {
        let (db, worker_id, planet_id) = setup().await;
        let mut now = Utc::now();

        for i in 1..=4 {
            db.assign_planet(&worker_id, &planet_id, now).await.unwrap();
            let rescheduled = db.fail_job(&worker_id, &planet_id, "boom", now).await.unwrap().unwrap();
            assert_eq!(rescheduled.next_run_time, now, "retry {i} should be immediate");
            now += Duration::seconds(1);
        }

        db.assign_planet(&worker_id, &planet_id, now).await.unwrap();
        let rescheduled = db.fail_job(&worker_id, &planet_id, "boom", now).await.unwrap().unwrap();
        assert_eq!(rescheduled.next_run_time, now + COOLDOWN);

        let planet = db.get_planet(&planet_id).await.unwrap().unwrap();
        assert_eq!(planet.retry_count, 0);
    }

    #[tokio::test]
    async fn recover_worker_is_idempotent() {
        let (db, worker_id, planet_id) = setup().await;
        let now = Utc::now();
        db.assign_planet(&worker_id, &planet_id, now).await.unwrap();

        let first = db.recover_worker(&worker_id, "crash", now).await.unwrap();
        assert!(first.is_some());

        let planet = db.get_planet(&planet_id).await.unwrap().unwrap();
        assert_eq!(planet.status(), PlanetStatus::Queued);
        assert_eq!(planet.processing_worker, None);
        let worker = db.get_worker(&worker_id).await.unwrap().unwrap();
        assert_eq!(worker.state, "offline");
        assert_eq!(worker.current_job, None);

        let attempts = db.list_attempts_for_planet(&planet_id).await.unwrap();
        assert_eq!(attempts[0].outcome(), AttemptOutcome::Timeout);

        let second = db.recover_worker(&worker_id, "crash again", now).await.unwrap();
        assert!(second.is_none());
    }
}
