//! Worker CRUD and session-lifecycle operations (§3 Worker, §4.3 Open/Close).

use chrono::{DateTime, Utc};
use orbital_protocol::{Telemetry, WorkerId, WorkerState};

use crate::error::Result;
use crate::types::WorkerRow;
use crate::OrbitalDb;

impl OrbitalDb {
    /// Upsert a worker on session open: state -> IDLE, `last_heartbeat` ->
    /// now, `disconnected_at` -> null, `connected_at` preserved if the
    /// worker already exists, else set to now (§4.3 Open).
    pub async fn open_worker_session(
        &self,
        worker_id: &WorkerId,
        address: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WorkerRow> {
        sqlx::query(
            r#"INSERT INTO workers (worker_id, address, state, last_heartbeat, connected_at, disconnected_at)
               VALUES (?, ?, 'idle', ?, ?, NULL)
               ON CONFLICT(worker_id) DO UPDATE SET
                   address = COALESCE(excluded.address, workers.address),
                   state = 'idle',
                   last_heartbeat = excluded.last_heartbeat,
                   disconnected_at = NULL"#,
        )
        .bind(worker_id.as_str())
        .bind(address)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_worker(worker_id).await.map(|w| w.expect("just upserted"))
    }

    pub async fn get_worker(&self, worker_id: &WorkerId) -> Result<Option<WorkerRow>> {
        let row = sqlx::query_as::<_, WorkerRow>("SELECT * FROM workers WHERE worker_id = ?")
            .bind(worker_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Update heartbeat timestamp and any present telemetry fields (§4.3 `heartbeat`).
    pub async fn record_heartbeat(
        &self,
        worker_id: &WorkerId,
        now: DateTime<Utc>,
        telemetry: &Telemetry,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE workers SET
                   last_heartbeat = ?,
                   idle_cpu = COALESCE(?, idle_cpu),
                   idle_ram = COALESCE(?, idle_ram),
                   peak_cpu = COALESCE(?, peak_cpu),
                   peak_ram = COALESCE(?, peak_ram),
                   disk = COALESCE(?, disk)
               WHERE worker_id = ?"#,
        )
        .bind(now)
        .bind(telemetry.idle_cpu)
        .bind(telemetry.idle_ram)
        .bind(telemetry.peak_cpu)
        .bind(telemetry.peak_ram)
        .bind(telemetry.disk)
        .bind(worker_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Set worker state directly, used by `status_update` (§4.3) for the
    /// idle/busy self-report. Does not touch `current_job`.
    pub async fn set_worker_state(&self, worker_id: &WorkerId, state: WorkerState) -> Result<()> {
        sqlx::query("UPDATE workers SET state = ? WHERE worker_id = ?")
            .bind(state.as_str())
            .bind(worker_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// IDLE workers ordered by `completed` ascending (least-loaded first),
    /// then `worker_id` for determinism (§4.4 L1 step 3).
    pub async fn list_idle_workers(&self, limit: i64) -> Result<Vec<WorkerRow>> {
        let rows = sqlx::query_as::<_, WorkerRow>(
            "SELECT * FROM workers WHERE state = 'idle' ORDER BY completed ASC, worker_id ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Workers in {IDLE, BUSY} whose heartbeat is older than `cutoff`
    /// (§4.4 L3 liveness sweeper).
    pub async fn list_stale_workers(&self, cutoff: DateTime<Utc>) -> Result<Vec<WorkerRow>> {
        let rows = sqlx::query_as::<_, WorkerRow>(
            r#"SELECT * FROM workers
               WHERE state IN ('idle', 'busy')
                 AND (last_heartbeat IS NULL OR last_heartbeat < ?)"#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Every worker not already OFFLINE, for startup reconciliation (§4.7).
    pub async fn list_non_offline_workers(&self) -> Result<Vec<WorkerRow>> {
        let rows = sqlx::query_as::<_, WorkerRow>("SELECT * FROM workers WHERE state != 'offline'")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
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
    async fn open_session_creates_idle_worker_and_preserves_connected_at() {
        let db = test_db().await;
        let id = WorkerId::new("w1").unwrap();
        let t0 = Utc::now();
        let w = db.open_worker_session(&id, Some("10.0.0.1"), t0).await.unwrap();
        assert_eq!(w.state, "idle");
        let connected_first = w.connected_at.unwrap();

        let t1 = t0 + chrono::Duration::seconds(60);
        let w2 = db.open_worker_session(&id, None, t1).await.unwrap();
        assert_eq!(w2.connected_at.unwrap(), connected_first);
        assert_eq!(w2.disconnected_at, None);
        assert_eq!(w2.address.as_deref(), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn list_idle_workers_orders_by_completed_then_id() {
        let db = test_db().await;
        let now = Utc::now();
        for (id, completed) in [("b", 3i64), ("a", 3), ("c", 1)] {
            let wid = WorkerId::new(id).unwrap();
            db.open_worker_session(&wid, None, now).await.unwrap();
            sqlx::query("UPDATE workers SET completed = ? WHERE worker_id = ?")
                .bind(completed)
                .bind(id)
                .execute(db.pool())
                .await
                .unwrap();
        }
        let idle = db.list_idle_workers(10).await.unwrap();
        let ids: Vec<_> = idle.iter().map(|w| w.worker_id.clone()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
