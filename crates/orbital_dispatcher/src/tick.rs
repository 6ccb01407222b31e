//! L1 tick loop (§4.4): every `TICK`, match due planets to idle workers.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use orbital_db::types::{PlanetRow, WorkerRow};
use orbital_protocol::{OutboundMessage, PlanetId, PlanetStatus, WorkerId};
use tracing::error;

use crate::scheduler::Scheduler;

/// Fetch at most this many idle workers per tick. Not in the §6
/// Configuration table (the spec leaves the worker-query limit
/// unspecified); generous enough that a real deployment never truncates
/// its idle pool before exhausting the due list.
const WORKER_FETCH_LIMIT: i64 = 256;

pub(crate) async fn run_tick_loop(scheduler: Arc<Scheduler>) {
    let mut interval = tokio::time::interval(scheduler.config.tick);
    loop {
        interval.tick().await;
        scheduler.run_tick_iteration().await;
    }
}

/// Outcome of attempting to hand one planet to one specific worker.
pub(crate) enum AssignAttempt {
    Assigned,
    /// The worker lost the idle race (someone else grabbed it first);
    /// the caller should try the next idle worker for the same planet.
    WorkerUnavailable,
}

impl Scheduler {
    pub async fn run_tick_iteration(&self) {
        let now = Utc::now();

        let mut due = self.index.poll_due(now, self.config.batch).await;
        if due.is_empty() {
            due = self.reconcile(now).await;
        }

        let idle = match self.db.list_idle_workers(WORKER_FETCH_LIMIT).await {
            Ok(workers) => workers,
            Err(e) => {
                error!(error = %e, "tick: failed to list idle workers, aborting this tick");
                return;
            }
        };
        let mut workers: VecDeque<WorkerRow> = idle.into_iter().collect();

        let attempted = due.len() as u64;
        let mut succeeded = 0u64;
        let mut skipped = 0u64;

        for planet_id in due {
            if workers.is_empty() {
                break;
            }

            let planet = match self.db.get_planet(&planet_id).await {
                Ok(p) => p,
                Err(e) => {
                    error!(%planet_id, error = %e, "tick: failed to load planet, aborting this tick");
                    return;
                }
            };
            let Some(planet) = planet else {
                self.index.remove(&planet_id).await;
                skipped += 1;
                continue;
            };
            if planet.status() != PlanetStatus::Queued {
                self.index.remove(&planet_id).await;
                skipped += 1;
                continue;
            }

            match self.try_assign_from_pool(&planet, &mut workers, now).await {
                Some(true) => succeeded += 1,
                Some(false) => skipped += 1,
                None => skipped += 1, // ran out of willing workers for this planet
            }
        }

        self.metrics.record(attempted, succeeded, skipped);
    }

    /// Pop idle workers off `pool` one at a time, trying to assign `planet`
    /// to each, until one accepts or the pool is exhausted. Workers that
    /// lose the idle race are dropped from the pool (they're no longer
    /// idle for any other planet this tick either).
    async fn try_assign_from_pool(
        &self,
        planet: &PlanetRow,
        pool: &mut VecDeque<WorkerRow>,
        now: chrono::DateTime<Utc>,
    ) -> Option<bool> {
        let planet_id = PlanetId::from_trusted(planet.planet_id.clone());
        while let Some(worker) = pool.pop_front() {
            let worker_id = WorkerId::new(worker.worker_id.clone()).ok()?;
            match self.attempt_assignment(&worker_id, &planet_id, now).await {
                AssignAttempt::Assigned => return Some(true),
                AssignAttempt::WorkerUnavailable => continue,
            }
        }
        None
    }

    /// Attempt the atomic DS hand-off, then the SI removal and SR dispatch
    /// (§4.4 L1 step 4, write-ahead order DS -> SI -> SR). Shared with L2's
    /// `WORKER_READY` path, which calls this for a single candidate worker.
    pub(crate) async fn attempt_assignment(
        &self,
        worker_id: &WorkerId,
        planet_id: &PlanetId,
        now: chrono::DateTime<Utc>,
    ) -> AssignAttempt {
        let assignment = match self.db.assign_planet(worker_id, planet_id, now).await {
            Ok(Some(a)) => a,
            Ok(None) => return AssignAttempt::WorkerUnavailable,
            Err(e) => {
                error!(%worker_id, %planet_id, error = %e, "assign_planet failed");
                return AssignAttempt::WorkerUnavailable;
            }
        };

        self.index.remove(planet_id).await;

        let delivered = self
            .registry
            .send(
                worker_id,
                OutboundMessage::AssignJob {
                    planet_id: assignment.planet_id.clone(),
                    season: assignment.season,
                    round: assignment.round,
                },
            )
            .await;

        if !delivered {
            // Outbound delivery failure (§7): the worker isn't actually
            // connected. Treat the just-assigned planet as orphaned via the
            // same compensating path as WORKER_LOST.
            self.recover(worker_id, "assignment delivery failed").await;
            return AssignAttempt::WorkerUnavailable;
        }

        AssignAttempt::Assigned
    }
}
