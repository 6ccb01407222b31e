//! L2 event loop (§4.4): reacts to `SessionRegistry` events immediately, so
//! assignment latency for a freshly-idle worker is far below one tick.

use std::sync::Arc;

use chrono::Utc;
use orbital_protocol::{PlanetId, PlanetStatus, WorkerId, WorkerState};
use orbital_session::SessionEvent;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::scheduler::Scheduler;
use crate::tick::AssignAttempt;

pub(crate) async fn run_event_loop(scheduler: Arc<Scheduler>, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    // Inbound events for a single worker arrive in order already (the
    // session task that produced them awaits each frame before the next);
    // processing them one at a time here preserves that order (§4.3, §5).
    while let Some(event) = events.recv().await {
        scheduler.handle_event(event).await;
    }
}

impl Scheduler {
    pub async fn handle_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::WorkerReady(worker_id) => self.handle_worker_ready(&worker_id).await,
            SessionEvent::Heartbeat { worker_id, telemetry } => {
                if let Err(e) = self.db.record_heartbeat(&worker_id, Utc::now(), &telemetry).await {
                    warn!(%worker_id, error = %e, "failed to record heartbeat");
                }
            }
            SessionEvent::StatusUpdate { worker_id, status } => {
                let state = match status {
                    orbital_protocol::ReportedStatus::Idle => WorkerState::Idle,
                    orbital_protocol::ReportedStatus::Busy => WorkerState::Busy,
                };
                if let Err(e) = self.db.set_worker_state(&worker_id, state).await {
                    warn!(%worker_id, error = %e, "failed to apply status_update");
                    return;
                }
                if state == WorkerState::Idle {
                    self.handle_worker_ready(&worker_id).await;
                }
            }
            SessionEvent::JobCompleted {
                worker_id,
                planet_id,
                next_run_time,
                season,
                round,
                round_number,
            } => {
                let now = Utc::now();
                let next_run_time = if next_run_time < now {
                    warn!(%worker_id, %planet_id, "job_done reported next_run_time in the past, clamping to now");
                    now
                } else {
                    next_run_time
                };
                match self
                    .db
                    .complete_job(&worker_id, &planet_id, next_run_time, season, round, round_number, now)
                    .await
                {
                    Ok(Some(rescheduled)) => {
                        let id = PlanetId::from_trusted(rescheduled.planet_id);
                        self.index.upsert(&id, rescheduled.next_run_time).await;
                    }
                    Ok(None) => {
                        // Replay guard: planet wasn't PROCESSING by this
                        // worker (already completed, or worker mismatch) —
                        // a no-op against DS, per §8's idempotence law.
                    }
                    Err(e) => error!(%worker_id, %planet_id, error = %e, "complete_job failed"),
                }
            }
            SessionEvent::JobFailed {
                worker_id,
                planet_id,
                reason,
            } => {
                let now = Utc::now();
                match self.db.fail_job(&worker_id, &planet_id, &reason, now).await {
                    Ok(Some(rescheduled)) => {
                        let id = PlanetId::from_trusted(rescheduled.planet_id);
                        self.index.upsert(&id, rescheduled.next_run_time).await;
                    }
                    Ok(None) => {}
                    Err(e) => error!(%worker_id, %planet_id, error = %e, "fail_job failed"),
                }
            }
            SessionEvent::WorkerLost { worker_id, reason } => {
                self.recover(&worker_id, &reason).await;
            }
        }
    }

    /// §4.4 L2 `WORKER_READY`: run the matching procedure restricted to one
    /// worker. Pulls at most one due planet (from SI, reconciling on miss)
    /// and tries to assign it to `worker_id`.
    async fn handle_worker_ready(&self, worker_id: &WorkerId) {
        let worker = match self.db.get_worker(worker_id).await {
            Ok(Some(w)) => w,
            Ok(None) => {
                warn!(%worker_id, "WORKER_READY for unknown worker, dropping event");
                return;
            }
            Err(e) => {
                error!(%worker_id, error = %e, "failed to load worker for WORKER_READY");
                return;
            }
        };
        if worker.state() != WorkerState::Idle {
            return; // already claimed by a concurrent assignment; nothing to do
        }

        let now = Utc::now();
        let mut due = self.index.poll_due(now, 1).await;
        if due.is_empty() {
            due = self.reconcile(now).await;
        }
        let Some(planet_id) = due.into_iter().next() else {
            return;
        };

        match self.attempt_assignment(worker_id, &planet_id, now).await {
            AssignAttempt::Assigned => {}
            AssignAttempt::WorkerUnavailable => {
                // Lost the race (or the planet slipped out of QUEUED between
                // poll and assign); if it's still due, put it back in SI
                // under its real scheduled time for the next tick/ready.
                if let Ok(Some(planet)) = self.db.get_planet(&planet_id).await {
                    if planet.status() == PlanetStatus::Queued {
                        self.index.upsert(&planet_id, planet.next_run_time).await;
                    }
                }
            }
        }
    }
}
