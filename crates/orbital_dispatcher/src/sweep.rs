//! L3 liveness sweeper (§4.4): every `HEARTBEAT_SWEEP`, recover workers
//! whose heartbeat has gone stale, and belt-and-braces sweep any ERROR
//! planets back to QUEUED.

use std::sync::Arc;

use chrono::Utc;
use orbital_protocol::WorkerId;
use tracing::error;

use crate::scheduler::Scheduler;

pub(crate) async fn run_sweep_loop(scheduler: Arc<Scheduler>) {
    let mut interval = tokio::time::interval(scheduler.config.heartbeat_sweep);
    loop {
        interval.tick().await;
        scheduler.run_sweep_iteration().await;
    }
}

impl Scheduler {
    pub async fn run_sweep_iteration(&self) {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::from_std(self.config.heartbeat_timeout).unwrap_or(chrono::Duration::seconds(30));

        let stale = match self.db.list_stale_workers(cutoff).await {
            Ok(workers) => workers,
            Err(e) => {
                error!(error = %e, "sweep: failed to list stale workers");
                return;
            }
        };
        for worker in stale {
            let Ok(worker_id) = WorkerId::new(worker.worker_id) else {
                continue;
            };
            self.recover(&worker_id, "heartbeat timeout").await;
        }

        // Belt-and-braces self-heal (§4.4 L3): ERROR should normally be
        // empty; if anything lands there, requeue it immediately.
        self.recover_error_planets(now).await;
    }
}
