//! Reconciler (§4.5): repairs divergence between the durable store
//! (authoritative) and the scheduling index (cache).

use chrono::{DateTime, Utc};
use orbital_protocol::PlanetId;
use tracing::{error, info};

use crate::scheduler::Scheduler;

impl Scheduler {
    /// Called by L1 when `poll_due` returns empty. Runs both reconciler
    /// subtasks and returns the missed-schedule recovery set as the due
    /// list for this tick (§4.5 subtask 1).
    pub(crate) async fn reconcile(&self, now: DateTime<Utc>) -> Vec<PlanetId> {
        let recovered = self.recover_missed_schedules(now).await;
        self.recover_error_planets(now).await;
        recovered
    }

    async fn recover_missed_schedules(&self, now: DateTime<Utc>) -> Vec<PlanetId> {
        let due = match self.db.list_due_queued_planets(now, self.config.batch).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "reconciler: failed to list due queued planets");
                return Vec::new();
            }
        };
        let mut ids = Vec::with_capacity(due.len());
        for planet in &due {
            let id = PlanetId::from_trusted(planet.planet_id.clone());
            self.index.upsert(&id, planet.next_run_time).await;
            ids.push(id);
        }
        if !ids.is_empty() {
            info!(count = ids.len(), "reconciler repopulated scheduling index from durable store");
        }
        ids
    }

    /// Error-state recovery (§4.5 subtask 2, also run standalone as L3's
    /// belt-and-braces self-heal). ERROR is never a terminal user-visible
    /// state in this design (§9 Open Question).
    pub(crate) async fn recover_error_planets(&self, now: DateTime<Utc>) {
        let errored = match self.db.list_error_planets(self.config.batch).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "reconciler: failed to list error planets");
                return;
            }
        };
        for planet in &errored {
            let id = PlanetId::from_trusted(planet.planet_id.clone());
            match self.db.requeue_planet_for_recovery(&id, now).await {
                Ok(row) => {
                    self.index.upsert(&id, row.next_run_time).await;
                    info!(planet_id = %id, "swept ERROR planet back to QUEUED");
                }
                Err(e) => error!(planet_id = %id, error = %e, "failed to requeue ERROR planet"),
            }
        }
    }
}
