//! The `Scheduler`: the explicit, constructed-once value that threads
//! `OrbitalDb`, `SchedulingIndex` and `SessionRegistry` through L1/L2/L3
//! (§9 Design Notes — no module-level mutable state).

use std::sync::Arc;

use chrono::Utc;
use orbital_db::OrbitalDb;
use orbital_index::SchedulingIndex;
use orbital_protocol::{PlanetId, WorkerId};
use orbital_session::SessionRegistry;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::DispatcherConfig;
use crate::error::Result;
use crate::metrics::TickMetrics;

pub struct Scheduler {
    pub(crate) db: Arc<OrbitalDb>,
    pub(crate) index: Arc<SchedulingIndex>,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) config: DispatcherConfig,
    pub(crate) metrics: TickMetrics,
}

impl Scheduler {
    /// Access the session registry directly, for tests that need to
    /// register a fake worker connection without a real WebSocket
    /// (`SessionRegistry::connect_for_test`). Production code drives events
    /// exclusively through `handle_event`.
    #[doc(hidden)]
    pub fn registry_for_test(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The scheduling index's current entry count, for tests asserting SI
    /// starts empty (e.g. simulating SI loss ahead of a reconciliation run).
    #[doc(hidden)]
    pub async fn index_size_for_test(&self) -> u64 {
        self.index.size().await
    }

    pub fn new(
        db: Arc<OrbitalDb>,
        index: Arc<SchedulingIndex>,
        registry: Arc<SessionRegistry>,
        config: DispatcherConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            index,
            registry,
            config,
            metrics: TickMetrics::default(),
        })
    }

    /// Run startup reconciliation (§4.7), then spawn and run L1/L2/L3 to
    /// completion. `events` is the session registry's inbound event stream;
    /// the caller owns its sending half (threaded through `SessionRegistry`).
    ///
    /// Runs until cancelled (the binary selects this against a shutdown
    /// signal); loop tasks are aborted on drop of the returned handle set,
    /// which happens automatically when this future is dropped.
    pub async fn run(self: Arc<Self>, events: mpsc::UnboundedReceiver<orbital_session::SessionEvent>) -> Result<()> {
        self.startup_reconciliation().await?;

        let tick_handle = tokio::spawn(crate::tick::run_tick_loop(Arc::clone(&self)));
        let sweep_handle = tokio::spawn(crate::sweep::run_sweep_loop(Arc::clone(&self)));
        let event_handle = tokio::spawn(crate::event::run_event_loop(Arc::clone(&self), events));

        let _ = tokio::join!(tick_handle, sweep_handle, event_handle);
        Ok(())
    }

    /// §4.7: before L1/L2/L3 begin, recover every worker not already
    /// OFFLINE with reason "process restart". Logs a single summary line,
    /// supplemented from `startup.py` in the original source.
    async fn startup_reconciliation(&self) -> Result<()> {
        let workers = self.db.list_non_offline_workers().await?;
        let mut recovered = 0usize;
        for worker in &workers {
            let worker_id = WorkerId::new(worker.worker_id.clone()).expect("persisted worker_id is valid");
            if self.recover(&worker_id, "process restart").await {
                recovered += 1;
            }
        }
        info!(
            candidates = workers.len(),
            recovered, "startup reconciliation complete"
        );
        Ok(())
    }

    /// The single reusable orphan-recovery procedure (§4.6). Used by
    /// session close, the liveness sweep, startup, and failed delivery.
    /// Idempotent: a worker with no current job (or already OFFLINE) is a
    /// no-op beyond marking it OFFLINE, matching §8's round-trip law.
    pub async fn recover(&self, worker_id: &WorkerId, reason: &str) -> bool {
        let now = Utc::now();
        match self.db.recover_worker(worker_id, reason, now).await {
            Ok(Some(rescheduled)) => {
                let planet_id = PlanetId::from_trusted(rescheduled.planet_id);
                self.index.upsert(&planet_id, rescheduled.next_run_time).await;
                info!(%worker_id, %planet_id, reason, "recovered orphaned job");
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(%worker_id, reason, error = %e, "recover_worker failed, worker state may be stale until the next sweep");
                false
            }
        }
    }
}
