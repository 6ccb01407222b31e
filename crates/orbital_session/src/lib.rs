//! Session Registry (SR): one logical session per connected worker over a
//! WebSocket at `/session/<worker_id>` (§4.3).
//!
//! This crate owns only transport and translation: parsing inbound frames,
//! replying to heartbeats, and delivering outbound frames to a named
//! worker. It holds no scheduling policy — every inbound frame becomes a
//! [`SessionEvent`] handed to whoever is driving the dispatcher loops, and
//! every outbound frame is sent verbatim to the worker that owns the
//! connection, looked up by `worker_id`.

mod registry;

pub use registry::SessionRegistry;

use orbital_protocol::{PlanetId, ReportedStatus, Telemetry, WorkerId};

/// Events the session registry raises for the dispatcher to act on (§4.3,
/// §4.4). Carries only what was on the wire or observed about the
/// transport — DS/SI mutation is the dispatcher's job.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A worker connected, or self-reported going idle.
    WorkerReady(WorkerId),
    Heartbeat {
        worker_id: WorkerId,
        telemetry: Telemetry,
    },
    StatusUpdate {
        worker_id: WorkerId,
        status: ReportedStatus,
    },
    JobCompleted {
        worker_id: WorkerId,
        planet_id: PlanetId,
        next_run_time: chrono::DateTime<chrono::Utc>,
        season: Option<i64>,
        round: Option<i64>,
        round_number: Option<i64>,
    },
    JobFailed {
        worker_id: WorkerId,
        planet_id: PlanetId,
        reason: String,
    },
    WorkerLost {
        worker_id: WorkerId,
        reason: String,
    },
}

pub mod server {
    //! axum wiring: the `/session/:worker_id` route and its socket handler.
    pub use super::registry::router;
}
