//! Row types for the three durable-store entities (§3).

use chrono::{DateTime, Utc};
use orbital_protocol::{AttemptOutcome, PlanetStatus, WorkerState};
use serde::Serialize;

/// A connected-or-previously-connected worker.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct WorkerRow {
    pub worker_id: String,
    pub address: Option<String>,
    pub state: String,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub idle_cpu: Option<f64>,
    pub idle_ram: Option<f64>,
    pub peak_cpu: Option<f64>,
    pub peak_ram: Option<f64>,
    pub disk: Option<f64>,
    pub current_job: Option<String>,
    pub assigned: i64,
    pub completed: i64,
    pub failed: i64,
    pub connected_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
}

impl WorkerRow {
    pub fn state(&self) -> WorkerState {
        parse_worker_state(&self.state)
    }
}

pub fn parse_worker_state(raw: &str) -> WorkerState {
    match raw {
        "idle" => WorkerState::Idle,
        "busy" => WorkerState::Busy,
        "unresponsive" => WorkerState::Unresponsive,
        _ => WorkerState::Offline,
    }
}

/// A scheduled work unit.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PlanetRow {
    pub planet_id: String,
    pub next_run_time: DateTime<Utc>,
    pub status: String,
    pub season: i64,
    pub round: i64,
    pub round_number: i64,
    pub last_processed: Option<DateTime<Utc>>,
    pub processing_worker: Option<String>,
    pub retry_count: i64,
}

impl PlanetRow {
    pub fn status(&self) -> PlanetStatus {
        parse_planet_status(&self.status)
    }
}

pub fn parse_planet_status(raw: &str) -> PlanetStatus {
    match raw {
        "processing" => PlanetStatus::Processing,
        "error" => PlanetStatus::Error,
        _ => PlanetStatus::Queued,
    }
}

/// A single attempt to run a planet on a worker.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TaskAttemptRow {
    pub id: i64,
    pub planet_id: String,
    pub worker_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub outcome: String,
    pub error_detail: Option<String>,
}

impl TaskAttemptRow {
    pub fn outcome(&self) -> AttemptOutcome {
        match self.outcome.as_str() {
            "completed" => AttemptOutcome::Completed,
            "failed" => AttemptOutcome::Failed,
            "timeout" => AttemptOutcome::Timeout,
            _ => AttemptOutcome::Started,
        }
    }

    /// Wall-clock duration of the attempt, if it has closed.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}
