//! Pluggable job execution. The reference worker has no real payload to
//! run — actual job bodies are outside this system's scope (§1 Non-goals) —
//! so this trait is the seam tests and the demo binary plug a stand-in into,
//! mirroring how the teacher separates socket handling from job execution.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// The result of running one assigned job.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed {
        next_run_time: DateTime<Utc>,
        season: Option<i64>,
        round: Option<i64>,
        round_number: Option<i64>,
    },
    Failed {
        reason: String,
    },
}

/// Executes one job for a planet. Implementations run on a blocking thread
/// (`spawn_blocking`), so they may sleep or block freely; they must not
/// depend on being on the Tokio reactor.
pub trait JobHandler: Send + Sync + 'static {
    fn execute(&self, planet_id: &str, season: i64, round: i64) -> JobOutcome;
}

/// A job handler that sleeps for a fixed duration and always reports
/// success, scheduling the next run `next_run_interval` later. Good enough
/// to drive the dispatcher's full assign -> complete -> reschedule cycle in
/// integration tests and as a runnable example.
pub struct SimulatedJobHandler {
    pub work_duration: Duration,
    pub next_run_interval: Duration,
}

impl SimulatedJobHandler {
    pub fn new(work_duration: Duration, next_run_interval: Duration) -> Self {
        Self {
            work_duration,
            next_run_interval,
        }
    }
}

impl JobHandler for SimulatedJobHandler {
    fn execute(&self, _planet_id: &str, _season: i64, _round: i64) -> JobOutcome {
        std::thread::sleep(self.work_duration);
        let next_run_time = Utc::now()
            + chrono::Duration::from_std(self.next_run_interval)
                .unwrap_or_else(|_| chrono::Duration::seconds(60));
        JobOutcome::Completed {
            next_run_time,
            season: None,
            round: None,
            round_number: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_handler_reports_a_future_next_run_time() {
        let handler = SimulatedJobHandler::new(Duration::from_millis(0), Duration::from_secs(30));
        let before = Utc::now();
        let outcome = handler.execute("mars-1", 1, 1);
        match outcome {
            JobOutcome::Completed { next_run_time, .. } => assert!(next_run_time > before),
            JobOutcome::Failed { reason } => panic!("unexpected failure: {reason}"),
        }
    }
}
