//! CLI/config surface for the reference worker binary (clap derive, matching
//! `orbital_dispatcher::config`'s style of one flat struct with `env`
//! fallbacks).

use std::time::Duration;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "orbital-worker", about = "Reference worker client for the Orbital dispatcher")]
pub struct CliArgs {
    /// Base URL of the dispatcher's session server, e.g. `ws://127.0.0.1:7800`.
    #[arg(long, env = "ORBITAL_SESSION_URL", default_value = "ws://127.0.0.1:7800")]
    pub session_url: String,

    /// Identifier this worker presents at `/session/<worker_id>`.
    #[arg(long, env = "ORBITAL_WORKER_ID")]
    pub worker_id: String,

    /// Seconds between heartbeat frames.
    #[arg(long, env = "ORBITAL_WORKER_HEARTBEAT_SECS", default_value_t = 10)]
    pub heartbeat_secs: u64,

    /// Seconds a simulated job takes to "run" before reporting job_done.
    #[arg(long, env = "ORBITAL_WORKER_JOB_SECS", default_value_t = 1)]
    pub job_secs: u64,

    /// Seconds to add to now() as the next_run_time reported on job_done.
    #[arg(long, env = "ORBITAL_WORKER_NEXT_RUN_SECS", default_value_t = 60)]
    pub next_run_secs: u64,

    /// Emit verbose (file-filter-matching) logs to stderr as well as file.
    #[arg(long)]
    pub verbose: bool,
}

/// Runtime configuration for `WorkerClient`, decoupled from the CLI parser
/// so tests can construct one directly.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub session_url: String,
    pub worker_id: String,
    pub heartbeat_interval: Duration,
}

impl From<&CliArgs> for WorkerConfig {
    fn from(args: &CliArgs) -> Self {
        Self {
            session_url: args.session_url.clone(),
            worker_id: args.worker_id.clone(),
            heartbeat_interval: Duration::from_secs(args.heartbeat_secs.max(1)),
        }
    }
}

impl WorkerConfig {
    /// The full `/session/<worker_id>` URL to dial.
    pub fn connect_url(&self) -> String {
        format!(
            "{}/session/{}",
            self.session_url.trim_end_matches('/'),
            self.worker_id
        )
    }
}
