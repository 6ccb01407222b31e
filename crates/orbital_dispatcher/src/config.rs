//! Dispatcher tunables (§6 Configuration: TICK, HEARTBEAT_SWEEP,
//! HEARTBEAT_TIMEOUT, BATCH).

use std::time::Duration;

/// Periods and thresholds for L1/L2/L3. `MAX_RETRIES` and `COOLDOWN` are not
/// included here: they are invariant-bearing constants
/// (`orbital_protocol::MAX_RETRIES`, `orbital_db::dispatch::COOLDOWN`) the
/// durable store enforces directly, not levers a deployment tunes per §8 I3.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// L1 tick period. Default 2s; the periodic-beat deployment mode uses 5s.
    pub tick: Duration,
    /// L3 liveness sweep period.
    pub heartbeat_sweep: Duration,
    /// Heartbeat age past which a worker is considered dead.
    pub heartbeat_timeout: Duration,
    /// Per-tick due-planet limit, also used as the reconciler's and the
    /// error-sweep's row limit.
    pub batch: i64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(2),
            heartbeat_sweep: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(30),
            batch: 20,
        }
    }
}

impl DispatcherConfig {
    /// Load from `TICK`/`HEARTBEAT_SWEEP`/`HEARTBEAT_TIMEOUT`/`BATCH`,
    /// falling back to the documented defaults for anything unset or
    /// unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tick: env_seconds("TICK").unwrap_or(defaults.tick),
            heartbeat_sweep: env_seconds("HEARTBEAT_SWEEP").unwrap_or(defaults.heartbeat_sweep),
            heartbeat_timeout: env_seconds("HEARTBEAT_TIMEOUT").unwrap_or(defaults.heartbeat_timeout),
            batch: std::env::var("BATCH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.batch),
        }
    }
}

fn env_seconds(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .map(Duration::from_secs_f64)
}
