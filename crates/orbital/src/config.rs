//! CLI/env configuration surface for the `orbital` daemon (§6 Configuration
//! table), following the teacher CLI's own `clap::Parser` derive usage: every
//! tunable is both a flag and an environment variable via clap's `env`
//! feature.

use std::time::Duration;

use clap::Parser;
use orbital_dispatcher::DispatcherConfig;
use orbital_index::IndexConfig;

#[derive(Debug, Parser)]
#[command(name = "orbital", about = "Scheduling and dispatch engine for periodic planet jobs")]
pub struct CliArgs {
    /// SQLite database path, or `:memory:` for an ephemeral store.
    #[arg(long, env = "ORBITAL_DB_PATH", default_value = "orbital.db")]
    pub db_path: String,

    /// Address the session registry's WebSocket server binds to.
    #[arg(long, env = "ORBITAL_BIND_ADDR", default_value = "0.0.0.0:7800")]
    pub bind_addr: String,

    /// L1 tick period, in seconds.
    #[arg(long, env = "TICK", default_value_t = 2.0)]
    pub tick: f64,

    /// L3 liveness sweep period, in seconds.
    #[arg(long, env = "HEARTBEAT_SWEEP", default_value_t = 5.0)]
    pub heartbeat_sweep: f64,

    /// Heartbeat age past which a worker is considered dead, in seconds.
    #[arg(long, env = "HEARTBEAT_TIMEOUT", default_value_t = 30.0)]
    pub heartbeat_timeout: f64,

    /// Per-tick due-planet limit (also the reconciler's and error-sweep's row limit).
    #[arg(long, env = "BATCH", default_value_t = 20)]
    pub batch: i64,

    /// Scheduling index (Redis) host.
    #[arg(long, env = "SI_HOST", default_value = "localhost")]
    pub si_host: String,

    /// Scheduling index (Redis) port.
    #[arg(long, env = "SI_PORT", default_value_t = 6379)]
    pub si_port: u16,

    /// Scheduling index (Redis) logical database index.
    #[arg(long, env = "SI_DB", default_value_t = 0)]
    pub si_db: i64,

    /// Scheduling index call timeout, in seconds.
    #[arg(long, env = "SI_TIMEOUT", default_value_t = 2.0)]
    pub si_timeout: f64,

    /// Mirror the file log filter to stderr instead of defaulting stderr to `warn`.
    #[arg(long)]
    pub verbose: bool,
}

impl CliArgs {
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            tick: Duration::from_secs_f64(self.tick),
            heartbeat_sweep: Duration::from_secs_f64(self.heartbeat_sweep),
            heartbeat_timeout: Duration::from_secs_f64(self.heartbeat_timeout),
            batch: self.batch,
        }
    }

    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            host: self.si_host.clone(),
            port: self.si_port,
            db: self.si_db,
            timeout: Duration::from_secs_f64(self.si_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_only_required_worker_id_equivalent_defaults() {
        let args = CliArgs::parse_from(["orbital"]);
        assert_eq!(args.db_path, "orbital.db");
        assert_eq!(args.bind_addr, "0.0.0.0:7800");
        assert_eq!(args.batch, 20);
    }

    #[test]
    fn cli_flags_override_defaults_and_map_into_typed_configs() {
        let args = CliArgs::parse_from([
            "orbital",
            "--tick",
            "1.5",
            "--si-host",
            "redis.internal",
            "--si-port",
            "6390",
            "--batch",
            "50",
        ]);
        let dispatcher = args.dispatcher_config();
        assert_eq!(dispatcher.tick, Duration::from_secs_f64(1.5));
        assert_eq!(dispatcher.batch, 50);

        let index = args.index_config();
        assert_eq!(index.host, "redis.internal");
        assert_eq!(index.port, 6390);
    }
}
