use std::time::Duration;

use clap::Parser;
use orbital_logging::{init_logging, LogConfig};
use orbital_worker::{CliArgs, SimulatedJobHandler, WorkerClient, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(LogConfig {
        app_name: "orbital-worker",
        verbose: args.verbose,
    })?;

    let config = WorkerConfig::from(&args);
    let handler = SimulatedJobHandler::new(
        Duration::from_secs(args.job_secs),
        Duration::from_secs(args.next_run_secs),
    );
    let client = WorkerClient::new(config, handler);

    tokio::select! {
        result = client.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "worker session ended with an error");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}
