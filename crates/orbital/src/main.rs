//! The `orbital` daemon: loads configuration, initializes logging, wires
//! the durable store, scheduling index, session registry and dispatcher
//! together, and runs them until an OS signal asks it to stop (§2, §9).

use std::sync::Arc;

use clap::Parser;
use orbital::CliArgs;
use orbital_db::{DbConfig, OrbitalDb};
use orbital_dispatcher::Scheduler;
use orbital_index::SchedulingIndex;
use orbital_logging::{init_logging, LogConfig};
use orbital_session::{server::router, SessionRegistry};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(LogConfig {
        app_name: "orbital",
        verbose: args.verbose,
    })?;

    let db_config = if args.db_path == ":memory:" {
        DbConfig::sqlite_memory()
    } else {
        DbConfig::sqlite(&args.db_path)
    };
    let db = Arc::new(OrbitalDb::connect(db_config).await?);
    let index = Arc::new(SchedulingIndex::new(args.index_config()));

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let registry = SessionRegistry::new(Arc::clone(&db), events_tx);

    let listener = TcpListener::bind(&args.bind_addr).await?;
    info!(addr = %args.bind_addr, "session registry listening");
    let app = router(Arc::clone(&registry));

    let scheduler = Scheduler::new(db, index, registry, args.dispatcher_config());

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        result = scheduler.run(events_rx) => {
            result?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, stopping");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
