//! Exercises the same wiring `main` performs — CLI args mapped into typed
//! configs, then DS/SI/SR/Dispatcher assembled into a `Scheduler` — without
//! going through the process entry point or a real socket.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use orbital::CliArgs;
use orbital_db::{DbConfig, OrbitalDb};
use orbital_dispatcher::Scheduler;
use orbital_index::{IndexConfig, SchedulingIndex};
use orbital_protocol::OutboundMessage;
use orbital_session::SessionRegistry;
use orbital_test_utils::{PlanetBuilder, WorkerBuilder};
use tokio::sync::mpsc;

#[tokio::test]
async fn cli_defaults_wire_into_a_working_scheduler() {
    let args = CliArgs::parse_from(["orbital"]);

    let db = Arc::new(OrbitalDb::connect(DbConfig::sqlite_memory()).await.unwrap());
    // Point SI at an address nothing listens on instead of the CLI default
    // (localhost:6379) so the test never depends on a live Redis.
    let index = Arc::new(SchedulingIndex::new(IndexConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        ..args.index_config()
    }));
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let registry = SessionRegistry::new(db.clone(), events_tx);

    let planet_id = PlanetBuilder::new("mars-1").insert(&db).await;
    let worker_id = WorkerBuilder::new("w1").insert(&db).await;
    let mut outbound = registry.connect_for_test(worker_id.clone()).await;

    let scheduler = Scheduler::new(db, index, registry, args.dispatcher_config());
    scheduler.run_tick_iteration().await;

    let assign = outbound.try_recv().expect("assign_job should have been delivered");
    match assign {
        OutboundMessage::AssignJob { planet_id: pid, .. } => assert_eq!(pid, planet_id.as_str()),
        other => panic!("expected AssignJob, got {other:?}"),
    }
}

#[test]
fn index_timeout_flag_maps_into_a_real_duration() {
    let args = CliArgs::parse_from(["orbital", "--si-timeout", "0.25"]);
    assert_eq!(args.index_config().timeout, Duration::from_millis(250));
}
