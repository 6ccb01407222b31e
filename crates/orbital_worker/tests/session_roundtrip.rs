//! End-to-end smoke test: a real axum session server plus this crate's own
//! websocket client, proving the two independently-built halves of the
//! wire protocol (§6) actually agree.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use orbital_db::{DbConfig, OrbitalDb};
use orbital_protocol::{OutboundMessage, WorkerId};
use orbital_session::{server::router, SessionEvent, SessionRegistry};
use orbital_worker::{SimulatedJobHandler, WorkerClient, WorkerConfig};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

#[tokio::test]
async fn heartbeat_and_job_round_trip_over_a_real_socket() {
    let db = Arc::new(OrbitalDb::connect(DbConfig::sqlite_memory()).await.unwrap());
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let registry = SessionRegistry::new(db.clone(), events_tx);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let app = router(Arc::clone(&registry));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let config = WorkerConfig {
        session_url: format!("ws://{addr}"),
        worker_id: "w1".to_string(),
        heartbeat_interval: Duration::from_millis(50),
    };
    let handler = SimulatedJobHandler::new(Duration::from_millis(0), Duration::from_secs(30));
    let client = Arc::new(WorkerClient::new(config, handler));
    let client_task = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.run().await }
    });

    let first = timeout(events_rx.recv()).await.unwrap();
    assert!(matches!(first, SessionEvent::WorkerReady(w) if w.as_str() == "w1"));

    let worker = db.get_worker(&WorkerId::new("w1").unwrap()).await.unwrap().unwrap();
    assert_eq!(worker.state, "idle");
    assert!(worker.last_heartbeat.is_some());

    let second = timeout(events_rx.recv()).await.unwrap();
    assert!(matches!(second, SessionEvent::Heartbeat { .. }));

    let worker_id = WorkerId::new("w1").unwrap();
    let delivered = registry
        .send(
            &worker_id,
            OutboundMessage::AssignJob {
                planet_id: "mars-1".to_string(),
                season: 1,
                round: 0,
            },
        )
        .await;
    assert!(delivered, "worker should still be connected");

    let completion = timeout(events_rx.recv()).await.unwrap();
    match completion {
        SessionEvent::JobCompleted { planet_id, .. } => assert_eq!(planet_id.as_str(), "mars-1"),
        other => panic!("expected JobCompleted, got {other:?}"),
    }

    client_task.abort();
}

async fn timeout<T>(fut: impl std::future::Future<Output = Option<T>>) -> Option<T> {
    tokio::time::timeout(Duration::from_secs(2), fut)
        .await
        .expect("timed out waiting for session event")
}
