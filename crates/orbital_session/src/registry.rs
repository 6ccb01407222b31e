//! `SessionRegistry`: the in-memory table of live per-worker senders, plus
//! the axum route that accepts a session and drives it (§4.3).
//!
//! Grounded on `consumers.py`'s channel-group-per-worker pattern: the
//! original fans every worker out to its own Django Channels group so a
//! single send targets exactly one socket. There is exactly one dispatcher
//! process here, so the group collapses to a plain `Mutex<HashMap<WorkerId,
//! mpsc::UnboundedSender<OutboundMessage>>>` — one entry per connected
//! worker, removed on disconnect.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use orbital_db::OrbitalDb;
use orbital_protocol::{InboundMessage, OutboundMessage, ProtocolError, ReportedStatus, WorkerId};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use crate::SessionEvent;

type OutboundSender = mpsc::UnboundedSender<OutboundMessage>;

/// Per-worker outbound channels plus the shared event sink that every
/// session forwards inbound frames onto.
pub struct SessionRegistry {
    db: Arc<OrbitalDb>,
    senders: Mutex<HashMap<WorkerId, OutboundSender>>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionRegistry {
    /// Construct a registry that forwards every inbound event onto `events`.
    /// The dispatcher owns the paired receiver (§4.4). `db` is used only to
    /// perform the §4.3 Open upsert on connection — the registry still holds
    /// no scheduling policy beyond that.
    pub fn new(db: Arc<OrbitalDb>, events: mpsc::UnboundedSender<SessionEvent>) -> Arc<Self> {
        Arc::new(Self {
            db,
            senders: Mutex::new(HashMap::new()),
            events,
        })
    }

    /// Deliver `message` to `worker_id`'s live socket, if connected.
    ///
    /// Returns `false` if the worker has no open session — the caller
    /// (dispatcher L1 step 4) must treat the just-assigned planet as
    /// orphaned rather than mutate state as if delivery succeeded (§4.3
    /// Ordering, §4.6).
    pub async fn send(&self, worker_id: &WorkerId, message: OutboundMessage) -> bool {
        let senders = self.senders.lock().await;
        match senders.get(worker_id) {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    async fn register(&self, worker_id: WorkerId, tx: OutboundSender) {
        self.senders.lock().await.insert(worker_id, tx);
    }

    async fn deregister(&self, worker_id: &WorkerId) {
        self.senders.lock().await.remove(worker_id);
    }

    /// Register a worker's channel and emit `WORKER_READY` without going
    /// through the axum WebSocket upgrade. Exists so dispatcher-level tests
    /// can exercise assignment delivery without a real socket; production
    /// code always goes through `handle_session` instead.
    #[doc(hidden)]
    pub async fn connect_for_test(&self, worker_id: WorkerId) -> mpsc::UnboundedReceiver<OutboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.register(worker_id.clone(), tx).await;
        self.emit(SessionEvent::WorkerReady(worker_id));
        rx
    }

    /// Companion to `connect_for_test`: drop the channel and emit
    /// `WORKER_LOST` as a real session close would.
    #[doc(hidden)]
    pub async fn disconnect_for_test(&self, worker_id: WorkerId, reason: impl Into<String>) {
        self.deregister(&worker_id).await;
        self.emit(SessionEvent::WorkerLost {
            worker_id,
            reason: reason.into(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // The dispatcher outlives every session task; a send error here
        // only happens during shutdown, once the receiver has been dropped.
        let _ = self.events.send(event);
    }
}

/// The `/session/:worker_id` router (§6 Worker wire protocol).
pub fn router(registry: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route("/session/:worker_id", get(handle_upgrade))
        .with_state(registry)
}

async fn handle_upgrade(
    State(registry): State<Arc<SessionRegistry>>,
    Path(worker_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(registry, worker_id, socket))
}

async fn handle_session(registry: Arc<SessionRegistry>, raw_worker_id: String, socket: WebSocket) {
    let worker_id = match WorkerId::new(raw_worker_id) {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "rejected session with invalid worker id");
            return;
        }
    };

    // §4.3 Open: upsert the Worker (state <- IDLE, last_heartbeat <- now,
    // disconnected_at <- null, connected_at preserved if existing) before
    // the dispatcher is told this worker is ready. A failure here is a DS
    // error (§7): log it and keep going — the dispatcher's own
    // unknown-worker guard on WORKER_READY is the backstop.
    if let Err(e) = registry.db.open_worker_session(&worker_id, None, Utc::now()).await {
        error!(worker_id = %worker_id, error = %e, "failed to upsert worker on session open");
    }

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundMessage>();

    registry.register(worker_id.clone(), out_tx).await;
    info!(worker_id = %worker_id, "worker session opened");
    registry.emit(SessionEvent::WorkerReady(worker_id.clone()));

    // Drain outbound frames onto the socket until either side closes.
    let send_worker_id = worker_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let text = match message.to_text() {
                Ok(t) => t,
                Err(e) => {
                    warn!(worker_id = %send_worker_id, error = %e, "failed to encode outbound frame");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Inbound frames are processed strictly in arrival order (§4.3 Ordering)
    // since this loop awaits each `recv`/handle before the next.
    while let Some(frame) = ws_rx.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(_) => break,
        };
        handle_inbound_frame(&registry, &worker_id, &text).await;
    }

    send_task.abort();
    registry.deregister(&worker_id).await;
    info!(worker_id = %worker_id, "worker session closed");
    registry.emit(SessionEvent::WorkerLost {
        worker_id,
        reason: "connection closed".to_string(),
    });
}

async fn handle_inbound_frame(registry: &SessionRegistry, worker_id: &WorkerId, raw: &str) {
    let parsed = match InboundMessage::parse(raw) {
        Ok(msg) => msg,
        Err(ProtocolError::UnknownType(t)) => {
            warn!(worker_id = %worker_id, message_type = %t, "ignoring unknown message type");
            return;
        }
        Err(e) => {
            warn!(worker_id = %worker_id, error = %e, "malformed inbound frame, keeping session open");
            return;
        }
    };

    match parsed {
        InboundMessage::Heartbeat { telemetry } => {
            registry.emit(SessionEvent::Heartbeat {
                worker_id: worker_id.clone(),
                telemetry,
            });
            registry
                .send(
                    worker_id,
                    OutboundMessage::Pong {
                        server_time: Utc::now(),
                    },
                )
                .await;
        }
        InboundMessage::StatusUpdate { status } => {
            registry.emit(SessionEvent::StatusUpdate {
                worker_id: worker_id.clone(),
                status,
            });
            if status == ReportedStatus::Idle {
                registry.emit(SessionEvent::WorkerReady(worker_id.clone()));
            }
        }
        InboundMessage::JobDone {
            planet_id,
            next_run_time,
            season,
            round,
            round_number,
        } => match orbital_protocol::PlanetId::new(planet_id) {
            Ok(planet_id) => registry.emit(SessionEvent::JobCompleted {
                worker_id: worker_id.clone(),
                planet_id,
                next_run_time,
                season,
                round,
                round_number,
            }),
            Err(e) => warn!(worker_id = %worker_id, error = %e, "job_done carried an invalid planet_id"),
        },
        InboundMessage::Error { planet_id, error } => match orbital_protocol::PlanetId::new(planet_id) {
            Ok(planet_id) => registry.emit(SessionEvent::JobFailed {
                worker_id: worker_id.clone(),
                planet_id,
                reason: error,
            }),
            Err(e) => warn!(worker_id = %worker_id, error = %e, "error frame carried an invalid planet_id"),
        },
        InboundMessage::Disconnect {} => {
            info!(worker_id = %worker_id, "worker sent disconnect (informational; close is transport-driven)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbital_db::DbConfig;

    async fn test_registry() -> Arc<SessionRegistry> {
        let db = Arc::new(OrbitalDb::connect(DbConfig::sqlite_memory()).await.unwrap());
        let (tx, _rx) = mpsc::unbounded_channel();
        SessionRegistry::new(db, tx)
    }

    #[tokio::test]
    async fn send_to_unknown_worker_returns_false() {
        let registry = test_registry().await;
        let worker_id = WorkerId::new("ghost").unwrap();
        let delivered = registry
            .send(
                &worker_id,
                OutboundMessage::Pong {
                    server_time: Utc::now(),
                },
            )
            .await;
        assert!(!delivered);
    }

    #[tokio::test]
    async fn register_then_send_delivers() {
        let registry = test_registry().await;
        let worker_id = WorkerId::new("w1").unwrap();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        registry.register(worker_id.clone(), out_tx).await;

        let delivered = registry
            .send(
                &worker_id,
                OutboundMessage::AssignJob {
                    planet_id: "mars-1".into(),
                    season: 1,
                    round: 0,
                },
            )
            .await;
        assert!(delivered);
        assert!(matches!(
            out_rx.recv().await,
            Some(OutboundMessage::AssignJob { .. })
        ));
    }

    #[tokio::test]
    async fn deregister_makes_send_fail() {
        let registry = test_registry().await;
        let worker_id = WorkerId::new("w1").unwrap();
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        registry.register(worker_id.clone(), out_tx).await;
        registry.deregister(&worker_id).await;

        let delivered = registry
            .send(
                &worker_id,
                OutboundMessage::Pong {
                    server_time: Utc::now(),
                },
            )
            .await;
        assert!(!delivered);
    }
}
