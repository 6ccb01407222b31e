//! The WebSocket session loop: heartbeats out, `assign_job` in, job results
//! reported back as `job_done`/`error` (§6 wire protocol).

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use orbital_protocol::{InboundMessage, OutboundMessage, Telemetry};
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::job::{JobHandler, JobOutcome};

pub struct WorkerClient<H: JobHandler> {
    config: WorkerConfig,
    handler: Arc<H>,
}

impl<H: JobHandler> WorkerClient<H> {
    pub fn new(config: WorkerConfig, handler: H) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Connect and run the session loop until the server closes the socket
    /// or a `disconnect` is requested via `shutdown`. Returns once the
    /// connection ends; the caller decides whether to reconnect.
    pub async fn run(&self) -> Result<()> {
        let url = self.config.connect_url();
        info!(%url, worker_id = %self.config.worker_id, "connecting to dispatcher");
        let (stream, _response) = connect_async(&url).await.map_err(|source| WorkerError::Connect {
            url: url.clone(),
            source,
        })?;
        let (mut write, mut read) = stream.split();

        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<InboundMessage>();
        let mut heartbeat = interval(self.config.heartbeat_interval);
        heartbeat.tick().await; // first tick fires immediately; skip it, heartbeat on cadence only

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let frame = InboundMessage::Heartbeat { telemetry: Telemetry::default() };
                    if let Err(e) = send(&mut write, &frame).await {
                        warn!(error = %e, "failed to send heartbeat, session likely dead");
                        return Err(e);
                    }
                }
                Some(outcome) = result_rx.recv() => {
                    if let Err(e) = send(&mut write, &outcome).await {
                        warn!(error = %e, "failed to report job result");
                        return Err(e);
                    }
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(&text, result_tx.clone());
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("dispatcher closed the session");
                            return Ok(());
                        }
                        Some(Ok(_)) => {} // binary/ping/pong frames carry no payload for this protocol
                        Some(Err(e)) => {
                            warn!(error = %e, "session read error");
                            return Err(WorkerError::Transport(e));
                        }
                    }
                }
            }
        }
    }

    fn handle_frame(&self, text: &str, result_tx: mpsc::UnboundedSender<InboundMessage>) {
        let parsed: OutboundMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, raw = %text, "could not parse frame from dispatcher, ignoring");
                return;
            }
        };

        match parsed {
            OutboundMessage::AssignJob { planet_id, season, round } => {
                info!(%planet_id, season, round, "assigned job");
                let handler = Arc::clone(&self.handler);
                let planet_id_for_task = planet_id.clone();
                tokio::spawn(async move {
                    let result = tokio::task::spawn_blocking(move || {
                        handler.execute(&planet_id_for_task, season, round)
                    })
                    .await;

                    let message = match result {
                        Ok(JobOutcome::Completed { next_run_time, season, round, round_number }) => {
                            InboundMessage::JobDone { planet_id, next_run_time, season, round, round_number }
                        }
                        Ok(JobOutcome::Failed { reason }) => InboundMessage::Error { planet_id, error: reason },
                        Err(join_error) => InboundMessage::Error {
                            planet_id,
                            error: format!("job task panicked: {join_error}"),
                        },
                    };

                    let _ = result_tx.send(message);
                });
            }
            OutboundMessage::Pong { server_time } => {
                debug!(%server_time, "pong received");
            }
            OutboundMessage::Command { action, params } => {
                debug!(%action, %params, "command received, no local handler registered");
            }
        }
    }
}

async fn send<S>(write: &mut S, message: &InboundMessage) -> Result<()>
where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(message).map_err(orbital_protocol::ProtocolError::from)?;
    write.send(Message::Text(text)).await?;
    Ok(())
}
