//! Worker wire protocol: The Split Plane Protocol, JSON edition.
//!
//! Wire format for Dispatcher <-> Worker communication over the persistent
//! per-worker session channel (`/session/<worker_id>`).
//!
//! Every frame is a single JSON object carrying a string discriminant field
//! `type`. There is no binary framing: the channel is message-oriented
//! (WebSocket in the reference deployment) and the transport already
//! delimits frames, so the protocol layer only has to (de)serialize JSON.
//!
//! # Inbound (worker -> dispatcher)
//!
//! | type            | fields                                              |
//! |-----------------|------------------------------------------------------|
//! | `heartbeat`      | telemetry fields optional                            |
//! | `status_update`  | `status` ∈ {idle, busy}                              |
//! | `job_done`       | `planet_id`, `next_run_time`, season/round optional  |
//! | `error`          | `planet_id`, `error`                                 |
//! | `disconnect`     | —                                                     |
//!
//! # Outbound (dispatcher -> worker)
//!
//! | type         | fields                          |
//! |--------------|---------------------------------|
//! | `assign_job` | `planet_id`, `season`, `round`  |
//! | `pong`       | `server_time`                  |
//! | `command`    | `action`, `params`              |

pub mod error;
pub mod types;

pub use error::{ProtocolError, Result};
pub use types::{AttemptOutcome, PlanetId, PlanetStatus, Telemetry, WorkerId, WorkerState, MAX_RETRIES};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message received from a worker over its session channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Heartbeat {
        #[serde(flatten)]
        telemetry: Telemetry,
    },
    StatusUpdate {
        status: ReportedStatus,
    },
    JobDone {
        planet_id: String,
        next_run_time: DateTime<Utc>,
        season: Option<i64>,
        round: Option<i64>,
        round_number: Option<i64>,
    },
    Error {
        planet_id: String,
        error: String,
    },
    Disconnect {},
}

/// The two statuses a worker is allowed to self-report via `status_update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedStatus {
    Idle,
    Busy,
}

impl InboundMessage {
    const KNOWN_TYPES: [&'static str; 5] = [
        "heartbeat",
        "status_update",
        "job_done",
        "error",
        "disconnect",
    ];

    /// Parse a raw text frame.
    ///
    /// An unrecognized `type` yields `ProtocolError::UnknownType` (§4.3: log,
    /// ignore, keep session open). A recognized type with missing/malformed
    /// fields yields `ProtocolError::Malformed` so the two dispositions can
    /// be told apart by the caller.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let type_name = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        if !Self::KNOWN_TYPES.contains(&type_name.as_str()) {
            return Err(ProtocolError::UnknownType(type_name));
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// A message sent from the dispatcher to a specific connected worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    AssignJob {
        planet_id: String,
        season: i64,
        round: i64,
    },
    Pong {
        server_time: DateTime<Utc>,
    },
    /// Administrative passthrough. The core dispatcher never constructs or
    /// interprets these; it only carries them from the (out of scope)
    /// admin API to a worker.
    Command {
        action: String,
        params: Value,
    },
}

impl OutboundMessage {
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
