//! Dispatcher (D): the scheduling engine (§4.4).
//!
//! Polls the scheduling index on a fixed tick, reconciles with the durable
//! store on miss, matches due planets to idle workers, performs the atomic
//! hand-off, and drives the job lifecycle (completion, failure/retry,
//! orphan recovery). Three cooperating loops — L1 tick, L2 event, L3
//! liveness sweep — run as concurrent tokio tasks sharing one `Scheduler`.

mod config;
mod error;
mod event;
mod metrics;
mod reconcile;
mod scheduler;
mod sweep;
mod tick;

pub use config::DispatcherConfig;
pub use error::{DispatchError, Result};
pub use scheduler::Scheduler;
