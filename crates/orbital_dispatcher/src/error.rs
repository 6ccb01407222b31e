//! Top-level dispatcher error type (§7).
//!
//! Individual loop iterations catch and log `orbital_db`/`orbital_index`
//! errors themselves so one bad tick/event/sweep never kills the process;
//! this type exists for the handful of calls that must fail the whole
//! startup sequence (e.g. `Scheduler::run`'s initial reconciliation).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("durable store error: {0}")]
    Db(#[from] orbital_db::DbError),
}
