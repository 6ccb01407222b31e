//! Canonical domain types shared by the dispatcher, the durable store, the
//! scheduling index and the session registry.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ProtocolError, Result};

/// Maximum number of retries a planet is allowed before the cooldown policy
/// kicks in (see `orbital_dispatcher::dispatcher::MAX_RETRIES`).
pub const MAX_RETRIES: i32 = 5;

/// Opaque worker identifier, extracted from the session path `/session/<worker_id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ProtocolError::EmptyWorkerId);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<WorkerId> for String {
    fn from(value: WorkerId) -> Self {
        value.0
    }
}

/// Opaque planet identifier. Must match `[A-Za-z0-9_-]{1,100}` at admission
/// time; once accepted it is treated as an immutable primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanetId(String);

impl PlanetId {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if !is_valid_planet_id(&raw) {
            return Err(ProtocolError::InvalidPlanetId(raw));
        }
        Ok(Self(raw))
    }

    /// Construct without validation, for values already trusted to be valid
    /// (e.g. rows read back out of the durable store).
    pub fn from_trusted(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlanetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<PlanetId> for String {
    fn from(value: PlanetId) -> Self {
        value.0
    }
}

fn is_valid_planet_id(raw: &str) -> bool {
    let len = raw.chars().count();
    (1..=100).contains(&len)
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Worker lifecycle state (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Offline,
    Idle,
    Busy,
    Unresponsive,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Unresponsive => "unresponsive",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Planet scheduling state (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanetStatus {
    Queued,
    Processing,
    Error,
}

impl PlanetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for PlanetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TaskAttempt outcome (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Started,
    Completed,
    Failed,
    Timeout,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory resource telemetry reported by a worker heartbeat (§3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub idle_cpu: Option<f64>,
    pub idle_ram: Option<f64>,
    pub peak_cpu: Option<f64>,
    pub peak_ram: Option<f64>,
    pub disk: Option<f64>,
}

impl Telemetry {
    /// Merge present fields from `update` into `self`, leaving absent fields untouched.
    pub fn merge(&mut self, update: &Telemetry) {
        if update.idle_cpu.is_some() {
            self.idle_cpu = update.idle_cpu;
        }
        if update.idle_ram.is_some() {
            self.idle_ram = update.idle_ram;
        }
        if update.peak_cpu.is_some() {
            self.peak_cpu = update.peak_cpu;
        }
        if update.peak_ram.is_some() {
            self.peak_ram = update.peak_ram;
        }
        if update.disk.is_some() {
            self.disk = update.disk;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planet_id_accepts_allowed_charset() {
        assert!(PlanetId::new("mars-7_v2").is_ok());
        assert!(PlanetId::new("A".repeat(100)).is_ok());
    }

    #[test]
    fn planet_id_rejects_bad_charset_and_length() {
        assert!(PlanetId::new("").is_err());
        assert!(PlanetId::new("A".repeat(101)).is_err());
        assert!(PlanetId::new("has a space").is_err());
        assert!(PlanetId::new("has/slash").is_err());
    }

    #[test]
    fn worker_id_rejects_blank() {
        assert!(WorkerId::new("   ").is_err());
        assert!(WorkerId::new("w-1").is_ok());
    }
}
