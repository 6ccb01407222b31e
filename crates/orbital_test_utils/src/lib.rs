//! Shared test fixtures for exercising the durable store without a real
//! SQLite file on disk: an in-memory `OrbitalDb` plus small builders for the
//! two admitted entities, Worker and Planet.
//!
//! Grounded on `orbital_db`'s own `test_db()` helper, repeated in every one
//! of its `#[cfg(test)]` modules — this crate just lifts that helper (and
//! the builder pattern other crates in the workspace already use for
//! configuration, e.g. `orbital_dispatcher::DispatcherConfig`) out so
//! integration tests in other crates don't have to hand-roll it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use orbital_db::{DbConfig, OrbitalDb};
use orbital_protocol::{PlanetId, WorkerId};

/// Connect a fresh in-memory durable store with the schema already applied.
pub async fn in_memory_db() -> Arc<OrbitalDb> {
    Arc::new(
        OrbitalDb::connect(DbConfig::sqlite_memory())
            .await
            .expect("in-memory durable store should always connect"),
    )
}

/// Builds and admits a planet, defaulting to "due right now" so it shows up
/// immediately in `list_due_queued_planets`.
pub struct PlanetBuilder {
    id: String,
    next_run_time: DateTime<Utc>,
    season: i64,
}

impl PlanetBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            next_run_time: Utc::now(),
            season: 1,
        }
    }

    pub fn next_run_time(mut self, at: DateTime<Utc>) -> Self {
        self.next_run_time = at;
        self
    }

    pub fn due_in(mut self, delta: chrono::Duration) -> Self {
        self.next_run_time = Utc::now() + delta;
        self
    }

    pub fn season(mut self, season: i64) -> Self {
        self.season = season;
        self
    }

    /// Admit the planet and return its id.
    pub async fn insert(self, db: &OrbitalDb) -> PlanetId {
        let planet_id = PlanetId::new(self.id).expect("test planet id should be valid");
        db.create_planet(&planet_id, self.next_run_time, self.season)
            .await
            .expect("test planet admission should succeed");
        planet_id
    }
}

/// Builds and opens a worker session, defaulting to IDLE with a fresh heartbeat.
pub struct WorkerBuilder {
    id: String,
    address: Option<String>,
    connected_at: DateTime<Utc>,
}

impl WorkerBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: None,
            connected_at: Utc::now(),
        }
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn connected_at(mut self, at: DateTime<Utc>) -> Self {
        self.connected_at = at;
        self
    }

    /// Open the session and return the worker's id.
    pub async fn insert(self, db: &OrbitalDb) -> WorkerId {
        let worker_id = WorkerId::new(self.id).expect("test worker id should be valid");
        db.open_worker_session(&worker_id, self.address.as_deref(), self.connected_at)
            .await
            .expect("test worker session open should succeed");
        worker_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn planet_builder_admits_a_due_planet() {
        let db = in_memory_db().await;
        let planet_id = PlanetBuilder::new("mars-1").insert(&db).await;
        let due = db.list_due_queued_planets(Utc::now(), 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].planet_id, planet_id.as_str());
    }

    #[tokio::test]
    async fn planet_builder_due_in_the_future_is_not_yet_due() {
        let db = in_memory_db().await;
        PlanetBuilder::new("mars-2")
            .due_in(chrono::Duration::hours(1))
            .insert(&db)
            .await;
        let due = db.list_due_queued_planets(Utc::now(), 10).await.unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn worker_builder_opens_an_idle_session() {
        let db = in_memory_db().await;
        let worker_id = WorkerBuilder::new("w1").address("10.0.0.5").insert(&db).await;
        let workers = db.list_idle_workers(10).await.unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].worker_id, worker_id.as_str());
        assert_eq!(workers[0].address.as_deref(), Some("10.0.0.5"));
    }
}
