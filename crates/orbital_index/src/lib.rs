//! Scheduling Index (SI): a volatile, time-ordered set mapping `planet_id`
//! to its next scheduled run time, backed by a single Redis sorted set
//! named `planet_round_queue` (§4.1, §6).
//!
//! Every operation here is fail-soft: if Redis is unreachable or a call
//! times out, reads degrade to empty results and writes degrade to `false`,
//! logged at `warn` rather than `error` — the durable store remains
//! authoritative and the reconciler (`orbital_dispatcher`) repairs the
//! index from it on the next miss. This mirrors the connect-or-degrade
//! shape of the original queue module this crate replaces, down to using
//! `warn` (not `error`) for "backend unavailable" and reserving `error` for
//! an unexpected client failure.

mod config;

pub use config::IndexConfig;

use chrono::{DateTime, TimeZone, Utc};
use orbital_protocol::PlanetId;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{error, warn};

const QUEUE_KEY: &str = "planet_round_queue";

/// The Scheduling Index. Cheap to clone: holds a lazily-established,
/// auto-reconnecting connection behind a mutex.
pub struct SchedulingIndex {
    config: IndexConfig,
    conn: Mutex<Option<ConnectionManager>>,
}

impl SchedulingIndex {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
        }
    }

    /// Insert or update `planet_id`'s score. Idempotent. Returns `false` if
    /// the index is unreachable — the durable store write already committed
    /// and remains authoritative.
    pub async fn upsert(&self, planet_id: &PlanetId, ts: DateTime<Utc>) -> bool {
        let Some(mut conn) = self.connection().await else {
            warn!(%planet_id, "scheduling index unavailable, planet not queued to SI (DB state unchanged)");
            return false;
        };
        let score = ts.timestamp_millis() as f64 / 1000.0;
        match self
            .with_timeout(conn.zadd::<_, _, _, ()>(QUEUE_KEY, planet_id.as_str(), score))
            .await
        {
            Some(Ok(())) => true,
            Some(Err(e)) => {
                error!(%planet_id, error = %e, "failed to upsert planet into scheduling index");
                false
            }
            None => {
                warn!(%planet_id, "scheduling index upsert timed out");
                false
            }
        }
    }

    /// Identifiers with score `<= now`, ascending score order, at most
    /// `limit` of them. Empty on any backend failure.
    pub async fn poll_due(&self, now: DateTime<Utc>, limit: i64) -> Vec<PlanetId> {
        let Some(mut conn) = self.connection().await else {
            return Vec::new();
        };
        let max_score = now.timestamp_millis() as f64 / 1000.0;
        let result: Option<redis::RedisResult<Vec<String>>> = self
            .with_timeout(conn.zrangebyscore_limit(QUEUE_KEY, 0.0, max_score, 0, limit))
            .await;
        match result {
            Some(Ok(ids)) => ids.into_iter().map(PlanetId::from_trusted).collect(),
            Some(Err(e)) => {
                error!(error = %e, "failed to poll due planets from scheduling index");
                Vec::new()
            }
            None => {
                warn!("scheduling index poll_due timed out");
                Vec::new()
            }
        }
    }

    /// Remove `planet_id`. Idempotent, no error if absent.
    pub async fn remove(&self, planet_id: &PlanetId) -> bool {
        let Some(mut conn) = self.connection().await else {
            warn!(%planet_id, "scheduling index unavailable, could not remove planet");
            return false;
        };
        match self
            .with_timeout(conn.zrem::<_, _, ()>(QUEUE_KEY, planet_id.as_str()))
            .await
        {
            Some(Ok(())) => true,
            Some(Err(e)) => {
                error!(%planet_id, error = %e, "failed to remove planet from scheduling index");
                false
            }
            None => {
                warn!(%planet_id, "scheduling index remove timed out");
                false
            }
        }
    }

    /// Total number of entries, or 0 if the backend is unreachable.
    pub async fn size(&self) -> u64 {
        let Some(mut conn) = self.connection().await else {
            return 0;
        };
        match self.with_timeout(conn.zcard(QUEUE_KEY)).await {
            Some(Ok(n)) => n,
            Some(Err(e)) => {
                error!(error = %e, "failed to read scheduling index size");
                0
            }
            None => 0,
        }
    }

    /// The earliest scheduled time in the index, if any.
    pub async fn peek_next_time(&self) -> Option<DateTime<Utc>> {
        let Some(mut conn) = self.connection().await else {
            return None;
        };
        let result: Option<redis::RedisResult<Vec<(String, f64)>>> = self
            .with_timeout(conn.zrange_withscores(QUEUE_KEY, 0, 0))
            .await;
        match result {
            Some(Ok(entries)) => entries.first().map(|(_, score)| score_to_time(*score)),
            Some(Err(e)) => {
                error!(error = %e, "failed to peek next scheduling index entry");
                None
            }
            None => None,
        }
    }

    /// Every entry in the index, for inspection/debugging only.
    pub async fn list_all(&self) -> Vec<(PlanetId, DateTime<Utc>)> {
        let Some(mut conn) = self.connection().await else {
            return Vec::new();
        };
        let result: Option<redis::RedisResult<Vec<(String, f64)>>> = self
            .with_timeout(conn.zrange_withscores(QUEUE_KEY, 0, -1))
            .await;
        match result {
            Some(Ok(entries)) => entries
                .into_iter()
                .map(|(id, score)| (PlanetId::from_trusted(id), score_to_time(score)))
                .collect(),
            Some(Err(e)) => {
                error!(error = %e, "failed to list scheduling index entries");
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    async fn connection(&self) -> Option<ConnectionManager> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Some(conn.clone());
        }
        let client = match redis::Client::open(self.config.redis_url()) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "invalid scheduling index URL");
                return None;
            }
        };
        match tokio::time::timeout(self.config.timeout, client.get_connection_manager()).await {
            Ok(Ok(manager)) => {
                *guard = Some(manager.clone());
                Some(manager)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "scheduling index connection failed");
                None
            }
            Err(_) => {
                warn!("scheduling index connection attempt timed out");
                None
            }
        }
    }

    async fn with_timeout<F, T>(&self, fut: F) -> Option<redis::RedisResult<T>>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.config.timeout, fut).await.ok()
    }
}

fn score_to_time(score: f64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt((score * 1000.0) as i64)
        .single()
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_backend_degrades_to_empty_and_false() {
        let config = IndexConfig {
            host: "127.0.0.1".to_string(),
            port: 1, // nothing listens here
            db: 0,
            timeout: std::time::Duration::from_millis(200),
        };
        let index = SchedulingIndex::new(config);
        let planet_id = PlanetId::new("mars-1").unwrap();

        assert!(!index.upsert(&planet_id, Utc::now()).await);
        assert_eq!(index.poll_due(Utc::now(), 10).await, Vec::new());
        assert!(!index.remove(&planet_id).await);
        assert_eq!(index.size().await, 0);
        assert_eq!(index.peek_next_time().await, None);
        assert_eq!(index.list_all().await, Vec::new());
    }
}
