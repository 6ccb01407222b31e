use std::time::Duration;

/// Scheduling index backend endpoint (§6 Configuration: SI_HOST, SI_PORT,
/// SI_DB, SI_TIMEOUT).
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub timeout: Duration,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            timeout: Duration::from_secs(2),
        }
    }
}

impl IndexConfig {
    /// Load from `SI_HOST`/`SI_PORT`/`SI_DB`/`SI_TIMEOUT`, falling back to
    /// the documented defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("SI_HOST").unwrap_or(defaults.host),
            port: std::env::var("SI_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            db: std::env::var("SI_DB")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.db),
            timeout: std::env::var("SI_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.timeout),
        }
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_url_includes_db_index() {
        let config = IndexConfig {
            host: "redis.internal".to_string(),
            port: 6380,
            db: 3,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(config.redis_url(), "redis://redis.internal:6380/3");
    }
}
