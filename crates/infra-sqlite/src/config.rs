// Store configuration

use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://strata.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Connection settings for the SQLite store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    /// Shared in-memory database (tests, demos)
    pub fn in_memory() -> Self {
        Self::new("sqlite::memory:")
    }

    /// Defaults overridden by `STRATA_DB_URL` and `STRATA_DB_MAX_CONNECTIONS`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("STRATA_DB_URL") {
            if !url.trim().is_empty() {
                config.database_url = url;
            }
        }
        if let Some(max) = std::env::var("STRATA_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
        {
            config.max_connections = max;
        }
        config
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
        assert!(!config.is_in_memory());
        assert!(StoreConfig::in_memory().is_in_memory());
    }
}
