//! Environment-driven configuration.
//!
//! Prefixes: `ORCH_` for the engine, `REDIS_` for the lease store, `DB_` for
//! the relational store, `OPENCODE_` for the internal workbench client.
//! Defaults match the documented contract of each subsystem.

use std::time::Duration;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Engine-level tunables.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Acquisition timeout for session-execution locks.
    pub lock_acquire_timeout: Duration,
    /// Lease duration for session-execution locks.
    pub lock_lease_timeout: Duration,
    /// Lease renewal interval while a lock is held.
    pub lock_renewal_interval: Duration,
    /// Heartbeat TTL after which a registered agent is considered stale.
    pub agent_heartbeat_ttl: Duration,
    /// Registry statistics cache TTL.
    pub registry_stats_cache_ttl: Duration,
    /// Sessions with less than this much budget left are flagged at-risk.
    pub at_risk_threshold: Duration,
    /// Default bound for session-tree traversal.
    pub session_tree_max_depth: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            lock_acquire_timeout: Duration::from_secs(30),
            lock_lease_timeout: Duration::from_secs(30),
            lock_renewal_interval: Duration::from_secs(10),
            agent_heartbeat_ttl: Duration::from_secs(300),
            registry_stats_cache_ttl: Duration::from_secs(5),
            at_risk_threshold: Duration::from_secs(300),
            session_tree_max_depth: 5,
        }
    }
}

impl OrchestratorConfig {
    /// Load from `ORCH_*` environment variables, falling back to defaults.
    ///
    /// - `ORCH_LOCK_ACQUIRE_TIMEOUT_SECS`
    /// - `ORCH_LOCK_LEASE_TIMEOUT_SECS`
    /// - `ORCH_LOCK_RENEWAL_INTERVAL_SECS`
    /// - `ORCH_AGENT_HEARTBEAT_TTL_SECS`
    /// - `ORCH_REGISTRY_STATS_CACHE_TTL_SECS`
    /// - `ORCH_AT_RISK_THRESHOLD_SECS`
    /// - `ORCH_SESSION_TREE_MAX_DEPTH`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            lock_acquire_timeout: env_parse("ORCH_LOCK_ACQUIRE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.lock_acquire_timeout),
            lock_lease_timeout: env_parse("ORCH_LOCK_LEASE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.lock_lease_timeout),
            lock_renewal_interval: env_parse("ORCH_LOCK_RENEWAL_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.lock_renewal_interval),
            agent_heartbeat_ttl: env_parse("ORCH_AGENT_HEARTBEAT_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.agent_heartbeat_ttl),
            registry_stats_cache_ttl: env_parse("ORCH_REGISTRY_STATS_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.registry_stats_cache_ttl),
            at_risk_threshold: env_parse("ORCH_AT_RISK_THRESHOLD_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.at_risk_threshold),
            session_tree_max_depth: env_parse("ORCH_SESSION_TREE_MAX_DEPTH")
                .unwrap_or(defaults.session_tree_max_depth),
        }
    }
}

/// Lease-store (key/value coordination service) connection settings.
#[derive(Debug, Clone)]
pub struct LeaseStoreConfig {
    pub host: String,
    pub port: u16,
    pub database: u32,
    pub max_connections: u32,
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for LeaseStoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            database: 0,
            max_connections: 50,
            connect_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

impl LeaseStoreConfig {
    /// Load from `REDIS_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("REDIS_HOST").unwrap_or(defaults.host),
            port: env_parse("REDIS_PORT").unwrap_or(defaults.port),
            database: env_parse("REDIS_DATABASE").unwrap_or(defaults.database),
            max_connections: env_parse("REDIS_MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
            connect_timeout: env_parse("REDIS_CONNECT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            operation_timeout: env_parse("REDIS_OPERATION_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.operation_timeout),
            max_retries: env_parse("REDIS_MAX_RETRIES").unwrap_or(defaults.max_retries),
            retry_delay: env_parse("REDIS_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
        }
    }
}

/// Relational-store connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub pool_size: u32,
    pub connect_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "gantry".to_string(),
            user: "gantry".to_string(),
            pool_size: 20,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl DatabaseConfig {
    /// Load from `DB_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("DB_HOST").unwrap_or(defaults.host),
            port: env_parse("DB_PORT").unwrap_or(defaults.port),
            database: std::env::var("DB_DATABASE").unwrap_or(defaults.database),
            user: std::env::var("DB_USER").unwrap_or(defaults.user),
            pool_size: env_parse("DB_POOL_SIZE").unwrap_or(defaults.pool_size),
            connect_timeout: env_parse("DB_CONNECT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
        }
    }
}

/// Internal workbench (native executor) client settings.
#[derive(Debug, Clone)]
pub struct WorkbenchConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Initial status-poll interval; grows by 1.5x up to `poll_interval_max`.
    pub poll_interval: Duration,
    pub poll_interval_max: Duration,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4096".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            poll_interval: Duration::from_secs(2),
            poll_interval_max: Duration::from_secs(30),
        }
    }
}

impl WorkbenchConfig {
    /// Load from `OPENCODE_*` environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("OPENCODE_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            api_key: std::env::var("OPENCODE_API_KEY").ok(),
            timeout: env_parse("OPENCODE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: env_parse("OPENCODE_MAX_RETRIES").unwrap_or(defaults.max_retries),
            retry_delay: env_parse("OPENCODE_RETRY_DELAY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_delay),
            poll_interval: env_parse("OPENCODE_POLL_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            poll_interval_max: env_parse("OPENCODE_POLL_INTERVAL_MAX_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval_max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.lock_renewal_interval, Duration::from_secs(10));
        assert_eq!(config.agent_heartbeat_ttl, Duration::from_secs(300));
        assert_eq!(config.registry_stats_cache_ttl, Duration::from_secs(5));
        assert_eq!(config.at_risk_threshold, Duration::from_secs(300));
        assert_eq!(config.session_tree_max_depth, 5);
    }

    #[test]
    fn test_workbench_defaults() {
        let config = WorkbenchConfig::default();
        assert_eq!(config.base_url, "http://localhost:4096");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
    }
}
