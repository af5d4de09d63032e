//! Fund configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `FUND_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `FUND_DB_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `FUND_DB_MIN_CONNECTIONS` - Idle connections kept open (default: 2)
//! - `FUND_DB_ACQUIRE_TIMEOUT_SECS` - Wait for a pooled connection (default: 10)
//! - `FUND_LOCK_TIMEOUT_MS` - Row lock wait inside an operation (default: 5000)
//! - `FUND_STATEMENT_TIMEOUT_MS` - Per-statement limit (default: 10000)
//! - `FUND_OPERATION_TIMEOUT_SECS` - Whole-operation limit per attempt (default: 30)
//! - `FUND_RETRY_MAX_ATTEMPTS` - Attempts on a busy store (default: 3)
//! - `FUND_RETRY_BACKOFF_MS` - Linear backoff step between attempts (default: 500)
//! - `FUND_MOVEMENTS_DEFAULT_LIMIT` - Movement listing size when none is given (default: 100)
//! - `FUND_LOG_JSON` - Emit JSON logs instead of text (any of `1`, `true`, `yes`)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Traces sample rate (default: 0.0)

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Upper bound for a movement listing.
pub const MAX_MOVEMENTS_LIMIT: u32 = 1000;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Replacement-fund configuration.
#[derive(Debug, Clone)]
pub struct FundConfig {
    /// Connection pool and session limits.
    pub database: DatabaseConfig,
    /// Retry behaviour on a busy store.
    pub retry: RetryPolicy,
    /// Upper bound on a single operation attempt.
    pub operation_timeout: Duration,
    /// Movement listing size when the caller gives none.
    pub movements_default_limit: u32,
    /// Emit JSON logs.
    pub log_json: bool,
    /// Error tracking.
    pub sentry: SentryConfig,
}

/// Database configuration.
///
/// Implements `Debug` manually to redact the connection URL (contains password).
#[derive(Clone)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL
    pub url: SecretString,
    /// Maximum pool size
    pub max_connections: u32,
    /// Minimum idle connections
    pub min_connections: u32,
    /// How long to wait for a pooled connection
    pub acquire_timeout: Duration,
    /// `lock_timeout` applied inside each operation transaction
    pub lock_timeout: Duration,
    /// `statement_timeout` applied inside each operation transaction
    pub statement_timeout: Duration,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("lock_timeout", &self.lock_timeout)
            .field("statement_timeout", &self.statement_timeout)
            .finish()
    }
}

/// Sentry error tracking configuration.
#[derive(Debug, Clone, Default)]
pub struct SentryConfig {
    /// Sentry DSN; tracking is disabled when unset
    pub dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub environment: Option<String>,
    /// Error sample rate (0.0 to 1.0)
    pub sample_rate: f32,
    /// Traces sample rate (0.0 to 1.0)
    pub traces_sample_rate: f32,
}

impl FundConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let url = env
            .get("FUND_DATABASE_URL")
            .or_else(|| env.get("DATABASE_URL"))
            .ok_or_else(|| ConfigError::MissingEnvVar("FUND_DATABASE_URL".to_string()))?;

        let max_connections = env.parse_or("FUND_DB_MAX_CONNECTIONS", 10_u32)?;
        let min_connections = env.parse_or("FUND_DB_MIN_CONNECTIONS", 2_u32)?;
        if min_connections > max_connections {
            return Err(ConfigError::InvalidEnvVar(
                "FUND_DB_MIN_CONNECTIONS".to_string(),
                format!("must not exceed FUND_DB_MAX_CONNECTIONS ({max_connections})"),
            ));
        }

        let database = DatabaseConfig {
            url: SecretString::from(url),
            max_connections,
            min_connections,
            acquire_timeout: Duration::from_secs(
                env.parse_or("FUND_DB_ACQUIRE_TIMEOUT_SECS", 10)?,
            ),
            lock_timeout: Duration::from_millis(env.parse_or("FUND_LOCK_TIMEOUT_MS", 5000)?),
            statement_timeout: Duration::from_millis(
                env.parse_or("FUND_STATEMENT_TIMEOUT_MS", 10_000)?,
            ),
        };

        let max_attempts = env.parse_or("FUND_RETRY_MAX_ATTEMPTS", 3_u32)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "FUND_RETRY_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let retry = RetryPolicy {
            max_attempts,
            backoff: Duration::from_millis(env.parse_or("FUND_RETRY_BACKOFF_MS", 500)?),
        };

        let operation_timeout =
            Duration::from_secs(env.parse_or("FUND_OPERATION_TIMEOUT_SECS", 30)?);
        if operation_timeout.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "FUND_OPERATION_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let movements_default_limit = env.parse_or("FUND_MOVEMENTS_DEFAULT_LIMIT", 100_u32)?;
        if !(1..=MAX_MOVEMENTS_LIMIT).contains(&movements_default_limit) {
            return Err(ConfigError::InvalidEnvVar(
                "FUND_MOVEMENTS_DEFAULT_LIMIT".to_string(),
                format!("must be between 1 and {MAX_MOVEMENTS_LIMIT}"),
            ));
        }

        let log_json = env
            .get("FUND_LOG_JSON")
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));

        let sentry = SentryConfig {
            dsn: env.get("SENTRY_DSN"),
            environment: env.get("SENTRY_ENVIRONMENT"),
            sample_rate: env
                .get("SENTRY_SAMPLE_RATE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
            traces_sample_rate: env
                .get("SENTRY_TRACES_SAMPLE_RATE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0),
        };

        Ok(Self {
            database,
            retry,
            operation_timeout,
            movements_default_limit,
            log_json,
            sentry,
        })
    }
}

/// Key lookup with the parsing helpers used above.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Get an optional variable; empty values count as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Parse a variable, falling back to `default` when unset.
    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key).map_or(Ok(default), |raw| {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<FundConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        FundConfig::from_source(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("FUND_DATABASE_URL", "postgres://localhost/fund")]).unwrap();
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.database.min_connections, 2);
        assert_eq!(config.database.lock_timeout, Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff, Duration::from_millis(500));
        assert_eq!(config.operation_timeout, Duration::from_secs(30));
        assert_eq!(config.movements_default_limit, 100);
        assert!(!config.log_json);
        assert!(config.sentry.dsn.is_none());
    }

    #[test]
    fn test_missing_database_url() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "FUND_DATABASE_URL"));
    }

    #[test]
    fn test_database_url_fallback() {
        let config = load(&[("DATABASE_URL", "postgres://fallback/db")]).unwrap();
        assert_eq!(config.database.url.expose_secret(), "postgres://fallback/db");

        let config = load(&[
            ("FUND_DATABASE_URL", "postgres://primary/db"),
            ("DATABASE_URL", "postgres://fallback/db"),
        ])
        .unwrap();
        assert_eq!(config.database.url.expose_secret(), "postgres://primary/db");
    }

    #[test]
    fn test_invalid_number_names_the_variable() {
        let err = load(&[
            ("FUND_DATABASE_URL", "postgres://localhost/fund"),
            ("FUND_RETRY_MAX_ATTEMPTS", "three"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "FUND_RETRY_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        for (key, value) in [
            ("FUND_RETRY_MAX_ATTEMPTS", "0"),
            ("FUND_OPERATION_TIMEOUT_SECS", "0"),
            ("FUND_MOVEMENTS_DEFAULT_LIMIT", "0"),
            ("FUND_MOVEMENTS_DEFAULT_LIMIT", "1001"),
            ("FUND_DB_MIN_CONNECTIONS", "11"),
        ] {
            let result = load(&[("FUND_DATABASE_URL", "postgres://localhost/fund"), (key, value)]);
            assert!(result.is_err(), "{key}={value} should be rejected");
        }
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("FUND_DATABASE_URL", "postgres://localhost/fund"),
            ("FUND_RETRY_BACKOFF_MS", "50"),
            ("FUND_LOCK_TIMEOUT_MS", "250"),
            ("FUND_LOG_JSON", "TRUE"),
            ("SENTRY_DSN", "https://key@sentry.example/1"),
            ("SENTRY_SAMPLE_RATE", "0.5"),
        ])
        .unwrap();
        assert_eq!(config.retry.backoff, Duration::from_millis(50));
        assert_eq!(config.database.lock_timeout, Duration::from_millis(250));
        assert!(config.log_json);
        assert!(config.sentry.dsn.is_some());
        assert!((config.sentry.sample_rate - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_debug_redacts_database_url() {
        let config = load(&[("FUND_DATABASE_URL", "postgres://user:hunter2@db/fund")]).unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));
    }
}
