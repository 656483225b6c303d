//! Application configuration loaded from environment variables.
//!
//! Import tuning knobs are explicit values with defaults rather than being
//! inferred from the hosting platform, so the run orchestrator stays portable
//! across invocation limits.

use std::env;
use std::time::Duration;

/// Default Strava API base URL.
const DEFAULT_STRAVA_BASE_URL: &str = "https://www.strava.com/api/v3";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string
    pub database_url: String,
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Strava API base URL (overridable for tests against a stub server)
    pub strava_base_url: String,
    /// Import pipeline tuning knobs
    pub import: ImportConfig,
}

/// Tuning knobs for the import pipeline.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Records requested per provider page
    pub page_size: u32,
    /// Wall-clock budget for one import invocation
    pub time_budget: Duration,
    /// Hard timeout for a single provider request
    pub request_timeout: Duration,
    /// Retry budget for rate-limited or timed-out requests
    pub max_retries: u32,
    /// Ceiling for backoff sleeps between retries
    pub backoff_cap: Duration,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            time_budget: Duration::from_millis(45_000),
            request_timeout: Duration::from_millis(5_000),
            max_retries: 3,
            backoff_cap: Duration::from_millis(30_000),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            strava_base_url: env::var("STRAVA_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_STRAVA_BASE_URL.to_string()),
            import: ImportConfig {
                page_size: env_parse("IMPORT_PAGE_SIZE", 50),
                time_budget: Duration::from_millis(env_parse("IMPORT_TIME_BUDGET_MS", 45_000)),
                request_timeout: Duration::from_millis(env_parse(
                    "IMPORT_REQUEST_TIMEOUT_MS",
                    5_000,
                )),
                max_retries: env_parse("IMPORT_MAX_RETRIES", 3),
                backoff_cap: Duration::from_millis(env_parse("IMPORT_BACKOFF_CAP_MS", 30_000)),
            },
        })
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            database_url: "postgres://localhost/stride_test".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            strava_base_url: "http://localhost:4010".to_string(),
            import: ImportConfig::default(),
        }
    }
}

/// Parse an optional env var, falling back to a default on absence or garbage.
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("DATABASE_URL", "postgres://localhost/stride");
        env::set_var("IMPORT_PAGE_SIZE", "25");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.database_url, "postgres://localhost/stride");
        assert_eq!(config.port, 8080);
        assert_eq!(config.import.page_size, 25);
        assert_eq!(config.strava_base_url, DEFAULT_STRAVA_BASE_URL);
    }

    #[test]
    fn test_env_parse_rejects_garbage() {
        env::set_var("IMPORT_MAX_RETRIES", "not-a-number");
        let parsed: u32 = env_parse("IMPORT_MAX_RETRIES", 3);
        assert_eq!(parsed, 3);
    }
}
