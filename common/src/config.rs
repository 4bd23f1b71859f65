//! Application configuration.
//!
//! Values come from the process environment. Call [`load_dotenv`] first to
//! pick up a `.env` file in the working directory.

use std::str::FromStr;
use std::time::Duration;

/// Database used by the running service.
pub const PRODUCTION_DATABASE_ENV: &str = "SIMPLIFIED_PRODUCTION_DATABASE";
/// Database used by integration tests.
pub const TEST_DATABASE_ENV: &str = "SIMPLIFIED_TEST_DATABASE";

/// Runtime configuration shared by the registry binaries.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    pub db_wait_attempts: u32,
    pub db_wait_interval_secs: u64,
    pub search_radius_km: f64,
    pub nearby_radius_km: f64,
    pub session_ttl_secs: u64,
    pub admin_username: String,
    pub admin_password: String,
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "registry-service".to_string(),
            host: "0.0.0.0".to_string(),
            port: 80,
            database_url: None,
            max_connections: 10,
            connect_timeout_secs: 5,
            db_wait_attempts: 6,
            db_wait_interval_secs: 5,
            search_radius_km: 300.0,
            nearby_radius_km: 150.0,
            session_ttl_secs: 8 * 60 * 60,
            admin_username: "admin".to_string(),
            admin_password: "admin".to_string(),
            log_json: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from the environment for the named service.
    pub fn load_with_service(service_name: &str) -> Self {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// # Arguments
    /// * `service_name` - Name reported in logs and responses
    /// * `lookup` - Returns the raw value for an environment key
    ///
    /// # Returns
    /// The configuration, with defaults for missing or unparsable values.
    pub fn from_lookup<F>(service_name: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            service_name: service_name.to_string(),
            host: lookup("SERVER_HOST").unwrap_or(defaults.host),
            port: parse_env(&lookup, "SERVER_PORT").unwrap_or(defaults.port),
            database_url: lookup(PRODUCTION_DATABASE_ENV).filter(|v| !v.trim().is_empty()),
            max_connections: parse_env(&lookup, "DB_MAX_CONNECTIONS")
                .unwrap_or(defaults.max_connections),
            connect_timeout_secs: parse_env(&lookup, "DB_CONNECT_TIMEOUT_SECS")
                .unwrap_or(defaults.connect_timeout_secs),
            db_wait_attempts: parse_env(&lookup, "DB_WAIT_ATTEMPTS")
                .unwrap_or(defaults.db_wait_attempts),
            db_wait_interval_secs: parse_env(&lookup, "DB_WAIT_INTERVAL_SECS")
                .unwrap_or(defaults.db_wait_interval_secs),
            search_radius_km: parse_env(&lookup, "SEARCH_RADIUS_KM")
                .unwrap_or(defaults.search_radius_km),
            nearby_radius_km: parse_env(&lookup, "NEARBY_RADIUS_KM")
                .unwrap_or(defaults.nearby_radius_km),
            session_ttl_secs: parse_env(&lookup, "ADMIN_SESSION_TTL_SECS")
                .unwrap_or(defaults.session_ttl_secs),
            admin_username: lookup("REGISTRY_ADMIN_USERNAME").unwrap_or(defaults.admin_username),
            admin_password: lookup("REGISTRY_ADMIN_PASSWORD").unwrap_or(defaults.admin_password),
            log_json: lookup("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parses one environment value, trimming whitespace first.
fn parse_env<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

/// Loads `.env` from the working directory if present. Variables already set
/// in the environment win.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "failed to read .env"),
    }
}
