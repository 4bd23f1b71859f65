//! Database readiness check.
//!
//! The service starts alongside its database container, so the database may
//! not accept connections yet. [`wait_for_database`] probes it a bounded number
//! of times and then lets the caller carry on whatever the outcome.

use std::future::Future;
use std::time::{Duration, Instant};

use sqlx::{postgres::PgConnection, Connection};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

/// How often and how long to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPolicy {
    pub attempts: u32,
    pub interval: Duration,
    /// Limit for a single probe.
    pub probe_timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            attempts: 6,
            interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl WaitPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            attempts: config.db_wait_attempts.max(1),
            interval: Duration::from_secs(config.db_wait_interval_secs),
            probe_timeout: config.connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The database answered on attempt number `attempt`.
    Ready { attempt: u32, latency: Duration },
    /// Every attempt failed.
    Unreachable { attempts: u32, last_error: String },
    /// The URL can never work, so nothing was attempted.
    Skipped { reason: String },
}

impl WaitOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, WaitOutcome::Ready { .. })
    }
}

/// Whether a connection string names a Postgres database.
pub fn is_postgres_url(url: &str) -> bool {
    url.starts_with("postgres")
}

/// Probes the database until it answers or the policy runs out.
///
/// # Arguments
/// * `url` - Connection string, `None` when the environment has none
/// * `policy` - Attempt count, spacing and per-probe limit
///
/// # Returns
/// How the wait ended. A missing or non-postgres URL is reported as
/// [`WaitOutcome::Skipped`] without any connection attempt.
pub async fn wait_for_database(url: Option<&str>, policy: &WaitPolicy) -> WaitOutcome {
    let Some(url) = url else {
        let reason = "no database connection string configured".to_string();
        tracing::warn!(reason = %reason, "skipping database wait");
        return WaitOutcome::Skipped { reason };
    };
    if !is_postgres_url(url) {
        let reason = "connection string is not a postgres URL".to_string();
        tracing::warn!(reason = %reason, "skipping database wait");
        return WaitOutcome::Skipped { reason };
    }
    let timeout = policy.probe_timeout;
    wait_with(policy, |_| check_connection(url, timeout)).await
}

/// Runs `probe` up to `policy.attempts` times, `policy.interval` apart,
/// stopping at the first success.
pub async fn wait_with<F, Fut>(policy: &WaitPolicy, mut probe: F) -> WaitOutcome
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AppResult<Duration>>,
{
    let mut last_error = String::new();
    for attempt in 1..=policy.attempts {
        match probe(attempt).await {
            Ok(latency) => {
                tracing::info!(
                    attempt,
                    latency_ms = latency.as_millis() as u64,
                    "database is ready"
                );
                return WaitOutcome::Ready { attempt, latency };
            }
            Err(e) => {
                tracing::warn!(
                    attempt,
                    max_attempts = policy.attempts,
                    error = %e,
                    "database not ready"
                );
                last_error = e.to_string();
            }
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    tracing::error!(attempts = policy.attempts, "database still unreachable, continuing anyway");
    WaitOutcome::Unreachable {
        attempts: policy.attempts,
        last_error,
    }
}

/// Opens one connection, runs `SELECT 1` and returns how long it took.
pub async fn check_connection(url: &str, timeout: Duration) -> AppResult<Duration> {
    let started = Instant::now();
    let probe = async {
        let mut conn = PgConnection::connect(url).await?;
        sqlx::query("SELECT 1").execute(&mut conn).await?;
        conn.close().await?;
        Ok::<_, sqlx::Error>(())
    };

    match tokio::time::timeout(timeout, probe).await {
        Ok(Ok(())) => Ok(started.elapsed()),
        Ok(Err(e)) => Err(AppError::DatabaseConnection(e.to_string())),
        Err(_) => Err(AppError::DatabaseConnection(format!(
            "no answer within {}s",
            timeout.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(attempts: u32, interval: Duration) -> WaitPolicy {
        WaitPolicy {
            attempts,
            interval,
            probe_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = WaitPolicy::default();
        assert_eq!(policy.attempts, 6);
        assert_eq!(policy.interval, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_stops_on_first_success() {
        let calls = AtomicU32::new(0);
        let outcome = wait_with(&policy(6, Duration::ZERO), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(AppError::DatabaseConnection("refused".into()))
                } else {
                    Ok(Duration::from_millis(2))
                }
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            outcome,
            WaitOutcome::Ready {
                attempt: 3,
                latency: Duration::from_millis(2)
            }
        );
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let outcome = wait_with(&policy(6, Duration::ZERO), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::DatabaseConnection("refused".into())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert!(!outcome.is_ready());
        assert!(matches!(outcome, WaitOutcome::Unreachable { attempts: 6, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_are_spaced_by_interval() {
        let started = tokio::time::Instant::now();
        let outcome = wait_with(&policy(6, Duration::from_secs(5)), |_| async {
            Err(AppError::DatabaseConnection("refused".into()))
        })
        .await;

        assert!(!outcome.is_ready());
        assert_eq!(started.elapsed(), Duration::from_secs(25));
    }

    #[tokio::test]
    async fn test_non_postgres_url_is_skipped() {
        let outcome =
            wait_for_database(Some("mysql://localhost/registry"), &WaitPolicy::default()).await;
        assert!(matches!(outcome, WaitOutcome::Skipped { .. }));

        let outcome = wait_for_database(Some("NO VALUE FOUND!"), &WaitPolicy::default()).await;
        assert!(matches!(outcome, WaitOutcome::Skipped { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_url_is_skipped_without_waiting() {
        let started = tokio::time::Instant::now();
        let outcome = wait_for_database(None, &WaitPolicy::default()).await;

        assert!(matches!(outcome, WaitOutcome::Skipped { .. }));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_is_postgres_url() {
        assert!(is_postgres_url("postgres://u:p@localhost:5432/db"));
        assert!(is_postgres_url("postgresql://localhost/db"));
        assert!(!is_postgres_url("sqlite::memory:"));
        assert!(!is_postgres_url(""));
    }
}
