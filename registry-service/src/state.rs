//! Application state for the registry service.

use std::sync::Arc;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use common::config::{AppConfig, PRODUCTION_DATABASE_ENV};
use common::errors::{AppError, AppResult};
use common::middleware::AdminSessions;
use common::search::{SearchEngine, SearchSettings};

use crate::store::PgStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: PgStore,
    pub engine: Arc<SearchEngine<PgStore>>,
    pub sessions: AdminSessions,
}

impl AppState {
    pub fn new(config: AppConfig, pool: PgPool) -> Self {
        let store = PgStore::new(pool);
        let settings = SearchSettings {
            max_radius_km: config.search_radius_km,
            nearby_radius_km: config.nearby_radius_km,
            ..SearchSettings::default()
        };
        Self {
            engine: Arc::new(SearchEngine::new(store.clone(), settings)),
            sessions: AdminSessions::new(config.session_ttl()),
            store,
            config,
        }
    }
}

/// Builds the pool without connecting, so the service can start while the
/// database is still down.
pub fn lazy_pool(config: &AppConfig) -> AppResult<PgPool> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| AppError::Config(format!("{PRODUCTION_DATABASE_ENV} is not set")))?;
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout())
        .connect_lazy(url)
        .map_err(|e| AppError::Config(format!("invalid database URL: {e}")))
}

/// Returns the configured pool, or a closed one when the connection string
/// is missing or unusable.
///
/// Every query on a closed pool fails with `PoolClosed`, which surfaces as
/// 503 `DATABASE_UNAVAILABLE` while health reports `database: false`.
pub async fn pool_or_detached(config: &AppConfig) -> PgPool {
    match lazy_pool(config) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(error = %e, "数据库未配置，服务以降级模式运行");
            let pool = PgPoolOptions::new()
                .max_connections(1)
                .connect_lazy_with(PgConnectOptions::new());
            pool.close().await;
            pool
        }
    }
}
