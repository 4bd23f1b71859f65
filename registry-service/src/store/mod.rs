//! Postgres persistence.
//!
//! [`PgStore`] owns the connection pool. Its methods are split by table
//! family across the submodules; [`finder`] implements the search engine's
//! data access on top of them.

mod admins;
mod finder;
mod libraries;
mod places;

pub use places::PgPlaceWriter;

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use common::errors::{AppError, AppResult};
use common::models::{Library, LibraryMatch, LibraryStage, Place, PlaceType};

/// Embedded schema migrations.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Columns selected for a library, aliased `l`.
const LIBRARY_COLUMNS: &str = "l.id, l.uuid, l.name, l.short_name, l.description, l.opds_url, \
     l.web_url, l.registry_stage, l.library_stage, l.timestamp";

/// Columns selected for a place aliased `p` with its parent aliased `parent`.
const PLACE_COLUMNS: &str = "p.id, p.external_id, p.external_name, p.place_type, \
     p.abbreviated_name, p.parent_id, parent.abbreviated_name AS parent_abbreviation, \
     ST_AsGeoJSON(p.geometry) AS geometry";

/// Like [`PLACE_COLUMNS`] without the geometry, for places embedded in a library.
const PLACE_SUMMARY_COLUMNS: &str = "p.id, p.external_id, p.external_name, p.place_type, \
     p.abbreviated_name, p.parent_id, parent.abbreviated_name AS parent_abbreviation, \
     NULL::text AS geometry";

/// Geography distance in metres between two geometry expressions. A missing
/// geometry belongs to the `everywhere` place and counts as distance zero.
fn distance_expr(a: &str, b: &str) -> String {
    format!("COALESCE(ST_Distance(({a})::geography, ({b})::geography), 0)")
}

/// Stage condition on libraries aliased `l`.
///
/// Production searches need both stages in production. Otherwise anything
/// not cancelled on either side qualifies.
fn stage_filter(production: bool) -> &'static str {
    if production {
        "l.registry_stage = 'production' AND l.library_stage = 'production'"
    } else {
        "l.registry_stage <> 'cancelled' AND l.library_stage <> 'cancelled'"
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies pending migrations.
    pub async fn migrate(&self) -> AppResult<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Migration(e.to_string()))?;
        tracing::info!("数据库迁移完成");
        Ok(())
    }

    /// Whether the database answers within `timeout`.
    pub async fn ping(&self, timeout: Duration) -> bool {
        let query = sqlx::query("SELECT 1").execute(&self.pool);
        matches!(tokio::time::timeout(timeout, query).await, Ok(Ok(_)))
    }
}

/// Maps unique-constraint violations to [`AppError::Conflict`].
fn unique_violation(e: sqlx::Error, what: &str) -> AppError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("{what} already exists"))
        }
        _ => AppError::from(e),
    }
}

#[derive(sqlx::FromRow)]
struct LibraryRow {
    id: i64,
    uuid: Uuid,
    name: String,
    short_name: Option<String>,
    description: Option<String>,
    opds_url: Option<String>,
    web_url: Option<String>,
    registry_stage: String,
    library_stage: String,
    timestamp: DateTime<Utc>,
}

impl TryFrom<LibraryRow> for Library {
    type Error = AppError;

    fn try_from(row: LibraryRow) -> Result<Self, Self::Error> {
        Ok(Library {
            id: row.id,
            uuid: row.uuid,
            name: row.name,
            short_name: row.short_name,
            description: row.description,
            opds_url: row.opds_url,
            web_url: row.web_url,
            registry_stage: row.registry_stage.parse::<LibraryStage>()?,
            library_stage: row.library_stage.parse::<LibraryStage>()?,
            timestamp: row.timestamp,
            aliases: Vec::new(),
            service_areas: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct MatchRow {
    #[sqlx(flatten)]
    library: LibraryRow,
    distance: Option<f64>,
}

impl TryFrom<MatchRow> for LibraryMatch {
    type Error = AppError;

    fn try_from(row: MatchRow) -> Result<Self, Self::Error> {
        Ok(LibraryMatch {
            library: row.library.try_into()?,
            distance_m: row.distance,
        })
    }
}

fn into_matches(rows: Vec<MatchRow>) -> AppResult<Vec<LibraryMatch>> {
    rows.into_iter().map(LibraryMatch::try_from).collect()
}

#[derive(sqlx::FromRow)]
struct PlaceRow {
    id: i64,
    external_id: String,
    external_name: String,
    place_type: String,
    abbreviated_name: Option<String>,
    parent_id: Option<i64>,
    parent_abbreviation: Option<String>,
    geometry: Option<String>,
}

impl TryFrom<PlaceRow> for Place {
    type Error = AppError;

    fn try_from(row: PlaceRow) -> Result<Self, Self::Error> {
        let geometry = row
            .geometry
            .map(|g| serde_json::from_str(&g))
            .transpose()
            .map_err(|e| AppError::PlaceData(format!("stored geometry is not GeoJSON: {e}")))?;
        Ok(Place {
            id: row.id,
            external_id: row.external_id,
            external_name: row.external_name,
            place_type: row.place_type.parse::<PlaceType>()?,
            abbreviated_name: row.abbreviated_name,
            parent_id: row.parent_id,
            parent_abbreviation: row.parent_abbreviation,
            geometry,
            aliases: Vec::new(),
        })
    }
}
