//! Library queries.

use std::collections::HashSet;

use uuid::Uuid;

use common::errors::{AppError, AppResult};
use common::models::library::{normalize_short_name, parse_urn, random_short_name, ServiceArea};
use common::models::{
    CreateLibraryRequest, Library, LibraryMatch, LibraryStage, Location, Place, PlaceType,
    ServiceAreaKind, UpdateStageRequest,
};
use common::response::Pagination;

use super::{
    distance_expr, into_matches, stage_filter, unique_violation, LibraryRow, MatchRow, PgStore,
    PlaceRow, LIBRARY_COLUMNS, PLACE_SUMMARY_COLUMNS,
};

#[derive(sqlx::FromRow)]
struct ServiceAreaRow {
    kind: String,
    #[sqlx(flatten)]
    place: PlaceRow,
}

impl PgStore {
    /// Registers a library in the testing stage.
    ///
    /// Without a short name a random unused one is generated.
    pub async fn create_library(&self, req: &CreateLibraryRequest) -> AppResult<Library> {
        let short_name = match &req.short_name {
            Some(name) => normalize_short_name(name)?,
            None => {
                let taken: Vec<String> = sqlx::query_scalar(
                    "SELECT short_name FROM libraries WHERE short_name IS NOT NULL",
                )
                .fetch_all(&self.pool)
                .await?;
                let taken: HashSet<String> = taken.into_iter().collect();
                let mut rng = rand::thread_rng();
                random_short_name(&mut rng, |candidate| taken.contains(candidate))?
            }
        };

        let mut tx = self.pool.begin().await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO libraries (uuid, name, short_name, description, opds_url, web_url)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(&req.name)
        .bind(&short_name)
        .bind(&req.description)
        .bind(&req.opds_url)
        .bind(&req.web_url)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, "a library with this short name or OPDS URL"))?;

        for alias in &req.aliases {
            sqlx::query(
                "INSERT INTO library_aliases (library_id, name) VALUES ($1, $2)
                 ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(alias)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::info!(library_id = id, short_name = %short_name, "图书馆已注册");
        self.library_by_id(id).await
    }

    pub async fn library_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Library>> {
        let sql = format!("SELECT {LIBRARY_COLUMNS} FROM libraries l WHERE l.uuid = $1");
        let row: Option<LibraryRow> = sqlx::query_as(&sql)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.with_details(row.try_into()?).await?)),
            None => Ok(None),
        }
    }

    /// Looks a library up by its `urn:uuid:` identifier.
    pub async fn library_by_urn(&self, urn: &str) -> AppResult<Option<Library>> {
        match parse_urn(urn) {
            Some(uuid) => self.library_by_uuid(uuid).await,
            None => Ok(None),
        }
    }

    /// Short names are stored uppercase, so the lookup is case-insensitive.
    pub async fn library_by_short_name(&self, short_name: &str) -> AppResult<Option<Library>> {
        let sql = format!("SELECT {LIBRARY_COLUMNS} FROM libraries l WHERE l.short_name = $1");
        let row: Option<LibraryRow> = sqlx::query_as(&sql)
            .bind(short_name.to_uppercase())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.with_details(row.try_into()?).await?)),
            None => Ok(None),
        }
    }

    async fn library_by_id(&self, id: i64) -> AppResult<Library> {
        let sql = format!("SELECT {LIBRARY_COLUMNS} FROM libraries l WHERE l.id = $1");
        let row: LibraryRow = sqlx::query_as(&sql).bind(id).fetch_one(&self.pool).await?;
        self.with_details(row.try_into()?).await
    }

    async fn require_library(&self, uuid: Uuid) -> AppResult<Library> {
        self.library_by_uuid(uuid)
            .await?
            .ok_or_else(|| AppError::LibraryNotFound(uuid.to_string()))
    }

    /// Libraries alphabetically, one page at a time. Without `production_only`
    /// every stage is listed, cancelled included.
    pub async fn list_libraries(
        &self,
        production_only: bool,
        page: u32,
        page_size: u32,
    ) -> AppResult<(Vec<Library>, Pagination)> {
        let condition = if production_only { stage_filter(true) } else { "true" };
        let count_sql = format!("SELECT COUNT(*) FROM libraries l WHERE {condition}");
        let total: i64 = sqlx::query_scalar(&count_sql).fetch_one(&self.pool).await?;
        let pagination = Pagination::new(page, page_size, total.max(0) as u64);

        let sql = format!(
            "SELECT {LIBRARY_COLUMNS} FROM libraries l WHERE {condition}
             ORDER BY l.name, l.id LIMIT $1 OFFSET $2"
        );
        let rows: Vec<LibraryRow> = sqlx::query_as(&sql)
            .bind(i64::from(pagination.page_size))
            .bind(pagination.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut libraries = Vec::with_capacity(rows.len());
        for row in rows {
            libraries.push(self.with_details(row.try_into()?).await?);
        }
        Ok((libraries, pagination))
    }

    /// Applies stage changes. The registry stage is applied first, so the
    /// registry can take a library out of production and let the library
    /// choose its own stage again in the same request.
    pub async fn update_stage(&self, uuid: Uuid, req: &UpdateStageRequest) -> AppResult<Library> {
        let mut library = self.require_library(uuid).await?;
        if let Some(stage) = req.registry_stage {
            library.set_registry_stage(stage);
        }
        if let Some(stage) = req.library_stage {
            library.set_library_stage(stage)?;
        }

        sqlx::query("UPDATE libraries SET registry_stage = $2, library_stage = $3 WHERE id = $1")
            .bind(library.id)
            .bind(library.registry_stage.as_str())
            .bind(library.library_stage.as_str())
            .execute(&self.pool)
            .await?;

        tracing::info!(
            library = %library.uuid,
            registry_stage = %library.registry_stage.as_str(),
            library_stage = %library.library_stage.as_str(),
            "图书馆阶段已更新"
        );
        self.library_by_id(library.id).await
    }

    pub async fn set_registry_stage(&self, uuid: Uuid, stage: LibraryStage) -> AppResult<Library> {
        let req = UpdateStageRequest {
            registry_stage: Some(stage),
            library_stage: None,
        };
        self.update_stage(uuid, &req).await
    }

    pub async fn set_library_stage(&self, uuid: Uuid, stage: LibraryStage) -> AppResult<Library> {
        let req = UpdateStageRequest {
            registry_stage: None,
            library_stage: Some(stage),
        };
        self.update_stage(uuid, &req).await
    }

    pub async fn add_library_alias(&self, uuid: Uuid, alias: &str) -> AppResult<Library> {
        let library = self.require_library(uuid).await?;
        sqlx::query(
            "INSERT INTO library_aliases (library_id, name)
             SELECT $1, $2
             WHERE NOT EXISTS (SELECT 1 FROM library_aliases WHERE library_id = $1 AND name = $2)",
        )
        .bind(library.id)
        .bind(alias)
        .execute(&self.pool)
        .await?;
        self.library_by_id(library.id).await
    }

    /// Attaches a place to a library. Attaching the same place twice is a no-op.
    pub async fn add_service_area(
        &self,
        uuid: Uuid,
        place_external_id: &str,
        kind: ServiceAreaKind,
    ) -> AppResult<Library> {
        let library = self.require_library(uuid).await?;
        let place = if place_external_id == Place::EVERYWHERE_EXTERNAL_ID {
            self.everywhere().await?
        } else {
            self.find_by_external_id(place_external_id, None)
                .await?
                .ok_or_else(|| AppError::PlaceNotFound(place_external_id.to_string()))?
        };

        sqlx::query(
            "INSERT INTO service_areas (library_id, place_id, kind)
             VALUES ($1, $2, $3)
             ON CONFLICT DO NOTHING",
        )
        .bind(library.id)
        .bind(place.id)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;

        self.library_by_id(library.id).await
    }

    async fn with_details(&self, mut library: Library) -> AppResult<Library> {
        library.aliases = sqlx::query_scalar(
            "SELECT name FROM library_aliases WHERE library_id = $1 ORDER BY name",
        )
        .bind(library.id)
        .fetch_all(&self.pool)
        .await?;

        let sql = format!(
            "SELECT sa.kind, {PLACE_SUMMARY_COLUMNS}
             FROM service_areas sa
             JOIN places p ON p.id = sa.place_id
             LEFT JOIN places parent ON parent.id = p.parent_id
             WHERE sa.library_id = $1
             ORDER BY sa.kind, p.external_name"
        );
        let rows: Vec<ServiceAreaRow> = sqlx::query_as(&sql)
            .bind(library.id)
            .fetch_all(&self.pool)
            .await?;
        library.service_areas = rows
            .into_iter()
            .map(|row| {
                Ok(ServiceArea {
                    kind: row.kind.parse()?,
                    place: row.place.try_into()?,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;
        Ok(library)
    }

    /// Libraries with a service area of any kind within `radius_km` of
    /// `location`, nearest first.
    ///
    /// With `production` only libraries in production on both sides are
    /// returned. Otherwise anything not cancelled is.
    pub async fn nearby(
        &self,
        location: &Location,
        radius_km: f64,
        production: bool,
        limit: usize,
    ) -> AppResult<Vec<LibraryMatch>> {
        let distance = distance_expr("p.geometry", "ST_GeomFromEWKT($1)");
        let sql = format!(
            "SELECT {LIBRARY_COLUMNS}, MIN({distance}) AS distance
             FROM libraries l
             JOIN service_areas sa ON sa.library_id = l.id
             JOIN places p ON p.id = sa.place_id
             WHERE {stage}
               AND p.geometry IS NOT NULL
               AND ST_DWithin(p.geometry::geography, ST_GeomFromEWKT($1)::geography, $2)
             GROUP BY l.id
             ORDER BY distance, l.name
             LIMIT $3",
            stage = stage_filter(production),
        );
        let rows: Vec<MatchRow> = sqlx::query_as(&sql)
            .bind(location.to_ewkt())
            .bind(radius_km * 1000.0)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        into_matches(rows)
    }

    /// Production libraries focused on a state, nation or everywhere within
    /// `radius_km` of `location`, nearest first.
    pub async fn nearest_supralocals(
        &self,
        location: &Location,
        radius_km: f64,
        limit: usize,
    ) -> AppResult<Vec<LibraryMatch>> {
        let distance = distance_expr("p.geometry", "ST_GeomFromEWKT($1)");
        let sql = format!(
            "SELECT {LIBRARY_COLUMNS}, MIN({distance}) AS distance
             FROM libraries l
             JOIN service_areas sa ON sa.library_id = l.id AND sa.kind = 'focus'
             JOIN places p ON p.id = sa.place_id
             WHERE {stage}
               AND p.place_type = ANY($2)
               AND (p.geometry IS NULL
                    OR ST_DWithin(p.geometry::geography, ST_GeomFromEWKT($1)::geography, $3))
             GROUP BY l.id
             ORDER BY distance, l.name
             LIMIT $4",
            stage = stage_filter(true),
        );
        let rows: Vec<MatchRow> = sqlx::query_as(&sql)
            .bind(location.to_ewkt())
            .bind(scope_types(false))
            .bind(radius_km * 1000.0)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        into_matches(rows)
    }

    /// Production libraries focused on places of `types` within `radius_m`
    /// of the place with id `target_id`, nearest first.
    pub(super) async fn near_place(
        &self,
        target_id: i64,
        types: Vec<String>,
        radius_m: f64,
        limit: usize,
    ) -> AppResult<Vec<LibraryMatch>> {
        let distance = distance_expr("p.geometry", "target.geometry");
        let sql = format!(
            "SELECT {LIBRARY_COLUMNS}, MIN({distance}) AS distance
             FROM libraries l
             JOIN service_areas sa ON sa.library_id = l.id AND sa.kind = 'focus'
             JOIN places p ON p.id = sa.place_id
             JOIN places target ON target.id = $1
             WHERE {stage}
               AND p.place_type = ANY($2)
               AND (p.geometry IS NULL OR target.geometry IS NULL
                    OR ST_DWithin(p.geometry::geography, target.geometry::geography, $3))
             GROUP BY l.id
             ORDER BY distance, l.name
             LIMIT $4",
            stage = stage_filter(true),
        );
        let rows: Vec<MatchRow> = sqlx::query_as(&sql)
            .bind(target_id)
            .bind(types)
            .bind(radius_m)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        into_matches(rows)
    }

    /// Production libraries with a service area intersecting any of `place_ids`.
    pub(super) async fn in_places(
        &self,
        place_ids: Vec<i64>,
        limit: usize,
    ) -> AppResult<Vec<LibraryMatch>> {
        let sql = format!(
            "SELECT {LIBRARY_COLUMNS}, NULL::float8 AS distance
             FROM libraries l
             JOIN service_areas sa ON sa.library_id = l.id
             JOIN places p ON p.id = sa.place_id
             JOIN places target ON target.id = ANY($1)
             WHERE {stage}
               AND (p.id = target.id OR p.geometry IS NULL OR target.geometry IS NULL
                    OR ST_Intersects(p.geometry, target.geometry))
             GROUP BY l.id
             ORDER BY l.name
             LIMIT $2",
            stage = stage_filter(true),
        );
        let rows: Vec<MatchRow> = sqlx::query_as(&sql)
            .bind(place_ids)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        into_matches(rows)
    }

    /// Production libraries matching `name`.
    ///
    /// The name itself ranks first, then aliases, then the description. Names
    /// of 6 to 255 characters also match within an edit distance of two.
    pub(super) async fn matching_name(
        &self,
        name: &str,
        location: Option<&Location>,
        limit: usize,
    ) -> AppResult<Vec<LibraryMatch>> {
        let distance = distance_expr("p.geometry", "ST_GeomFromEWKT($2)");
        let sql = format!(
            "SELECT {LIBRARY_COLUMNS},
                    CASE WHEN $2::text IS NULL THEN NULL ELSE (
                        SELECT MIN({distance})
                        FROM service_areas sa JOIN places p ON p.id = sa.place_id
                        WHERE sa.library_id = l.id
                    ) END AS distance
             FROM (
                 SELECT l.id, MIN(m.rank) AS rank
                 FROM libraries l
                 JOIN LATERAL (
                     SELECT 1 AS rank
                     WHERE lower(l.name) = lower($1)
                        OR CASE WHEN length(l.name) BETWEEN 6 AND 255
                                THEN levenshtein(lower(l.name), lower($1)) <= 2 ELSE false END
                        OR (length($1) >= 4 AND l.name ILIKE '%' || $1 || '%')
                     UNION ALL
                     SELECT 2 FROM library_aliases a
                     WHERE a.library_id = l.id
                       AND (lower(a.name) = lower($1)
                            OR CASE WHEN length(a.name) BETWEEN 6 AND 255
                                    THEN levenshtein(lower(a.name), lower($1)) <= 2 ELSE false END)
                     UNION ALL
                     SELECT 3
                     WHERE length($1) >= 4 AND l.description ILIKE '%' || $1 || '%'
                 ) m ON true
                 WHERE {stage}
                 GROUP BY l.id
             ) ranked
             JOIN libraries l ON l.id = ranked.id
             ORDER BY distance NULLS LAST, ranked.rank, l.name
             LIMIT $3",
            stage = stage_filter(true),
        );
        let rows: Vec<MatchRow> = sqlx::query_as(&sql)
            .bind(name)
            .bind(location.map(Location::to_ewkt))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        into_matches(rows)
    }

    /// Distance in metres from `location` to the place with id `place_id`.
    pub(super) async fn place_distance(
        &self,
        place_id: i64,
        location: &Location,
    ) -> AppResult<Option<f64>> {
        let distance: Option<Option<f64>> = sqlx::query_scalar(
            "SELECT ST_Distance(geometry::geography, ST_GeomFromEWKT($2)::geography)
             FROM places WHERE id = $1",
        )
            .bind(place_id)
            .bind(location.to_ewkt())
            .fetch_optional(&self.pool)
            .await?;
        Ok(distance.map(|d| d.unwrap_or(0.0)))
    }
}

/// Place type names bound as a text array.
pub(super) fn scope_types(local: bool) -> Vec<String> {
    let names = if local {
        PlaceType::local_names()
    } else {
        PlaceType::supralocal_names()
    };
    names.iter().map(|name| name.to_string()).collect()
}
