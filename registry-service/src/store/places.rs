//! Place queries and the transactional place writer used by the loader.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use common::errors::{AppError, AppResult};
use common::geometry_loader::{PlaceRecord, PlaceSink};
use common::models::{Place, PlaceAlias, PlaceType};

use super::{PgStore, PlaceRow, PLACE_COLUMNS};

impl PgStore {
    /// Finds a place by name, abbreviation or alias, case-insensitively.
    ///
    /// `parent` narrows the match to places whose parent has that name or
    /// abbreviation.
    pub async fn lookup_by_name(
        &self,
        name: &str,
        place_type: Option<PlaceType>,
        parent: Option<&str>,
    ) -> AppResult<Option<Place>> {
        let sql = format!(
            "SELECT {PLACE_COLUMNS}
             FROM places p
             LEFT JOIN places parent ON parent.id = p.parent_id
             WHERE ($1::text IS NULL OR p.place_type = $1)
               AND (lower(p.external_name) = lower($2)
                    OR lower(p.abbreviated_name) = lower($2)
                    OR EXISTS (SELECT 1 FROM place_aliases a
                               WHERE a.place_id = p.id AND lower(a.name) = lower($2)))
               AND ($3::text IS NULL
                    OR lower(parent.external_name) = lower($3)
                    OR lower(parent.abbreviated_name) = lower($3))
             ORDER BY p.id
             LIMIT 1"
        );
        let row: Option<PlaceRow> = sqlx::query_as(&sql)
            .bind(place_type.map(|t| t.as_str()))
            .bind(name)
            .bind(parent)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Place::try_from).transpose()
    }

    /// Finds a US postal code. ZIP+4 codes are looked up by their first five digits.
    pub async fn lookup_postcode(&self, code: &str) -> AppResult<Option<Place>> {
        let zip: String = code.chars().take(5).collect();
        self.find_by_external_id(&zip, Some(PlaceType::PostalCode)).await
    }

    pub async fn find_by_external_id(
        &self,
        external_id: &str,
        place_type: Option<PlaceType>,
    ) -> AppResult<Option<Place>> {
        let sql = format!(
            "SELECT {PLACE_COLUMNS}
             FROM places p
             LEFT JOIN places parent ON parent.id = p.parent_id
             WHERE p.external_id = $1 AND ($2::text IS NULL OR p.place_type = $2)
             ORDER BY p.id
             LIMIT 1"
        );
        let row: Option<PlaceRow> = sqlx::query_as(&sql)
            .bind(external_id)
            .bind(place_type.map(|t| t.as_str()))
            .fetch_optional(&self.pool)
            .await?;
        row.map(Place::try_from).transpose()
    }

    /// The place covering the whole world, created on first use.
    pub async fn everywhere(&self) -> AppResult<Place> {
        sqlx::query(
            "INSERT INTO places (external_id, external_name, place_type)
             VALUES ($1, 'Everywhere', 'everywhere')
             ON CONFLICT DO NOTHING",
        )
        .bind(Place::EVERYWHERE_EXTERNAL_ID)
        .execute(&self.pool)
        .await?;

        self.find_by_external_id(Place::EVERYWHERE_EXTERNAL_ID, Some(PlaceType::Everywhere))
            .await?
            .ok_or_else(|| AppError::Internal("everywhere place missing after insert".to_string()))
    }

    /// Starts a transaction for loading places.
    pub async fn place_writer(&self) -> AppResult<PgPlaceWriter> {
        let tx = self.pool.begin().await?;
        Ok(PgPlaceWriter { tx })
    }
}

/// Writes places inside one transaction. Nothing is visible until [`commit`](Self::commit).
pub struct PgPlaceWriter {
    tx: Transaction<'static, Postgres>,
}

impl PgPlaceWriter {
    pub async fn commit(self) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn fetch(&mut self, id: i64) -> AppResult<Place> {
        let sql = format!(
            "SELECT {PLACE_COLUMNS}
             FROM places p
             LEFT JOIN places parent ON parent.id = p.parent_id
             WHERE p.id = $1"
        );
        let row: PlaceRow = sqlx::query_as(&sql).bind(id).fetch_one(&mut *self.tx).await?;
        Place::try_from(row)
    }
}

#[async_trait]
impl PlaceSink for PgPlaceWriter {
    async fn upsert_place(
        &mut self,
        record: &PlaceRecord,
        parent: Option<&Place>,
    ) -> AppResult<(Place, bool)> {
        let parent_id = parent.map(|p| p.id);
        let geometry = record.geometry.to_string();

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM places
             WHERE external_id = $1 AND place_type = $2 AND parent_id IS NOT DISTINCT FROM $3",
        )
        .bind(&record.external_id)
        .bind(record.place_type.as_str())
        .bind(parent_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let (id, is_new) = match existing {
            Some(id) => {
                sqlx::query(
                    "UPDATE places
                     SET external_name = $2, abbreviated_name = $3,
                         geometry = ST_SetSRID(ST_GeomFromGeoJSON($4), 4326)
                     WHERE id = $1",
                )
                .bind(id)
                .bind(&record.name)
                .bind(&record.abbreviated_name)
                .bind(&geometry)
                .execute(&mut *self.tx)
                .await?;
                (id, false)
            }
            None => {
                let id: i64 = sqlx::query_scalar(
                    "INSERT INTO places
                         (external_id, external_name, place_type, abbreviated_name, parent_id, geometry)
                     VALUES ($1, $2, $3, $4, $5, ST_SetSRID(ST_GeomFromGeoJSON($6), 4326))
                     RETURNING id",
                )
                .bind(&record.external_id)
                .bind(&record.name)
                .bind(record.place_type.as_str())
                .bind(&record.abbreviated_name)
                .bind(parent_id)
                .bind(&geometry)
                .fetch_one(&mut *self.tx)
                .await?;
                (id, true)
            }
        };

        Ok((self.fetch(id).await?, is_new))
    }

    async fn add_place_alias(&mut self, place: &Place, alias: &PlaceAlias) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO place_aliases (place_id, name, language)
             SELECT $1, $2, $3
             WHERE NOT EXISTS (
                 SELECT 1 FROM place_aliases
                 WHERE place_id = $1 AND name = $2 AND language IS NOT DISTINCT FROM $3
             )",
        )
        .bind(place.id)
        .bind(&alias.name)
        .bind(&alias.language)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}
