//! Place import from NDJSON.
//!
//! The input is a sequence of line pairs: a metadata object followed by a
//! GeoJSON geometry, as produced by `geojson-places-us`. An empty metadata line
//! ends the input.
//!
//! ```text
//! {"id": "NY", "type": "state", "parent_id": "US", "name": "New York", "abbreviated_name": "NY"}
//! {"type": "Polygon", "coordinates": [...]}
//! ```
//!
//! Parents must appear before their children. Existing places are updated in
//! place, and their aliases are only ever added to.

use std::collections::HashMap;
use std::io::BufRead;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::{AppError, AppResult};
use crate::models::place::{Place, PlaceAlias, PlaceType};

/// One parsed metadata/geometry pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceRecord {
    pub external_id: String,
    pub place_type: PlaceType,
    pub parent_external_id: Option<String>,
    pub name: String,
    pub abbreviated_name: Option<String>,
    pub aliases: Vec<PlaceAlias>,
    pub geometry: serde_json::Value,
}

#[derive(Clone, Deserialize)]
#[serde(untagged)]
enum ExternalId {
    Text(String),
    Number(i64),
}

impl From<ExternalId> for String {
    fn from(id: ExternalId) -> Self {
        match id {
            ExternalId::Text(s) => s,
            ExternalId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct Metadata {
    id: ExternalId,
    #[serde(rename = "type")]
    place_type: PlaceType,
    #[serde(default)]
    parent_id: Option<ExternalId>,
    name: String,
    #[serde(default)]
    aliases: Vec<PlaceAlias>,
    #[serde(default)]
    abbreviated_name: Option<String>,
}

/// Parses one metadata line and its geometry line.
pub fn parse_record(metadata: &str, geometry: &str) -> AppResult<PlaceRecord> {
    let meta: Metadata = serde_json::from_str(metadata)
        .map_err(|e| AppError::PlaceData(format!("bad metadata: {e}")))?;
    let geometry: serde_json::Value = serde_json::from_str(geometry).map_err(|e| {
        AppError::PlaceData(format!(
            "bad geometry for place {}: {e}",
            String::from(meta.id.clone())
        ))
    })?;
    if !geometry.is_object() {
        return Err(AppError::PlaceData("geometry must be a GeoJSON object".to_string()));
    }

    Ok(PlaceRecord {
        external_id: meta.id.into(),
        place_type: meta.place_type,
        parent_external_id: meta.parent_id.map(String::from).filter(|p| !p.is_empty()),
        name: meta.name,
        abbreviated_name: meta.abbreviated_name,
        aliases: meta.aliases,
        geometry,
    })
}

/// Iterator over the records of an NDJSON document.
pub struct NdjsonRecords<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
    done: bool,
}

impl<R: BufRead> NdjsonRecords<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            done: false,
        }
    }

    fn next_line(&mut self) -> Option<AppResult<String>> {
        self.line_no += 1;
        self.lines.next().map(|line| {
            line.map(|l| l.trim().to_string())
                .map_err(|e| AppError::PlaceData(format!("line {}: {e}", self.line_no)))
        })
    }
}

impl<R: BufRead> Iterator for NdjsonRecords<R> {
    type Item = AppResult<PlaceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let metadata = match self.next_line() {
            Some(Ok(line)) if !line.is_empty() => line,
            Some(Err(e)) => {
                self.done = true;
                return Some(Err(e));
            }
            _ => {
                self.done = true;
                return None;
            }
        };
        let metadata_line = self.line_no;
        let geometry = match self.next_line() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                self.done = true;
                return Some(Err(e));
            }
            None => {
                self.done = true;
                return Some(Err(AppError::PlaceData(format!(
                    "line {metadata_line}: metadata without a geometry line"
                ))));
            }
        };
        Some(parse_record(&metadata, &geometry).map_err(|e| match e {
            AppError::PlaceData(msg) => AppError::PlaceData(format!("line {metadata_line}: {msg}")),
            other => other,
        }))
    }
}

/// Where loaded places are stored.
#[async_trait]
pub trait PlaceSink: Send {
    /// Gets or creates the place identified by external id, type and parent,
    /// then overwrites its name, abbreviation and geometry. Returns the place
    /// and whether it was created.
    async fn upsert_place(
        &mut self,
        record: &PlaceRecord,
        parent: Option<&Place>,
    ) -> AppResult<(Place, bool)>;

    /// Adds an alias unless the place already has it.
    async fn add_place_alias(&mut self, place: &Place, alias: &PlaceAlias) -> AppResult<()>;
}

/// Counts reported after a load.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub created: usize,
    pub updated: usize,
}

/// Loads place records into a [`PlaceSink`], resolving parents among the
/// places loaded so far.
pub struct GeometryLoader<S> {
    sink: S,
    places_by_external_id: HashMap<String, Place>,
}

impl<S: PlaceSink> GeometryLoader<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            places_by_external_id: HashMap::new(),
        }
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Loads one record.
    pub async fn load(&mut self, record: &PlaceRecord) -> AppResult<(Place, bool)> {
        let parent = match &record.parent_external_id {
            Some(parent_id) => {
                let parent = self.places_by_external_id.get(parent_id).cloned();
                Some(parent.ok_or_else(|| {
                    AppError::PlaceData(format!(
                        "place {} refers to unknown parent {parent_id}",
                        record.external_id
                    ))
                })?)
            }
            None => None,
        };

        let (place, is_new) = self.sink.upsert_place(record, parent.as_ref()).await?;
        for alias in &record.aliases {
            self.sink.add_place_alias(&place, alias).await?;
        }

        tracing::debug!(
            external_id = %record.external_id,
            place_type = %record.place_type,
            is_new,
            "loaded place"
        );
        self.places_by_external_id
            .insert(record.external_id.clone(), place.clone());
        Ok((place, is_new))
    }

    /// Loads every record of an NDJSON document, stopping at the first error.
    pub async fn load_ndjson<R: BufRead>(&mut self, reader: R) -> AppResult<LoadSummary> {
        let mut summary = LoadSummary::default();
        for record in NdjsonRecords::new(reader) {
            let (_, is_new) = self.load(&record?).await?;
            if is_new {
                summary.created += 1;
            } else {
                summary.updated += 1;
            }
        }
        tracing::info!(created = summary.created, updated = summary.updated, "place load finished");
        Ok(summary)
    }
}
