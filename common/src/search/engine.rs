//! Search execution.
//!
//! [`SearchEngine`] turns a parsed [`Query`] into library results. Lookups go
//! through a [`LibraryFinder`], so the same assembly rules run against
//! Postgres in production and against in-memory data in tests.

use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use super::query::{GeoTarget, Query, SearchType};
use crate::errors::AppResult;
use crate::models::geo::Location;
use crate::models::library::LibraryMatch;
use crate::models::place::{Place, PlaceType};

/// Which focus areas a place lookup considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaScope {
    /// Postal codes, cities and counties.
    Local,
    /// States, nations and everywhere.
    Supralocal,
}

/// Data access needed by the search engine.
#[async_trait]
pub trait LibraryFinder: Send + Sync {
    /// Finds the place a geotarget names, if it exists.
    async fn resolve_geotarget(&self, target: &GeoTarget) -> AppResult<Option<Place>>;

    /// Distance in metres from `location` to the edge of `place`, zero inside it.
    async fn distance_to_place(
        &self,
        place: &Place,
        location: &Location,
    ) -> AppResult<Option<f64>>;

    /// Production libraries whose focus areas of the given scope lie within
    /// `max_radius_km` of `place`, nearest first.
    async fn libraries_near_place(
        &self,
        place: &Place,
        scope: AreaScope,
        max_radius_km: f64,
        limit: usize,
    ) -> AppResult<Vec<LibraryMatch>>;

    /// Production libraries serving any of `places`, alphabetically.
    async fn libraries_in_places(
        &self,
        places: &[Place],
        limit: usize,
    ) -> AppResult<Vec<LibraryMatch>>;

    /// Production libraries whose name, alias or description matches `name`.
    ///
    /// With a location, results are ordered by distance. Without one, name
    /// matches come before alias matches, which come before description matches.
    async fn libraries_matching_name(
        &self,
        name: &str,
        location: Option<&Location>,
        limit: usize,
    ) -> AppResult<Vec<LibraryMatch>>;

    /// Production libraries whose service areas lie within `max_radius_km` of
    /// `location`, nearest first.
    async fn libraries_near_location(
        &self,
        location: &Location,
        max_radius_km: f64,
        limit: usize,
    ) -> AppResult<Vec<LibraryMatch>>;
}

/// Limits applied while assembling results.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// Only libraries this close to a geotarget are considered.
    pub max_radius_km: f64,
    /// Radius for location-only searches.
    pub nearby_radius_km: f64,
    /// Results for a single place, or for a library name near a location.
    pub short_limit: usize,
    /// Results for several places, or for a library name with no location.
    pub long_limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_radius_km: 300.0,
            nearby_radius_km: 150.0,
            short_limit: 3,
            long_limit: 20,
        }
    }
}

pub struct SearchEngine<F> {
    finder: F,
    settings: SearchSettings,
}

impl<F: LibraryFinder> SearchEngine<F> {
    pub fn new(finder: F, settings: SearchSettings) -> Self {
        Self { finder, settings }
    }

    pub fn finder(&self) -> &F {
        &self.finder
    }

    /// Runs a query and returns the matching libraries in presentation order.
    pub async fn search(&self, query: &Query) -> AppResult<Vec<LibraryMatch>> {
        if !query.is_searchable() {
            return Ok(Vec::new());
        }

        let results = match (query.search_type, query.location.as_ref()) {
            (Some(SearchType::GeoSingle), _) => self.search_single_geotarget(query).await?,
            (Some(SearchType::GeoMultiple), Some(location)) => {
                self.search_multiple_geotargets_near(query, location).await?
            }
            (Some(SearchType::GeoMultiple), None) => self.search_multiple_geotargets(query).await?,
            (Some(SearchType::Libtarget), location) => {
                let limit = if location.is_some() {
                    self.settings.short_limit
                } else {
                    self.settings.long_limit
                };
                self.finder
                    .libraries_matching_name(&query.library_text(), location, limit)
                    .await?
            }
            (None, Some(location)) if query.is_empty() => {
                self.finder
                    .libraries_near_location(
                        location,
                        self.settings.nearby_radius_km,
                        self.settings.long_limit,
                    )
                    .await?
            }
            (None, _) => Vec::new(),
        };

        tracing::info!(
            query = %query.normalized,
            search_type = ?query.search_type,
            results = results.len(),
            "search complete"
        );
        Ok(results)
    }

    async fn search_single_geotarget(&self, query: &Query) -> AppResult<Vec<LibraryMatch>> {
        for target in query.geotargets() {
            if let Some(place) = self.finder.resolve_geotarget(&target).await? {
                return self.libraries_for_place(&place).await;
            }
        }
        Ok(Vec::new())
    }

    async fn search_multiple_geotargets_near(
        &self,
        query: &Query,
        location: &Location,
    ) -> AppResult<Vec<LibraryMatch>> {
        let mut closest: Option<(f64, Place)> = None;
        for place in self.resolve_all(query).await? {
            let Some(distance) = self.finder.distance_to_place(&place, location).await? else {
                continue;
            };
            if closest.as_ref().map_or(true, |(best, _)| distance < *best) {
                closest = Some((distance, place));
            }
        }
        match closest {
            Some((_, place)) => self.libraries_for_place(&place).await,
            None => Ok(Vec::new()),
        }
    }

    async fn search_multiple_geotargets(&self, query: &Query) -> AppResult<Vec<LibraryMatch>> {
        let places = self.resolve_all(query).await?;
        if places.is_empty() {
            return Ok(Vec::new());
        }
        self.finder
            .libraries_in_places(&places, self.settings.long_limit)
            .await
    }

    async fn resolve_all(&self, query: &Query) -> AppResult<Vec<Place>> {
        let mut places = Vec::new();
        for target in query.geotargets() {
            if let Some(place) = self.finder.resolve_geotarget(&target).await? {
                places.push(place);
            }
        }
        Ok(places)
    }

    /// Up to `short_limit` libraries for one place.
    ///
    /// For a local place the nearest local library leads, then the nearest
    /// supralocal one, then the next local or failing that the next
    /// supralocal. For a state or larger place, supralocal libraries lead and
    /// local ones fill the remainder.
    pub async fn libraries_for_place(&self, place: &Place) -> AppResult<Vec<LibraryMatch>> {
        let limit = self.settings.short_limit;
        let radius = self.settings.max_radius_km;
        let locals = self
            .finder
            .libraries_near_place(place, AreaScope::Local, radius, limit)
            .await?;
        let supras = self
            .finder
            .libraries_near_place(place, AreaScope::Supralocal, radius, limit)
            .await?;

        let ordered: Vec<LibraryMatch> = if is_broad(place.place_type) {
            supras.into_iter().chain(locals).collect()
        } else {
            interleave(locals, supras)
        };
        Ok(dedup_by_library(ordered, limit))
    }
}

fn is_broad(place_type: PlaceType) -> bool {
    matches!(place_type, PlaceType::State | PlaceType::Nation | PlaceType::Everywhere)
}

/// `[l0, s0, l1, s1, ...]`, continuing with whichever list is longer.
fn interleave(locals: Vec<LibraryMatch>, supras: Vec<LibraryMatch>) -> Vec<LibraryMatch> {
    let mut out = Vec::with_capacity(locals.len() + supras.len());
    let mut locals = locals.into_iter();
    let mut supras = supras.into_iter();
    loop {
        match (locals.next(), supras.next()) {
            (None, None) => break,
            (local, supra) => {
                out.extend(local);
                out.extend(supra);
            }
        }
    }
    out
}

fn dedup_by_library(matches: Vec<LibraryMatch>, limit: usize) -> Vec<LibraryMatch> {
    let mut seen: HashSet<Uuid> = HashSet::new();
    matches
        .into_iter()
        .filter(|m| seen.insert(m.library.uuid))
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::library::{Library, LibraryStage};
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn library(name: &str) -> Library {
        Library {
            id: 0,
            uuid: Uuid::new_v4(),
            name: name.into(),
            short_name: None,
            description: None,
            opds_url: None,
            web_url: None,
            registry_stage: LibraryStage::Production,
            library_stage: LibraryStage::Production,
            timestamp: Utc::now(),
            aliases: vec![],
            service_areas: vec![],
        }
    }

    fn place(id: i64, name: &str, place_type: PlaceType) -> Place {
        Place {
            id,
            external_id: id.to_string(),
            external_name: name.into(),
            place_type,
            abbreviated_name: None,
            parent_id: None,
            parent_abbreviation: None,
            geometry: None,
            aliases: vec![],
        }
    }

    fn found(library: &Library, distance_m: f64) -> LibraryMatch {
        LibraryMatch {
            library: library.clone(),
            distance_m: Some(distance_m),
        }
    }

    #[derive(Default)]
    struct MockFinder {
        places: Vec<Place>,
        near: HashMap<(i64, bool), Vec<LibraryMatch>>,
        distances: HashMap<i64, f64>,
        in_places: Vec<LibraryMatch>,
        by_name: Vec<LibraryMatch>,
        calls: Mutex<Vec<String>>,
    }

    impl MockFinder {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LibraryFinder for MockFinder {
        async fn resolve_geotarget(&self, target: &GeoTarget) -> AppResult<Option<Place>> {
            Ok(self
                .places
                .iter()
                .find(|p| p.place_type == target.place_type && p.answers_to(&target.name))
                .cloned())
        }

        async fn distance_to_place(&self, place: &Place, _location: &Location) -> AppResult<Option<f64>> {
            Ok(self.distances.get(&place.id).copied())
        }

        async fn libraries_near_place(
            &self,
            place: &Place,
            scope: AreaScope,
            max_radius_km: f64,
            limit: usize,
        ) -> AppResult<Vec<LibraryMatch>> {
            self.record(format!("near:{}:{:?}:{}", place.id, scope, max_radius_km));
            let key = (place.id, scope == AreaScope::Local);
            Ok(self
                .near
                .get(&key)
                .map(|v| v.iter().take(limit).cloned().collect())
                .unwrap_or_default())
        }

        async fn libraries_in_places(&self, places: &[Place], limit: usize) -> AppResult<Vec<LibraryMatch>> {
            self.record(format!("in_places:{}", places.len()));
            Ok(self.in_places.iter().take(limit).cloned().collect())
        }

        async fn libraries_matching_name(
            &self,
            name: &str,
            location: Option<&Location>,
            limit: usize,
        ) -> AppResult<Vec<LibraryMatch>> {
            self.record(format!("by_name:{}:{}:{}", name, location.is_some(), limit));
            Ok(self.by_name.iter().take(limit).cloned().collect())
        }

        async fn libraries_near_location(
            &self,
            _location: &Location,
            max_radius_km: f64,
            limit: usize,
        ) -> AppResult<Vec<LibraryMatch>> {
            self.record(format!("near_location:{}:{}", max_radius_km, limit));
            Ok(Vec::new())
        }
    }

    fn names(results: &[LibraryMatch]) -> Vec<&str> {
        results.iter().map(|m| m.library.name.as_str()).collect()
    }

    fn engine(finder: MockFinder) -> SearchEngine<MockFinder> {
        SearchEngine::new(finder, SearchSettings::default())
    }

    #[tokio::test]
    async fn test_nothing_to_search() {
        let engine = engine(MockFinder::default());
        let results = engine.search(&Query::new(None, None)).await.unwrap();
        assert!(results.is_empty());
        assert!(engine.finder().calls().is_empty());
    }

    #[tokio::test]
    async fn test_location_only_searches_nearby() {
        let engine = engine(MockFinder::default());
        let here = Location::new(40.0, -73.0).unwrap();
        engine.search(&Query::new(None, Some(here))).await.unwrap();
        assert_eq!(engine.finder().calls(), vec!["near_location:150:20"]);
    }

    #[tokio::test]
    async fn test_single_local_geotarget_ordering() {
        let (l1, l2, l3) = (library("Local One"), library("Local Two"), library("Local Three"));
        let (s1, s2) = (library("Supra One"), library("Supra Two"));
        let mut finder = MockFinder {
            places: vec![place(10, "11215", PlaceType::PostalCode)],
            ..Default::default()
        };
        finder.near.insert(
            (10, true),
            vec![found(&l1, 0.0), found(&l2, 10.0), found(&l3, 20.0)],
        );
        finder.near.insert((10, false), vec![found(&s1, 0.0), found(&s2, 5.0)]);

        let engine = engine(finder);
        let results = engine.search(&Query::new(Some("11215"), None)).await.unwrap();
        assert_eq!(names(&results), vec!["Local One", "Supra One", "Local Two"]);
        assert!(engine
            .finder()
            .calls()
            .iter()
            .all(|c| !c.starts_with("near:") || c.ends_with(":300")));
    }

    #[tokio::test]
    async fn test_single_geotarget_falls_back_to_next_supralocal() {
        let l1 = library("Local One");
        let (s1, s2) = (library("Supra One"), library("Supra Two"));
        let mut finder = MockFinder {
            places: vec![place(10, "11215", PlaceType::PostalCode)],
            ..Default::default()
        };
        finder.near.insert((10, true), vec![found(&l1, 0.0)]);
        finder.near.insert((10, false), vec![found(&s1, 0.0), found(&s2, 5.0)]);

        let results = engine(finder).search(&Query::new(Some("11215"), None)).await.unwrap();
        assert_eq!(names(&results), vec!["Local One", "Supra One", "Supra Two"]);
    }

    #[tokio::test]
    async fn test_library_in_both_scopes_appears_once() {
        let both = library("Both");
        let other = library("Other");
        let mut finder = MockFinder {
            places: vec![place(10, "11215", PlaceType::PostalCode)],
            ..Default::default()
        };
        finder.near.insert((10, true), vec![found(&both, 0.0)]);
        finder.near.insert((10, false), vec![found(&both, 0.0), found(&other, 1.0)]);

        let results = engine(finder).search(&Query::new(Some("11215"), None)).await.unwrap();
        assert_eq!(names(&results), vec!["Both", "Other"]);
    }

    #[tokio::test]
    async fn test_state_geotarget_puts_supralocals_first() {
        let (l1, s1) = (library("Local"), library("State Library"));
        let mut finder = MockFinder {
            places: vec![place(20, "kansas", PlaceType::State)],
            ..Default::default()
        };
        finder.near.insert((20, true), vec![found(&l1, 0.0)]);
        finder.near.insert((20, false), vec![found(&s1, 0.0)]);

        let results = engine(finder).search(&Query::new(Some("Kansas"), None)).await.unwrap();
        assert_eq!(names(&results), vec!["State Library", "Local"]);
    }

    #[tokio::test]
    async fn test_single_geotarget_ignores_location() {
        let l1 = library("Local");
        let mut finder = MockFinder {
            places: vec![place(10, "yreka", PlaceType::City)],
            ..Default::default()
        };
        finder.near.insert((10, true), vec![found(&l1, 0.0)]);

        let here = Location::new(40.0, -73.0).unwrap();
        let results = engine(finder)
            .search(&Query::new(Some("yreka ca"), Some(here)))
            .await
            .unwrap();
        assert_eq!(names(&results), vec!["Local"]);
    }

    #[tokio::test]
    async fn test_multiple_geotargets_with_location_uses_closest() {
        let (near_lib, far_lib) = (library("Near"), library("Far"));
        let mut finder = MockFinder {
            places: vec![
                place(1, "11215", PlaceType::PostalCode),
                place(2, "90210", PlaceType::PostalCode),
            ],
            ..Default::default()
        };
        finder.distances.insert(1, 4_000_000.0);
        finder.distances.insert(2, 1_000.0);
        finder.near.insert((1, true), vec![found(&far_lib, 0.0)]);
        finder.near.insert((2, true), vec![found(&near_lib, 0.0)]);

        let here = Location::new(34.0, -118.0).unwrap();
        let results = engine(finder)
            .search(&Query::new(Some("11215 90210"), Some(here)))
            .await
            .unwrap();
        assert_eq!(names(&results), vec!["Near"]);
    }

    #[tokio::test]
    async fn test_multiple_geotargets_without_location() {
        let libs: Vec<LibraryMatch> = (0..25).map(|i| found(&library(&format!("Lib {i:02}")), 0.0)).collect();
        let finder = MockFinder {
            places: vec![
                place(1, "11215", PlaceType::PostalCode),
                place(2, "90210", PlaceType::PostalCode),
            ],
            in_places: libs,
            ..Default::default()
        };

        let engine = engine(finder);
        let results = engine.search(&Query::new(Some("11215 90210"), None)).await.unwrap();
        assert_eq!(results.len(), 20);
        assert_eq!(engine.finder().calls(), vec!["in_places:2"]);
    }

    #[tokio::test]
    async fn test_libtarget_limits() {
        let libs: Vec<LibraryMatch> = (0..25).map(|i| found(&library(&format!("Lib {i}")), 0.0)).collect();
        let engine = engine(MockFinder {
            by_name: libs,
            ..Default::default()
        });

        let results = engine
            .search(&Query::new(Some("Brooklyn Public Library"), None))
            .await
            .unwrap();
        assert_eq!(results.len(), 20);

        let here = Location::new(40.0, -73.0).unwrap();
        let results = engine
            .search(&Query::new(Some("Brooklyn Public Library"), Some(here)))
            .await
            .unwrap();
        assert_eq!(results.len(), 3);

        assert_eq!(
            engine.finder().calls(),
            vec![
                "by_name:brooklyn public library:false:20",
                "by_name:brooklyn public library:true:3",
            ]
        );
    }

    #[tokio::test]
    async fn test_unresolved_geotarget_gives_nothing() {
        let engine = engine(MockFinder::default());
        let results = engine.search(&Query::new(Some("11215"), None)).await.unwrap();
        assert!(results.is_empty());
    }
}
