//! [`LibraryFinder`] backed by PostGIS.

use async_trait::async_trait;

use common::errors::AppResult;
use common::models::{LibraryMatch, Location, Place, PlaceType};
use common::search::{AreaScope, GeoTarget, LibraryFinder};

use super::libraries::scope_types;
use super::PgStore;

#[async_trait]
impl LibraryFinder for PgStore {
    async fn resolve_geotarget(&self, target: &GeoTarget) -> AppResult<Option<Place>> {
        match target.place_type {
            PlaceType::PostalCode => self.lookup_postcode(&target.name).await,
            PlaceType::Everywhere => self.everywhere().await.map(Some),
            place_type => {
                self.lookup_by_name(&target.name, Some(place_type), target.state.as_deref())
                    .await
            }
        }
    }

    async fn distance_to_place(
        &self,
        place: &Place,
        location: &Location,
    ) -> AppResult<Option<f64>> {
        self.place_distance(place.id, location).await
    }

    async fn libraries_near_place(
        &self,
        place: &Place,
        scope: AreaScope,
        max_radius_km: f64,
        limit: usize,
    ) -> AppResult<Vec<LibraryMatch>> {
        let types = scope_types(scope == AreaScope::Local);
        self.near_place(place.id, types, max_radius_km * 1000.0, limit).await
    }

    async fn libraries_in_places(
        &self,
        places: &[Place],
        limit: usize,
    ) -> AppResult<Vec<LibraryMatch>> {
        let ids = places.iter().map(|place| place.id).collect();
        self.in_places(ids, limit).await
    }

    async fn libraries_matching_name(
        &self,
        name: &str,
        location: Option<&Location>,
        limit: usize,
    ) -> AppResult<Vec<LibraryMatch>> {
        self.matching_name(name, location, limit).await
    }

    async fn libraries_near_location(
        &self,
        location: &Location,
        max_radius_km: f64,
        limit: usize,
    ) -> AppResult<Vec<LibraryMatch>> {
        self.nearby(location, max_radius_km, true, limit).await
    }
}
