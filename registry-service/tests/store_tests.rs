//! Postgres-backed store tests.
//!
//! These run only when `SIMPLIFIED_TEST_DATABASE` names a PostGIS database.
//! Every test uses fresh external ids and names, so runs do not collide.

use serde_json::json;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use uuid::Uuid;

use common::config::TEST_DATABASE_ENV;
use common::errors::AppError;
use common::geometry_loader::{GeometryLoader, PlaceRecord, PlaceSink};
use common::models::{
    CreateLibraryRequest, LibraryStage, Location, PlaceAlias, PlaceType, ServiceAreaKind,
};
use common::search::{LibraryFinder, SearchEngine, SearchSettings};
use registry_service::store::PgStore;

async fn test_store() -> Option<PgStore> {
    let url = match std::env::var(TEST_DATABASE_ENV) {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            eprintln!("{TEST_DATABASE_ENV} not set, skipping");
            return None;
        }
    };
    let pool = PgPoolOptions::new().max_connections(5).connect(&url).await.unwrap();
    let store = PgStore::new(pool);
    store.migrate().await.unwrap();
    Some(store)
}

fn suffix() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn square(lon: f64, lat: f64, half: f64) -> serde_json::Value {
    json!({
        "type": "Polygon",
        "coordinates": [[
            [lon - half, lat - half],
            [lon + half, lat - half],
            [lon + half, lat + half],
            [lon - half, lat + half],
            [lon - half, lat - half]
        ]]
    })
}

fn record(
    external_id: &str,
    place_type: PlaceType,
    parent: Option<&str>,
    name: &str,
    abbreviation: Option<&str>,
    geometry: serde_json::Value,
) -> PlaceRecord {
    PlaceRecord {
        external_id: external_id.to_string(),
        place_type,
        parent_external_id: parent.map(str::to_string),
        name: name.to_string(),
        abbreviated_name: abbreviation.map(str::to_string),
        aliases: Vec::new(),
        geometry,
    }
}

/// Loads a state and a city inside it at a random spot in North America.
/// Returns the two names and the city centre.
async fn load_state_and_city(store: &PgStore, tag: &str) -> (String, String, Location) {
    let lon = -120.0 + rand::random::<f64>() * 40.0;
    let lat = 30.0 + rand::random::<f64>() * 15.0;
    let state_name = format!("Teststate {tag}");
    let state_abbr = format!("T{}", &tag[..3]).to_uppercase();
    let city_name = format!("Testville {tag}");

    let mut loader = GeometryLoader::new(store.place_writer().await.unwrap());
    loader
        .load(&record(
            &format!("st-{tag}"),
            PlaceType::State,
            None,
            &state_name,
            Some(&state_abbr),
            square(lon, lat, 2.0),
        ))
        .await
        .unwrap();
    let mut city = record(
        &format!("city-{tag}"),
        PlaceType::City,
        Some(&format!("st-{tag}")),
        &city_name,
        None,
        square(lon, lat, 0.05),
    );
    city.aliases.push(PlaceAlias {
        name: format!("Old Testville {tag}"),
        language: Some("eng".to_string()),
    });
    loader.load(&city).await.unwrap();
    loader.into_sink().commit().await.unwrap();

    (state_name, city_name, Location::new(lat, lon).unwrap())
}

async fn production_library(store: &PgStore, name: &str) -> common::models::Library {
    let library = store
        .create_library(&CreateLibraryRequest {
            name: name.to_string(),
            short_name: None,
            description: Some("A library used by the store tests".to_string()),
            opds_url: Some(format!("https://{}.example.org/opds", suffix())),
            web_url: None,
            aliases: vec![format!("{name} Branch")],
        })
        .await
        .unwrap();
    store
        .set_library_stage(library.uuid, LibraryStage::Production)
        .await
        .unwrap();
    store
        .set_registry_stage(library.uuid, LibraryStage::Production)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_closed_pool_errors_are_connection_errors() {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_lazy_with(PgConnectOptions::new());
    pool.close().await;
    let store = PgStore::new(pool);

    let err = store
        .lookup_by_name("Springfield", Some(PlaceType::City), Some("IL"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DatabaseConnection(_)));

    let err = store.list_libraries(false, 1, 10).await.unwrap_err();
    assert!(matches!(err, AppError::DatabaseConnection(_)));
}

#[tokio::test]
async fn test_everywhere_is_created_once() {
    let Some(store) = test_store().await else { return };

    let first = store.everywhere().await.unwrap();
    let second = store.everywhere().await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.place_type, PlaceType::Everywhere);
}

#[tokio::test]
async fn test_loaded_places_are_found_by_name_alias_and_parent() {
    let Some(store) = test_store().await else { return };
    let tag = suffix();
    let (state_name, city_name, _) = load_state_and_city(&store, &tag).await;

    let city = store
        .lookup_by_name(&city_name.to_lowercase(), Some(PlaceType::City), Some(&state_name))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(city.external_id, format!("city-{tag}"));
    assert!(city.geometry.is_some());

    let by_alias = store
        .lookup_by_name(&format!("Old Testville {tag}"), Some(PlaceType::City), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_alias.id, city.id);

    let wrong_parent = store
        .lookup_by_name(&city_name, Some(PlaceType::City), Some("Nowhere"))
        .await
        .unwrap();
    assert!(wrong_parent.is_none());
}

#[tokio::test]
async fn test_reloading_a_place_updates_it() {
    let Some(store) = test_store().await else { return };
    let tag = suffix();
    let external_id = format!("county-{tag}");

    let mut writer = store.place_writer().await.unwrap();
    let first = record(
        &external_id,
        PlaceType::County,
        None,
        "Old County",
        None,
        square(-90.0, 40.0, 0.2),
    );
    let (created, is_new) = writer.upsert_place(&first, None).await.unwrap();
    assert!(is_new);

    let second = record(
        &external_id,
        PlaceType::County,
        None,
        "New County",
        None,
        square(-90.0, 40.0, 0.3),
    );
    let (updated, is_new) = writer.upsert_place(&second, None).await.unwrap();
    assert!(!is_new);
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.external_name, "New County");

    let alias = PlaceAlias {
        name: "Twice".to_string(),
        language: None,
    };
    writer.add_place_alias(&updated, &alias).await.unwrap();
    writer.add_place_alias(&updated, &alias).await.unwrap();
    writer.commit().await.unwrap();

    let aliases: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM place_aliases WHERE place_id = $1")
        .bind(updated.id)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(aliases, 1);
}

#[tokio::test]
async fn test_uncommitted_load_is_rolled_back() {
    let Some(store) = test_store().await else { return };
    let tag = suffix();

    let mut loader = GeometryLoader::new(store.place_writer().await.unwrap());
    loader
        .load(&record(
            &format!("gone-{tag}"),
            PlaceType::City,
            None,
            "Gone",
            None,
            square(0.0, 0.0, 0.1),
        ))
        .await
        .unwrap();
    drop(loader);

    let found = store.find_by_external_id(&format!("gone-{tag}"), None).await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_library_lifecycle() {
    let Some(store) = test_store().await else { return };
    let name = format!("Lifecycle Library {}", suffix());

    let library = store
        .create_library(&CreateLibraryRequest {
            name: name.clone(),
            short_name: Some(format!("lc{}", suffix())),
            description: None,
            opds_url: None,
            web_url: None,
            aliases: Vec::new(),
        })
        .await
        .unwrap();
    assert_eq!(library.registry_stage, LibraryStage::Testing);
    assert_eq!(library.library_stage, LibraryStage::Testing);
    let short_name = library.short_name.clone().unwrap();
    assert_eq!(short_name, short_name.to_uppercase());

    let by_short_name = store
        .library_by_short_name(&short_name.to_lowercase())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_short_name.uuid, library.uuid);
    let by_urn = store.library_by_urn(&library.internal_urn()).await.unwrap().unwrap();
    assert_eq!(by_urn.uuid, library.uuid);

    store.set_library_stage(library.uuid, LibraryStage::Production).await.unwrap();
    let live = store
        .set_registry_stage(library.uuid, LibraryStage::Production)
        .await
        .unwrap();
    assert!(live.in_production());

    let err = store
        .set_library_stage(library.uuid, LibraryStage::Testing)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let pulled = store
        .set_registry_stage(library.uuid, LibraryStage::Cancelled)
        .await
        .unwrap();
    assert!(!pulled.in_production());
}

#[tokio::test]
async fn test_duplicate_short_name_is_a_conflict() {
    let Some(store) = test_store().await else { return };
    let short_name = format!("dup{}", suffix());
    let request = CreateLibraryRequest {
        name: "Duplicate".to_string(),
        short_name: Some(short_name),
        description: None,
        opds_url: None,
        web_url: None,
        aliases: Vec::new(),
    };

    store.create_library(&request).await.unwrap();
    let err = store.create_library(&request).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_nearby_and_place_search_find_a_focused_library() {
    let Some(store) = test_store().await else { return };
    let tag = suffix();
    let (_, city_name, inside) = load_state_and_city(&store, &tag).await;
    let library = production_library(&store, &format!("Testville Public {tag}")).await;

    let with_area = store
        .add_service_area(library.uuid, &format!("city-{tag}"), ServiceAreaKind::Focus)
        .await
        .unwrap();
    assert_eq!(with_area.service_areas.len(), 1);
    let again = store
        .add_service_area(library.uuid, &format!("city-{tag}"), ServiceAreaKind::Focus)
        .await
        .unwrap();
    assert_eq!(again.service_areas.len(), 1);

    let nearby = store.nearby(&inside, 150.0, true, 50).await.unwrap();
    let hit = nearby.iter().find(|m| m.library.uuid == library.uuid).unwrap();
    assert_eq!(hit.distance_m, Some(0.0));

    let far = Location::new(-10.0, 10.0).unwrap();
    let none = store.nearby(&far, 150.0, true, 50).await.unwrap();
    assert!(none.iter().all(|m| m.library.uuid != library.uuid));

    let city = store
        .lookup_by_name(&city_name, Some(PlaceType::City), None)
        .await
        .unwrap()
        .unwrap();
    let engine = SearchEngine::new(store.clone(), SearchSettings::default());
    let results = engine.libraries_for_place(&city).await.unwrap();
    assert_eq!(results.first().map(|m| m.library.uuid), Some(library.uuid));
}

#[tokio::test]
async fn test_name_search_ranks_fuzzy_matches() {
    let Some(store) = test_store().await else { return };
    let tag = suffix();
    let name = format!("Fuzzyton Library {tag}");
    let library = production_library(&store, &name).await;

    let misspelled = name.replacen("Fuzzyton", "Fuzzytin", 1);
    let results = store.libraries_matching_name(&misspelled, None, 20).await.unwrap();
    assert!(results.iter().any(|m| m.library.uuid == library.uuid));

    let by_alias = store
        .libraries_matching_name(&format!("{name} Branch"), None, 20)
        .await
        .unwrap();
    assert!(by_alias.iter().any(|m| m.library.uuid == library.uuid));
}

#[tokio::test]
async fn test_authenticate_checks_password() {
    let Some(store) = test_store().await else { return };
    let username = format!("admin-{}", suffix());
    store.create_admin(&username, "s3cret").await.unwrap();

    let admin = store.authenticate(&username, "s3cret").await.unwrap().unwrap();
    assert_eq!(admin.username, username);
    assert!(admin.password_hash.starts_with("$2b$"));

    assert!(store.authenticate(&username, "wrong").await.unwrap().is_none());
}

#[tokio::test]
async fn test_first_admin_is_not_created_once_one_exists() {
    let Some(store) = test_store().await else { return };
    store
        .create_admin(&format!("admin-{}", suffix()), "s3cret")
        .await
        .unwrap();

    let latecomer = format!("late-{}", suffix());
    assert!(store.create_first_admin(&latecomer, "pw").await.unwrap().is_none());
    assert!(store.authenticate(&latecomer, "pw").await.unwrap().is_none());
    assert!(store.admin_by_username(&latecomer).await.unwrap().is_none());
}

#[tokio::test]
async fn test_nearest_supralocals_orders_state_libraries_by_distance() {
    let Some(store) = test_store().await else { return };
    let tag = suffix();
    let lon = -115.0 + rand::random::<f64>() * 20.0;
    let lat = 32.0 + rand::random::<f64>() * 10.0;

    let mut loader = GeometryLoader::new(store.place_writer().await.unwrap());
    for (id, centre) in [("west", lon), ("east", lon + 3.0)] {
        loader
            .load(&record(
                &format!("{id}-{tag}"),
                PlaceType::State,
                None,
                &format!("State {id} {tag}"),
                None,
                square(centre, lat, 0.5),
            ))
            .await
            .unwrap();
    }
    loader
        .load(&record(
            &format!("town-{tag}"),
            PlaceType::City,
            None,
            &format!("Town {tag}"),
            None,
            square(lon + 2.2, lat, 0.05),
        ))
        .await
        .unwrap();
    loader.into_sink().commit().await.unwrap();

    let mut uuids = Vec::new();
    for area in ["west", "east", "town"] {
        let library = production_library(&store, &format!("Library {area} {tag}")).await;
        store
            .add_service_area(library.uuid, &format!("{area}-{tag}"), ServiceAreaKind::Focus)
            .await
            .unwrap();
        uuids.push(library.uuid);
    }
    let (west, east, town) = (uuids[0], uuids[1], uuids[2]);

    let here = Location::new(lat, lon + 2.2).unwrap();
    let found: Vec<Uuid> = store
        .nearest_supralocals(&here, 1000.0, 1000)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.library.uuid)
        .filter(|uuid| uuids.contains(uuid))
        .collect();
    assert_eq!(found, vec![east, west]);
    assert!(!found.contains(&town));

    let near_west = Location::new(lat, lon + 0.8).unwrap();
    let found: Vec<Uuid> = store
        .nearest_supralocals(&near_west, 1000.0, 1000)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.library.uuid)
        .filter(|uuid| uuids.contains(uuid))
        .collect();
    assert_eq!(found, vec![west, east]);
}

#[tokio::test]
async fn test_library_alias_is_added_once_and_matched() {
    let Some(store) = test_store().await else { return };
    let tag = suffix();
    let library = production_library(&store, &format!("Aliasing Library {tag}")).await;
    let alias = format!("Quillborough Reading Room {tag}");

    let first = store.add_library_alias(library.uuid, &alias).await.unwrap();
    let second = store.add_library_alias(library.uuid, &alias).await.unwrap();
    assert_eq!(first.aliases.iter().filter(|a| **a == alias).count(), 1);
    assert_eq!(second.aliases, first.aliases);

    let results = store.libraries_matching_name(&alias, None, 20).await.unwrap();
    assert_eq!(results.first().map(|m| m.library.uuid), Some(library.uuid));

    let missing = store.add_library_alias(Uuid::new_v4(), &alias).await.unwrap_err();
    assert!(matches!(missing, AppError::LibraryNotFound(_)));
}
