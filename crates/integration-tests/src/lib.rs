//! Shared fixtures for the integration tests.

use std::sync::Arc;

use domains::{Actor, Coordinates, PlaceTag, RouteId, UserId, Visibility};
use services::{NewRoute, PointCollection, PointDraft, RouteCatalog};
use storage_adapters::MemoryStore;

pub fn actor(id: &str) -> Actor {
    Actor {
        id: UserId::from(id),
        display_name: Some(format!("{id} (traveler)")),
        email: Some(format!("{id}@example.com")),
        photo_url: None,
    }
}

pub fn coordinates(lat: f64, lng: f64) -> Coordinates {
    Coordinates::new(lat, lng).unwrap()
}

pub fn draft(title: &str, category: PlaceTag) -> PointDraft {
    PointDraft {
        title: title.into(),
        category,
        ..PointDraft::default()
    }
}

pub fn new_route(title: &str, city: &str) -> NewRoute {
    NewRoute {
        title: title.into(),
        city: city.into(),
        days: 1,
        visibility: Visibility::Public,
        cover_photo_url: None,
    }
}

/// A store holding one public route owned by `owner`.
pub async fn store_with_route(owner: &Actor) -> (Arc<MemoryStore>, RouteId) {
    let store = Arc::new(MemoryStore::new());
    let route = RouteCatalog::new(store.clone())
        .create(new_route("Palaces and bridges", "Saint Petersburg"), owner)
        .await
        .unwrap();
    (store, route)
}

/// Adds `titles` in sequence so they receive orders 1, 2, 3 ...
pub async fn with_points(store: &Arc<MemoryStore>, route: &RouteId, titles: &[&str]) -> PointCollection {
    let mut points = PointCollection::new(store.clone(), route.clone());
    points.load().await.unwrap();
    for (i, title) in titles.iter().enumerate() {
        let at = coordinates(59.93 + i as f64 * 0.01, 30.31);
        points.add(draft(title, PlaceTag::Other), Some(at)).await.unwrap();
    }
    points
}
