use std::sync::Arc;

use domains::{AppError, DocumentStore, PlaceTag, RouteId, StoreError, Writes};
use integration_tests::{actor, coordinates, draft, store_with_route, with_points};
use services::{next_order, paths, MoveDirection, PointCollection, PointDraft, PointPatch, SwapStrategy};
use storage_adapters::MemoryStore;

fn draft_at_order(title: &str, order: u32) -> PointDraft {
    PointDraft {
        order: Some(order),
        ..draft(title, PlaceTag::Other)
    }
}

fn orders(points: &PointCollection) -> Vec<(String, u32)> {
    points
        .points()
        .iter()
        .map(|p| (p.title.clone(), p.order))
        .collect()
}

#[tokio::test]
async fn next_order_tracks_the_maximum() {
    let owner = actor("olga");
    let (store, route) = store_with_route(&owner).await;
    let mut points = with_points(&store, &route, &[]).await;
    assert_eq!(points.next_order(), 1);

    points.add(draft_at_order("Far away", 7), Some(coordinates(59.9, 30.3))).await.unwrap();
    points.add(draft("Next", PlaceTag::Cafe), Some(coordinates(59.9, 30.3))).await.unwrap();

    assert_eq!(orders(&points), [("Far away".to_owned(), 7), ("Next".to_owned(), 8)]);
    assert_eq!(next_order(points.points()), 9);
}

#[tokio::test]
async fn created_point_loads_back_with_its_fields() {
    let owner = actor("olga");
    let (store, route) = store_with_route(&owner).await;
    let mut points = PointCollection::new(store.clone(), route.clone());
    points.load().await.unwrap();

    let id = points
        .add(draft("Hermitage", PlaceTag::Museum), Some(coordinates(59.94, 30.31)))
        .await
        .unwrap();

    let mut fresh = PointCollection::new(store, route);
    let loaded = fresh.load().await.unwrap();
    assert_eq!(loaded.len(), 1);
    let point = &loaded[0];
    assert_eq!(point.id, id);
    assert!(!point.id.as_str().is_empty());
    assert_eq!(point.title, "Hermitage");
    assert_eq!(point.category, PlaceTag::Museum);
    assert_eq!(point.order, 1);
    assert_eq!((point.coordinates.lat(), point.coordinates.lng()), (59.94, 30.31));
}

#[tokio::test]
async fn missing_coordinates_write_nothing() {
    let owner = actor("olga");
    let (store, route) = store_with_route(&owner).await;
    let mut points = with_points(&store, &route, &[]).await;
    let before = store.write_attempts();

    let err = points.add(draft("Nowhere", PlaceTag::Other), None).await.unwrap_err();
    assert!(matches!(err, AppError::MissingCoordinates));
    assert_eq!(store.write_attempts(), before);
}

#[tokio::test]
async fn remove_keeps_remaining_orders() {
    let owner = actor("olga");
    let (store, route) = store_with_route(&owner).await;
    let mut points = with_points(&store, &route, &["A", "B", "C"]).await;
    let b = points.points()[1].id.clone();

    points.remove(&b).await.unwrap();
    assert_eq!(orders(&points), [("A".to_owned(), 1), ("C".to_owned(), 3)]);
    assert_eq!(points.next_order(), 4);
}

#[tokio::test]
async fn swap_of_first_two_reorders_the_route() {
    let owner = actor("olga");
    let (store, route) = store_with_route(&owner).await;
    let mut points = with_points(&store, &route, &["A", "B", "C"]).await;
    let a = points.points()[0].id.clone();
    let b = points.points()[1].id.clone();

    points.swap(&a, &b).await.unwrap();

    let mut reloaded = PointCollection::new(store, route);
    reloaded.load().await.unwrap();
    assert_eq!(
        orders(&reloaded),
        [("B".to_owned(), 1), ("A".to_owned(), 2), ("C".to_owned(), 3)]
    );
}

#[tokio::test]
async fn sequential_swap_reports_the_half_applied_state() {
    let owner = actor("olga");
    let (store, route) = store_with_route(&owner).await;
    with_points(&store, &route, &["A", "B"]).await;
    let mut points = PointCollection::new(store.clone(), route.clone()).with_swap_strategy(SwapStrategy::Sequential);
    points.load().await.unwrap();
    let a = points.points()[0].id.clone();
    let b = points.points()[1].id.clone();

    store.fail_write_after(1, StoreError::Unavailable("connection reset".into()));
    let err = points.swap(&a, &b).await.unwrap_err();
    match err {
        AppError::PartialSwapFailure { applied, failed, .. } => {
            assert_eq!(applied, a);
            assert_eq!(failed, b);
        }
        other => panic!("unexpected error: {other}"),
    }
    // Both points now carry order 2 until the next edit.
    assert!(points.points().iter().all(|p| p.order == 2));
}

#[tokio::test]
async fn atomic_swap_failure_leaves_orders_untouched() {
    let owner = actor("olga");
    let (store, route) = store_with_route(&owner).await;
    let mut points = with_points(&store, &route, &["A", "B"]).await;
    let a = points.points()[0].id.clone();
    let b = points.points()[1].id.clone();

    store.fail_next_write(StoreError::Unavailable("connection reset".into()));
    let err = points.swap(&a, &b).await.unwrap_err();
    assert!(matches!(err, AppError::RemoteWriteFailure(_)));

    points.load().await.unwrap();
    assert_eq!(orders(&points), [("A".to_owned(), 1), ("B".to_owned(), 2)]);
}

#[tokio::test]
async fn move_down_then_up_restores_the_sequence() {
    let owner = actor("olga");
    let (store, route) = store_with_route(&owner).await;
    let mut points = with_points(&store, &route, &["A", "B", "C"]).await;
    let a = points.points()[0].id.clone();

    assert!(points.move_point(&a, MoveDirection::Down).await.unwrap());
    assert_eq!(points.points()[1].id, a);
    assert!(points.move_point(&a, MoveDirection::Up).await.unwrap());
    assert!(!points.move_point(&a, MoveDirection::Up).await.unwrap());
    assert_eq!(orders(&points)[0], ("A".to_owned(), 1));
}

#[tokio::test]
async fn partial_update_leaves_other_fields() {
    let owner = actor("olga");
    let (store, route) = store_with_route(&owner).await;
    let mut points = with_points(&store, &route, &["A"]).await;
    let id = points.points()[0].id.clone();
    let before = points.points()[0].clone();

    points
        .update(
            &id,
            PointPatch {
                description: Some("Best at sunset".into()),
                ..PointPatch::default()
            },
        )
        .await
        .unwrap();
    let after = points.get(&id).unwrap();
    assert_eq!(after.description.as_deref(), Some("Best at sunset"));
    assert_eq!(after.title, before.title);
    assert_eq!(after.coordinates, before.coordinates);
    assert!(after.updated_at > before.updated_at);
}

#[tokio::test]
async fn duplicate_orders_from_another_session_keep_arrival_order() {
    let owner = actor("olga");
    let (store, route) = store_with_route(&owner).await;
    let mut here = with_points(&store, &route, &["A"]).await;
    let mut there = PointCollection::new(store.clone(), route.clone());
    there.load().await.unwrap();

    // Both sessions computed next order 2 from the same stale list.
    here.add(draft("Mine", PlaceTag::Bar), Some(coordinates(59.9, 30.3))).await.unwrap();
    there.add(draft("Theirs", PlaceTag::Bar), Some(coordinates(59.9, 30.3))).await.unwrap();

    here.load().await.unwrap();
    assert_eq!(
        orders(&here),
        [("A".to_owned(), 1), ("Mine".to_owned(), 2), ("Theirs".to_owned(), 2)]
    );
}

#[tokio::test]
async fn loading_an_unknown_route_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let mut points = PointCollection::new(store, RouteId::from("missing"));
    assert!(points.load().await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn malformed_point_documents_fail_decoding() {
    let owner = actor("olga");
    let (store, route) = store_with_route(&owner).await;
    store
        .set(
            &paths::points(&route).doc("broken"),
            Writes::new().set("title", "No location").set("order", 1).build(),
        )
        .await
        .unwrap();

    let mut points = PointCollection::new(store, route);
    assert!(matches!(points.load().await, Err(AppError::Decode(_))));
}
