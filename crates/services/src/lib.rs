//! services/src/lib.rs
//!
//! Core use cases of wayfarer: the ordered point list, optimistic toggles and the
//! catalogue around them. Everything here talks to collaborators only through the
//! ports in `domains`.

pub mod comments;
pub mod geo;
pub mod map;
pub mod navigation;
pub mod paths;
pub mod points;
pub mod relations;
pub mod routes;
pub mod toggle;

pub use comments::{CommentService, MAX_COMMENT_CHARS};
pub use geo::Bounds;
pub use map::{
    initial_viewport, resolve_viewport, Arrow, CoordinatePicker, MapAvailability, MapDefaults,
    MapScene, MapWidget, Marker, Viewport, ViewportTracker,
};
pub use navigation::{build_app_url, AppRoute, RouteDecision};
pub use points::{next_order, sort_points, MoveDirection, PointCollection, PointDraft, PointPatch, SwapStrategy};
pub use relations::{RelationKey, RelationKind, RelationRepository, RelationSubject};
pub use routes::{ListParams, NewRoute, RouteCatalog, RoutePatch, RouteSort};
pub use toggle::{MountedToggle, ToggleEngine, ToggleOutcome, ToggleState, ToggleView};
