//! # Map integration
//!
//! Everything the map widget needs is computed here from plain point data; the
//! rendering SDK only receives the finished [`MapScene`] and [`Viewport`].
//! Loading the SDK is a separate bounded phase ending in [`MapAvailability`], so
//! nothing else in the core depends on the widget being available.

use std::time::Duration;

use domains::{Coordinates, GeocodeResult, Geocoder, MapSdkLoader, PlaceTag, PointId, RoutePoint};
use tracing::{debug, info, warn};

use crate::geo::Bounds;
use crate::points::sort_points;

pub const DEFAULT_ZOOM: u8 = 13;
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_millis(4000);

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub point_id: PointId,
    pub coordinates: Coordinates,
    /// Hover text.
    pub hint: String,
    /// `#<order>` label drawn on the marker.
    pub caption: String,
    pub preset: &'static str,
    pub category: PlaceTag,
}

/// Direction marker drawn halfway along a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arrow {
    pub at: Coordinates,
    pub bearing: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapScene {
    pub markers: Vec<Marker>,
    /// Empty unless there are at least two points.
    pub polyline: Vec<Coordinates>,
    pub arrows: Vec<Arrow>,
}

impl MapScene {
    pub fn from_points(points: &[RoutePoint]) -> Self {
        let mut sorted = points.to_vec();
        sort_points(&mut sorted);

        let markers = sorted
            .iter()
            .map(|p| Marker {
                point_id: p.id.clone(),
                coordinates: p.coordinates,
                hint: p.title.clone(),
                caption: format!("#{}", p.order),
                preset: p.category.map_preset(),
                category: p.category,
            })
            .collect();

        if sorted.len() < 2 {
            return Self {
                markers,
                ..Self::default()
            };
        }

        let polyline: Vec<Coordinates> = sorted.iter().map(|p| p.coordinates).collect();
        let arrows = polyline
            .windows(2)
            .map(|pair| Arrow {
                at: pair[0].midpoint(&pair[1]),
                bearing: pair[0].bearing_to(&pair[1]),
            })
            .collect();
        Self {
            markers,
            polyline,
            arrows,
        }
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::of(self.markers.iter().map(|m| &m.coordinates))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Viewport {
    Center { center: Coordinates, zoom: u8 },
    FitBounds(Bounds),
    /// Resolve the city through the geocoder first, see [`resolve_viewport`].
    GeocodeCity(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapDefaults {
    pub center: Coordinates,
    pub zoom: u8,
}

impl Default for MapDefaults {
    fn default() -> Self {
        Self {
            center: Coordinates::DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
        }
    }
}

/// Explicit center, else the city (only when there are no points), else the points, else the defaults.
pub fn initial_viewport(
    points: &[RoutePoint],
    center: Option<Coordinates>,
    city: Option<&str>,
    defaults: &MapDefaults,
) -> Viewport {
    if let Some(center) = center {
        return Viewport::Center {
            center,
            zoom: defaults.zoom,
        };
    }
    let city = city.map(str::trim).filter(|c| !c.is_empty());
    match (points, city) {
        ([], Some(city)) => Viewport::GeocodeCity(city.to_owned()),
        ([single], _) => Viewport::Center {
            center: single.coordinates,
            zoom: defaults.zoom.max(DEFAULT_ZOOM),
        },
        (many, _) => match Bounds::of(many.iter().map(|p| &p.coordinates)) {
            Some(bounds) => Viewport::FitBounds(bounds),
            None => Viewport::Center {
                center: defaults.center,
                zoom: defaults.zoom,
            },
        },
    }
}

/// Turns `GeocodeCity` into a concrete center; lookup failures land on the defaults.
pub async fn resolve_viewport(viewport: Viewport, geocoder: &dyn Geocoder, defaults: &MapDefaults) -> Viewport {
    let Viewport::GeocodeCity(city) = viewport else {
        return viewport;
    };
    let center = match geocoder.geocode(&city).await {
        Ok(Some(GeocodeResult { lat, lng, .. })) => Coordinates::new(lat, lng).ok(),
        Ok(None) => None,
        Err(error) => {
            warn!(%error, %city, "city lookup failed");
            None
        }
    };
    Viewport::Center {
        center: center.unwrap_or(defaults.center),
        zoom: defaults.zoom,
    }
}

/// Automatic refits stop once the actor has moved the map themselves.
#[derive(Debug, Default)]
pub struct ViewportTracker {
    user_moved: bool,
    current: Option<(Coordinates, u8)>,
}

impl ViewportTracker {
    pub fn on_user_change(&mut self, center: Coordinates, zoom: u8) {
        self.user_moved = true;
        self.current = Some((center, zoom));
    }

    pub fn user_moved(&self) -> bool {
        self.user_moved
    }

    pub fn current(&self) -> Option<(Coordinates, u8)> {
        self.current
    }

    /// The viewport to apply after the points changed, or `None` to leave the map alone.
    pub fn refit(&self, scene: &MapScene) -> Option<Viewport> {
        if self.user_moved {
            return None;
        }
        match scene.markers.as_slice() {
            [] => None,
            [single] => Some(Viewport::Center {
                center: single.coordinates,
                zoom: DEFAULT_ZOOM,
            }),
            _ => scene.bounds().map(Viewport::FitBounds),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Click-to-pick for the add-point form. Clicks are ignored while an existing point is edited.
#[derive(Debug, Default)]
pub struct CoordinatePicker {
    editing: bool,
    picked: Option<Coordinates>,
}

impl CoordinatePicker {
    pub fn set_editing(&mut self, editing: bool) {
        self.editing = editing;
    }

    /// Returns whether the click was taken.
    pub fn on_map_click(&mut self, at: Coordinates) -> bool {
        if self.editing {
            return false;
        }
        self.picked = Some(at);
        true
    }

    pub fn picked(&self) -> Option<Coordinates> {
        self.picked
    }

    pub fn clear(&mut self) {
        self.picked = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapAvailability {
    Ready,
    Unavailable(String),
}

pub struct MapWidget;

impl MapWidget {
    /// Waits at most `timeout` for the SDK. Without an API key the loader is never called.
    pub async fn initialize(
        loader: &dyn MapSdkLoader,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> MapAvailability {
        if api_key.map_or(true, |k| k.trim().is_empty()) {
            warn!("map API key is not configured");
            return MapAvailability::Unavailable("map API key is not configured".into());
        }
        debug!(timeout_ms = timeout.as_millis() as u64, "loading map SDK");
        match tokio::time::timeout(timeout, loader.load()).await {
            Ok(Ok(())) => {
                info!("map SDK ready");
                MapAvailability::Ready
            }
            Ok(Err(error)) => {
                warn!(%error, "map SDK failed");
                MapAvailability::Unavailable(error.to_string())
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "map SDK timed out");
                MapAvailability::Unavailable(format!("map SDK did not load within {timeout:?}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domains::{MapError, MockGeocoder, MockMapSdkLoader};

    fn point(id: &str, order: u32, lat: f64, lng: f64) -> RoutePoint {
        RoutePoint {
            id: PointId::from(id),
            title: format!("Stop {id}"),
            description: None,
            address: None,
            photo_url: None,
            category: PlaceTag::Museum,
            order,
            coordinates: Coordinates::new(lat, lng).unwrap(),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn scene_follows_order_not_input_position() {
        let points = [point("b", 2, 59.93, 30.33), point("a", 1, 59.94, 30.31)];
        let scene = MapScene::from_points(&points);
        assert_eq!(scene.markers[0].point_id, PointId::from("a"));
        assert_eq!(scene.markers[0].caption, "#1");
        assert_eq!(scene.markers[0].preset, PlaceTag::Museum.map_preset());
        assert_eq!(scene.polyline, [points[1].coordinates, points[0].coordinates]);
        assert_eq!(scene.arrows.len(), 1);
    }

    #[test]
    fn single_point_has_no_polyline() {
        let scene = MapScene::from_points(&[point("a", 1, 59.94, 30.31)]);
        assert_eq!(scene.markers.len(), 1);
        assert!(scene.polyline.is_empty());
        assert!(scene.arrows.is_empty());
    }

    #[test]
    fn initial_viewport_precedence() {
        let defaults = MapDefaults { zoom: 10, ..MapDefaults::default() };
        let explicit = Coordinates::new(1.0, 2.0).unwrap();
        assert_eq!(
            initial_viewport(&[point("a", 1, 59.9, 30.3)], Some(explicit), Some("Kazan"), &defaults),
            Viewport::Center { center: explicit, zoom: 10 }
        );
        assert_eq!(
            initial_viewport(&[], None, Some("Kazan"), &defaults),
            Viewport::GeocodeCity("Kazan".into())
        );
        let single = point("a", 1, 59.9, 30.3);
        assert_eq!(
            initial_viewport(&[single.clone()], None, Some("Kazan"), &defaults),
            Viewport::Center { center: single.coordinates, zoom: DEFAULT_ZOOM }
        );
        assert!(matches!(
            initial_viewport(&[single, point("b", 2, 59.8, 30.4)], None, None, &defaults),
            Viewport::FitBounds(_)
        ));
        assert_eq!(
            initial_viewport(&[], None, None, &defaults),
            Viewport::Center { center: Coordinates::DEFAULT_CENTER, zoom: 10 }
        );
    }

    #[tokio::test]
    async fn city_lookup_failure_uses_default_center() {
        let mut geocoder = MockGeocoder::new();
        geocoder
            .expect_geocode()
            .returning(|_| Err(MapError::Geocoder("quota exceeded".into())));
        let defaults = MapDefaults::default();
        let viewport = resolve_viewport(Viewport::GeocodeCity("Kazan".into()), &geocoder, &defaults).await;
        assert_eq!(viewport, Viewport::Center { center: defaults.center, zoom: defaults.zoom });
    }

    #[test]
    fn user_interaction_stops_refits() {
        let scene = MapScene::from_points(&[point("a", 1, 59.94, 30.31), point("b", 2, 59.93, 30.33)]);
        let mut tracker = ViewportTracker::default();
        assert!(matches!(tracker.refit(&scene), Some(Viewport::FitBounds(_))));
        tracker.on_user_change(Coordinates::DEFAULT_CENTER, 15);
        assert_eq!(tracker.refit(&scene), None);
        tracker.reset();
        assert!(tracker.refit(&scene).is_some());
    }

    #[test]
    fn picking_is_ignored_while_editing() {
        let mut picker = CoordinatePicker::default();
        let at = Coordinates::new(59.94, 30.31).unwrap();
        picker.set_editing(true);
        assert!(!picker.on_map_click(at));
        assert_eq!(picker.picked(), None);
        picker.set_editing(false);
        assert!(picker.on_map_click(at));
        assert_eq!(picker.picked(), Some(at));
    }

    #[tokio::test]
    async fn missing_key_never_calls_the_loader() {
        let loader = MockMapSdkLoader::new();
        let state = MapWidget::initialize(&loader, None, DEFAULT_LOAD_TIMEOUT).await;
        assert!(matches!(state, MapAvailability::Unavailable(_)));
    }

    #[tokio::test]
    async fn loader_errors_and_success_are_terminal() {
        let mut ok = MockMapSdkLoader::new();
        ok.expect_load().times(1).returning(|| Ok(()));
        assert_eq!(MapWidget::initialize(&ok, Some("key"), DEFAULT_LOAD_TIMEOUT).await, MapAvailability::Ready);

        let mut failing = MockMapSdkLoader::new();
        failing
            .expect_load()
            .returning(|| Err(MapError::Load("script blocked".into())));
        assert!(matches!(
            MapWidget::initialize(&failing, Some("key"), DEFAULT_LOAD_TIMEOUT).await,
            MapAvailability::Unavailable(reason) if reason.contains("script blocked")
        ));
    }

    struct NeverLoads;

    #[async_trait]
    impl MapSdkLoader for NeverLoads {
        async fn load(&self) -> Result<(), MapError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn slow_sdk_times_out() {
        let state = MapWidget::initialize(&NeverLoads, Some("key"), Duration::from_millis(20)).await;
        assert!(matches!(state, MapAvailability::Unavailable(reason) if reason.contains("did not load")));
    }
}
