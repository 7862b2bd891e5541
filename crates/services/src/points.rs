//! # Point Collection Manager
//!
//! Owns the ordered point list of the route currently open. The list is rebuilt
//! from the store on every load and after every successful mutation; it is never
//! patched locally.
//!
//! Order values may have gaps and, under concurrent editors, duplicates. Rendering
//! order is a stable sort on `order`, so ties keep the arrival order the store
//! returned them in.

use std::sync::Arc;

use domains::{
    decode_all, AppError, Coordinates, Direction, DocumentStore, PlaceTag, PointId, Query, Result,
    RouteId, RoutePoint, StoreError, WriteSet, Writes,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::paths;

/// How `swap` writes the two order values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStrategy {
    /// One atomic multi-document commit.
    #[default]
    Atomic,
    /// Two independent updates; a failure of the second is reported as `PartialSwapFailure`.
    Sequential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// Form data for a new point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointDraft {
    pub title: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub photo_url: Option<String>,
    pub category: PlaceTag,
    /// Defaults to [`next_order`] of the loaded list.
    pub order: Option<u32>,
    /// Takes precedence over coordinates picked on the map.
    pub coordinates: Option<Coordinates>,
}

/// Partial edit of a point. `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub photo_url: Option<String>,
    pub category: Option<PlaceTag>,
    pub order: Option<u32>,
    pub coordinates: Option<Coordinates>,
}

/// `max(order) + 1` over the given list, or 1 when it is empty.
/// Pure: concurrent additions elsewhere are not seen and may produce duplicates.
pub fn next_order(points: &[RoutePoint]) -> u32 {
    points
        .iter()
        .map(|p| p.order)
        .max()
        .map_or(1, |max| max.saturating_add(1))
}

/// Stable sort by `order`; equal orders keep their relative position.
pub fn sort_points(points: &mut [RoutePoint]) {
    points.sort_by_key(|p| p.order);
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_owned)
}

fn require_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::ValidationError("point title must not be empty".into()));
    }
    Ok(title.to_owned())
}

fn require_order(order: u32) -> Result<u32> {
    if order == 0 {
        return Err(AppError::ValidationError("point order starts at 1".into()));
    }
    Ok(order)
}

pub struct PointCollection {
    store: Arc<dyn DocumentStore>,
    route_id: RouteId,
    points: Vec<RoutePoint>,
    swap_strategy: SwapStrategy,
}

impl PointCollection {
    pub fn new(store: Arc<dyn DocumentStore>, route_id: RouteId) -> Self {
        Self {
            store,
            route_id,
            points: Vec::new(),
            swap_strategy: SwapStrategy::default(),
        }
    }

    pub fn with_swap_strategy(mut self, strategy: SwapStrategy) -> Self {
        self.swap_strategy = strategy;
        self
    }

    pub fn route_id(&self) -> &RouteId {
        &self.route_id
    }

    /// The list as of the last load, sorted by order.
    pub fn points(&self) -> &[RoutePoint] {
        &self.points
    }

    pub fn get(&self, id: &PointId) -> Option<&RoutePoint> {
        self.points.iter().find(|p| &p.id == id)
    }

    pub fn next_order(&self) -> u32 {
        next_order(&self.points)
    }

    /// Fetches every point of the route, sorted by order ascending.
    #[instrument(skip(self), fields(route_id = %self.route_id))]
    pub async fn load(&mut self) -> Result<&[RoutePoint]> {
        let route = paths::route(&self.route_id);
        if self.store.get(&route).await.map_err(AppError::read)?.is_none() {
            return Err(AppError::not_found("route", &self.route_id));
        }

        let query = Query::new(paths::points(&self.route_id)).order_by("order", Direction::Asc);
        let docs = self.store.list(&query).await.map_err(AppError::read)?;
        let mut points: Vec<RoutePoint> = decode_all(&docs)?;
        sort_points(&mut points);

        debug!(count = points.len(), "points loaded");
        self.points = points;
        Ok(&self.points)
    }

    /// Creates one point and reloads. Coordinates come from the draft, else from
    /// the location picked on the map; with neither nothing is written.
    #[instrument(skip(self, draft), fields(route_id = %self.route_id))]
    pub async fn add(&mut self, draft: PointDraft, picked: Option<Coordinates>) -> Result<PointId> {
        let coordinates = draft
            .coordinates
            .or(picked)
            .ok_or(AppError::MissingCoordinates)?;
        let title = require_title(&draft.title)?;
        let order = require_order(draft.order.unwrap_or_else(|| self.next_order()))?;

        let writes = Writes::new()
            .set("title", title)
            .set("order", order)
            .set("category", draft.category.as_str())
            .set("lat", coordinates.lat())
            .set("lng", coordinates.lng())
            .set_opt("address", trimmed(draft.address.as_deref()))
            .set_opt("description", trimmed(draft.description.as_deref()))
            .set_opt("photoUrl", trimmed(draft.photo_url.as_deref()))
            .server_timestamp("createdAt")
            .server_timestamp("updatedAt")
            .build();

        let id = self
            .store
            .create(&paths::points(&self.route_id), writes)
            .await
            .map_err(AppError::write)?;
        info!(point_id = %id, order, "point added");

        self.load().await?;
        Ok(PointId::new(id))
    }

    /// Writes only the provided fields plus a fresh `updatedAt`, then reloads.
    /// Blank optional text in a patch is ignored rather than clearing the field.
    #[instrument(skip(self, patch), fields(route_id = %self.route_id))]
    pub async fn update(&mut self, id: &PointId, patch: PointPatch) -> Result<()> {
        let mut writes = Writes::new().server_timestamp("updatedAt");
        if let Some(title) = patch.title.as_deref() {
            writes = writes.set("title", require_title(title)?);
        }
        if let Some(order) = patch.order {
            writes = writes.set("order", require_order(order)?);
        }
        if let Some(category) = patch.category {
            writes = writes.set("category", category.as_str());
        }
        if let Some(coordinates) = patch.coordinates {
            writes = writes
                .set("lat", coordinates.lat())
                .set("lng", coordinates.lng());
        }
        writes = writes
            .set_opt("address", trimmed(patch.address.as_deref()))
            .set_opt("description", trimmed(patch.description.as_deref()))
            .set_opt("photoUrl", trimmed(patch.photo_url.as_deref()));

        self.write_point(id, writes.build()).await?;
        info!(point_id = %id, "point updated");
        self.load().await?;
        Ok(())
    }

    /// Unconditional delete. Remaining points keep their order values.
    #[instrument(skip(self), fields(route_id = %self.route_id))]
    pub async fn remove(&mut self, id: &PointId) -> Result<()> {
        self.store
            .delete(&paths::points(&self.route_id).doc(id.as_str()))
            .await
            .map_err(AppError::write)?;
        info!(point_id = %id, "point removed");
        self.load().await?;
        Ok(())
    }

    /// Exchanges the order values of two loaded points, then reloads.
    #[instrument(skip(self), fields(route_id = %self.route_id, strategy = ?self.swap_strategy))]
    pub async fn swap(&mut self, a: &PointId, b: &PointId) -> Result<()> {
        let order_a = self.get(a).ok_or_else(|| AppError::not_found("point", a))?.order;
        let order_b = self.get(b).ok_or_else(|| AppError::not_found("point", b))?.order;
        if a == b {
            return Ok(());
        }

        let collection = paths::points(&self.route_id);
        let write_a = Writes::new().set("order", order_b).server_timestamp("updatedAt").build();
        let write_b = Writes::new().set("order", order_a).server_timestamp("updatedAt").build();

        match self.swap_strategy {
            SwapStrategy::Atomic => {
                self.store
                    .commit(vec![
                        (collection.doc(a.as_str()), write_a),
                        (collection.doc(b.as_str()), write_b),
                    ])
                    .await
                    .map_err(AppError::write)?;
            }
            SwapStrategy::Sequential => {
                self.write_point(a, write_a).await?;
                if let Err(source) = self.store.update(&collection.doc(b.as_str()), write_b).await {
                    warn!(applied = %a, failed = %b, error = %source, "swap left a duplicate order");
                    self.reload_after_partial_swap().await;
                    return Err(AppError::PartialSwapFailure {
                        applied: a.clone(),
                        failed: b.clone(),
                        source,
                    });
                }
            }
        }

        info!(a = %a, b = %b, order_a, order_b, "points swapped");
        self.load().await?;
        Ok(())
    }

    /// Swaps the point with its neighbour in the sorted list.
    /// Returns `false` without writing when the point is already at that edge.
    pub async fn move_point(&mut self, id: &PointId, direction: MoveDirection) -> Result<bool> {
        let index = self
            .points
            .iter()
            .position(|p| &p.id == id)
            .ok_or_else(|| AppError::not_found("point", id))?;
        let neighbour = match direction {
            MoveDirection::Up => index.checked_sub(1),
            MoveDirection::Down => Some(index + 1).filter(|j| *j < self.points.len()),
        };
        let Some(neighbour) = neighbour else {
            return Ok(false);
        };

        let other = self.points[neighbour].id.clone();
        self.swap(id, &other).await?;
        Ok(true)
    }

    async fn write_point(&self, id: &PointId, writes: WriteSet) -> Result<()> {
        self.store
            .update(&paths::points(&self.route_id).doc(id.as_str()), writes)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => AppError::not_found("point", id),
                other => AppError::RemoteWriteFailure(other),
            })
    }

    async fn reload_after_partial_swap(&mut self) {
        if let Err(e) = self.load().await {
            warn!(error = %e, "reload after partial swap failed");
        }
    }
}
