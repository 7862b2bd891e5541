//! # Routes catalogue
//!
//! Creation, editing and the public/owner/favorite listings of routes.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use domains::{
    decode_all, Actor, AppError, BlobStorage, Direction, Document, DocumentStore, FromDocument,
    Query, Result, Route, RouteId, StoreError, UserId, Visibility, Writes,
};
use mime::Mime;
use tracing::{debug, info, instrument, warn};

use crate::paths;
use crate::relations::RelationRepository;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const FAVORITES_OVERFETCH_MIN: usize = 60;
/// Cap of the unordered query used when the store lacks an index for the ordered one.
pub const UNINDEXED_FALLBACK_LIMIT: usize = 200;
pub const MAX_DAYS: u32 = 60;
const MIN_TEXT_CHARS: usize = 2;
const FALLBACK_OWNER_NAME: &str = "Traveler";

#[derive(Debug, Clone, PartialEq)]
pub struct NewRoute {
    pub title: String,
    pub city: String,
    pub days: u32,
    pub visibility: Visibility,
    pub cover_photo_url: Option<String>,
}

/// `None` leaves a field untouched; `cover_photo_url: Some(None)` clears the cover.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutePatch {
    pub title: Option<String>,
    pub city: Option<String>,
    pub days: Option<u32>,
    pub visibility: Option<Visibility>,
    pub cover_photo_url: Option<Option<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteSort {
    #[default]
    New,
    /// The current user's favorites first, newest first within each group.
    Favorites,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListParams {
    pub city: Option<String>,
    pub sort_by: RouteSort,
    pub current_user: Option<UserId>,
    /// Defaults to the catalogue's page size.
    pub limit: Option<usize>,
}

#[derive(Clone)]
pub struct RouteCatalog {
    store: Arc<dyn DocumentStore>,
    relations: RelationRepository,
    page_size: usize,
    favorites_overfetch_min: usize,
}

impl RouteCatalog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            relations: RelationRepository::new(store.clone()),
            store,
            page_size: DEFAULT_PAGE_SIZE,
            favorites_overfetch_min: FAVORITES_OVERFETCH_MIN,
        }
    }

    pub fn with_paging(mut self, page_size: usize, favorites_overfetch_min: usize) -> Self {
        self.page_size = page_size.max(1);
        self.favorites_overfetch_min = favorites_overfetch_min;
        self
    }

    #[instrument(skip(self, route, actor), fields(owner = %actor.id))]
    pub async fn create(&self, route: NewRoute, actor: &Actor) -> Result<RouteId> {
        let title = validated_text("title", &route.title)?;
        let city = validated_text("city", &route.city)?;
        validate_days(route.days)?;

        let writes = Writes::new()
            .set("title", title)
            .set("city", city)
            .set("days", route.days)
            .set("visibility", route.visibility.as_str())
            .set("isPublic", route.visibility.is_public())
            .set_opt("coverPhotoUrl", non_blank(route.cover_photo_url))
            .set("likesCount", 0)
            .set("commentsCount", 0)
            .set("favoritesCount", 0)
            .set("ownerId", actor.id.as_str())
            .set("ownerDisplayName", owner_display_name(actor))
            .server_timestamp("createdAt")
            .server_timestamp("updatedAt");
        let id = self
            .store
            .create(&paths::routes(), writes.build())
            .await
            .map_err(AppError::write)?;
        info!(route = %id, "route created");
        Ok(RouteId::new(id))
    }

    pub async fn get(&self, id: &RouteId) -> Result<Route> {
        self.store
            .get(&paths::route(id))
            .await
            .map_err(AppError::read)?
            .ok_or_else(|| AppError::not_found("route", id))
            .and_then(|doc| Ok(Route::from_document(&doc)?))
    }

    #[instrument(skip(self, patch), fields(route = %id))]
    pub async fn update(&self, id: &RouteId, patch: RoutePatch) -> Result<()> {
        let mut writes = Writes::new();
        if let Some(title) = &patch.title {
            writes = writes.set("title", validated_text("title", title)?);
        }
        if let Some(city) = &patch.city {
            writes = writes.set("city", validated_text("city", city)?);
        }
        if let Some(days) = patch.days {
            validate_days(days)?;
            writes = writes.set("days", days);
        }
        if let Some(visibility) = patch.visibility {
            writes = writes
                .set("visibility", visibility.as_str())
                .set("isPublic", visibility.is_public());
        }
        match patch.cover_photo_url {
            Some(Some(url)) if !url.trim().is_empty() => writes = writes.set("coverPhotoUrl", url),
            Some(_) => writes = writes.delete("coverPhotoUrl"),
            None => {}
        }

        self.store
            .update(&paths::route(id), writes.server_timestamp("updatedAt").build())
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => AppError::not_found("route", id),
                other => AppError::write(other),
            })?;
        info!("route updated");
        Ok(())
    }

    #[instrument(skip(self), fields(route = %id))]
    pub async fn delete(&self, id: &RouteId) -> Result<()> {
        self.store
            .delete(&paths::route(id))
            .await
            .map_err(AppError::write)?;
        info!("route deleted");
        Ok(())
    }

    /// Uploads a cover photo to `covers/{route}` and stores its URL on the route.
    #[instrument(skip(self, blobs, data), fields(route = %id, bytes = data.len()))]
    pub async fn upload_cover(
        &self,
        blobs: &dyn BlobStorage,
        id: &RouteId,
        data: Bytes,
        content_type: &Mime,
    ) -> Result<String> {
        if content_type.type_() != mime::IMAGE {
            return Err(AppError::ValidationError(format!(
                "cover photo must be an image, got {content_type}"
            )));
        }
        let url = blobs
            .upload(&format!("covers/{id}"), data, content_type)
            .await
            .map_err(AppError::write)?;
        self.update(
            id,
            RoutePatch {
                cover_photo_url: Some(Some(url.clone())),
                ..RoutePatch::default()
            },
        )
        .await?;
        Ok(url)
    }

    #[instrument(skip(self))]
    pub async fn list_public(&self, params: ListParams) -> Result<Vec<Route>> {
        let limit = params.limit.unwrap_or(self.page_size).max(1);
        let favorites = match (&params.sort_by, &params.current_user) {
            (RouteSort::Favorites, Some(user)) => Some(user),
            _ => None,
        };
        let fetch = match favorites {
            Some(_) => (limit * 2).max(self.favorites_overfetch_min),
            None => limit,
        };

        let mut query = Query::new(paths::routes()).eq("isPublic", true);
        if let Some(city) = params.city.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            query = query.eq("city", city);
        }
        let mut routes = self.newest_first(query, fetch).await?;

        if let Some(user) = favorites {
            let ids: HashSet<RouteId> = self.relations.favorite_route_ids(user).await?.into_iter().collect();
            // Stable: newest-first order is kept inside each group.
            let (mut first, rest): (Vec<_>, Vec<_>) =
                routes.into_iter().partition(|r| ids.contains(&r.id));
            first.extend(rest);
            routes = first;
        }
        routes.truncate(limit);
        debug!(found = routes.len(), "listed public routes");
        Ok(routes)
    }

    pub async fn list_for_owner(&self, owner: &UserId) -> Result<Vec<Route>> {
        let query = Query::new(paths::routes()).eq("ownerId", owner.as_str());
        self.newest_first(query, UNINDEXED_FALLBACK_LIMIT).await
    }

    /// Routes the actor marked as favorite. Missing or unreadable routes are skipped.
    pub async fn list_favorites(&self, actor: &UserId) -> Result<Vec<Route>> {
        let ids = self.relations.favorite_route_ids(actor).await?;
        let mut routes = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get(&id).await {
                Ok(route) => routes.push(route),
                Err(error) => warn!(route = %id, %error, "skipping favorite"),
            }
        }
        Ok(routes)
    }

    /// Ordered by `createdAt` descending. Without a matching index the store is asked for an
    /// unordered, capped result that is then sorted here.
    async fn newest_first(&self, query: Query, limit: usize) -> Result<Vec<Route>> {
        let ordered = query.clone().order_by("createdAt", Direction::Desc).limit(limit);
        match self.store.list(&ordered).await {
            Ok(docs) => decode_routes(&docs),
            Err(StoreError::MissingIndex(index)) => {
                warn!(%index, "missing index, sorting locally");
                let docs = self
                    .store
                    .list(&query.limit(UNINDEXED_FALLBACK_LIMIT))
                    .await
                    .map_err(AppError::read)?;
                let mut routes = decode_routes(&docs)?;
                routes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                routes.truncate(limit);
                Ok(routes)
            }
            Err(e) => Err(AppError::read(e)),
        }
    }
}

fn decode_routes(docs: &[Document]) -> Result<Vec<Route>> {
    Ok(decode_all(docs)?)
}

fn validated_text(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.chars().count() < MIN_TEXT_CHARS {
        return Err(AppError::ValidationError(format!(
            "{field} must have at least {MIN_TEXT_CHARS} characters"
        )));
    }
    Ok(value.to_owned())
}

fn validate_days(days: u32) -> Result<()> {
    if !(1..=MAX_DAYS).contains(&days) {
        return Err(AppError::ValidationError(format!(
            "days must be between 1 and {MAX_DAYS}, got {days}"
        )));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Display name, else the e-mail local part, else a generic name.
pub fn owner_display_name(actor: &Actor) -> String {
    if let Some(name) = actor.display_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_owned();
    }
    actor
        .email
        .as_deref()
        .and_then(|email| email.split('@').next())
        .map(str::trim)
        .filter(|local| !local.is_empty())
        .unwrap_or(FALLBACK_OWNER_NAME)
        .to_owned()
}
