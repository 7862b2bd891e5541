//! Toggleable relations: route likes, comment likes and favorites.
//!
//! A relation is "on" while its record exists. Records are keyed by the actor id,
//! so there is at most one per (subject, actor, kind).

use std::sync::Arc;

use domains::{
    AppError, CollectionPath, CommentId, DocRef, DocumentStore, Query, Result, RouteId,
    Subscription, UserId, Writes,
};
use tracing::{debug, instrument};

use crate::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    RouteLike,
    CommentLike,
    Favorite,
}

/// What the relation points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelationSubject {
    RouteLike(RouteId),
    CommentLike(RouteId, CommentId),
    Favorite(RouteId),
}

impl RelationSubject {
    pub fn kind(&self) -> RelationKind {
        match self {
            RelationSubject::RouteLike(_) => RelationKind::RouteLike,
            RelationSubject::CommentLike(..) => RelationKind::CommentLike,
            RelationSubject::Favorite(_) => RelationKind::Favorite,
        }
    }

    /// Collection whose size is the public counter. Favorites are not counted.
    pub fn counter_collection(&self) -> Option<CollectionPath> {
        match self {
            RelationSubject::RouteLike(route) => Some(paths::route_likes(route)),
            RelationSubject::CommentLike(route, comment) => Some(paths::comment_likes(route, comment)),
            RelationSubject::Favorite(_) => None,
        }
    }

    pub fn for_actor(self, actor: UserId) -> RelationKey {
        RelationKey { subject: self, actor }
    }
}

/// Identity key of one relation: (subject, actor, kind).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationKey {
    pub subject: RelationSubject,
    pub actor: UserId,
}

impl RelationKey {
    pub fn kind(&self) -> RelationKind {
        self.subject.kind()
    }

    pub fn doc(&self) -> DocRef {
        match &self.subject {
            RelationSubject::RouteLike(route) => paths::route_likes(route).doc(self.actor.as_str()),
            RelationSubject::CommentLike(route, comment) => {
                paths::comment_likes(route, comment).doc(self.actor.as_str())
            }
            RelationSubject::Favorite(route) => paths::favorites(&self.actor).doc(route.as_str()),
        }
    }
}

#[derive(Clone)]
pub struct RelationRepository {
    store: Arc<dyn DocumentStore>,
}

impl RelationRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Authoritative existence check.
    pub async fn exists(&self, key: &RelationKey) -> Result<bool> {
        let doc = self.store.get(&key.doc()).await.map_err(AppError::read)?;
        Ok(doc.is_some())
    }

    pub async fn count(&self, subject: &RelationSubject) -> Result<u64> {
        let collection = Self::counted(subject)?;
        let docs = self
            .store
            .list(&Query::new(collection))
            .await
            .map_err(AppError::read)?;
        Ok(docs.len() as u64)
    }

    /// One round trip from the caller's view: delete when present, create otherwise.
    /// Returns whether the relation is on afterwards.
    #[instrument(skip(self), fields(doc = %key.doc()))]
    pub async fn toggle(&self, key: &RelationKey) -> Result<bool> {
        let doc = key.doc();
        let existing = self.store.get(&doc).await.map_err(AppError::write)?;
        let on = if existing.is_some() {
            self.store.delete(&doc).await.map_err(AppError::write)?;
            false
        } else {
            self.store
                .set(&doc, Writes::new().server_timestamp("createdAt").build())
                .await
                .map_err(AppError::write)?;
            true
        };
        debug!(on, "relation toggled");
        Ok(on)
    }

    /// Pushes the counter whenever anyone's relation changes.
    pub fn watch_count(&self, subject: &RelationSubject) -> Result<Subscription<u64>> {
        let collection = Self::counted(subject)?;
        let sub = self
            .store
            .subscribe(&Query::new(collection))
            .map_err(AppError::read)?;
        Ok(sub.map(|docs| docs.len() as u64))
    }

    /// Pushes this actor's on/off state, including changes made from other sessions.
    pub fn watch_exists(&self, key: &RelationKey) -> Result<Subscription<bool>> {
        let sub = self.store.watch(&key.doc()).map_err(AppError::read)?;
        Ok(sub.map(|doc| doc.is_some()))
    }

    /// Ids of every route the actor marked as favorite, in the order they were added.
    pub async fn favorite_route_ids(&self, actor: &UserId) -> Result<Vec<RouteId>> {
        let docs = self
            .store
            .list(&Query::new(paths::favorites(actor)))
            .await
            .map_err(AppError::read)?;
        Ok(docs.into_iter().map(|d| RouteId::new(d.id)).collect())
    }

    fn counted(subject: &RelationSubject) -> Result<CollectionPath> {
        subject.counter_collection().ok_or_else(|| {
            AppError::ValidationError(format!("{:?} relations have no counter", subject.kind()))
        })
    }
}
