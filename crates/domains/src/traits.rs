//! # Core Traits (Ports)
//!
//! External collaborators the core talks to. Adapters in `storage-adapters` and
//! `auth-adapters` implement these; services only ever see the trait objects.

use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::document::{CollectionPath, DocRef, Document, Query, WriteSet};
use crate::errors::{Result, StoreError};
use crate::models::Actor;
use crate::subscription::Subscription;

/// Document-style persistence contract for routes, points, comments and relations.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, doc: &DocRef) -> std::result::Result<Option<Document>, StoreError>;

    async fn list(&self, query: &Query) -> std::result::Result<Vec<Document>, StoreError>;

    /// Creates a document with a collaborator-assigned id and returns that id.
    async fn create(
        &self,
        collection: &CollectionPath,
        data: WriteSet,
    ) -> std::result::Result<String, StoreError>;

    /// Creates or replaces a document whose id the caller chooses.
    async fn set(&self, doc: &DocRef, data: WriteSet) -> std::result::Result<(), StoreError>;

    /// Applies only the listed fields. Fails with `NotFound` if the document is absent.
    async fn update(&self, doc: &DocRef, patch: WriteSet) -> std::result::Result<(), StoreError>;

    /// Deleting an absent document is not an error.
    async fn delete(&self, doc: &DocRef) -> std::result::Result<(), StoreError>;

    /// Applies several partial updates atomically: either all land or none do.
    async fn commit(&self, updates: Vec<(DocRef, WriteSet)>) -> std::result::Result<(), StoreError>;

    /// Pushes the query's full result set now and after every change to it.
    fn subscribe(&self, query: &Query) -> std::result::Result<Subscription<Vec<Document>>, StoreError>;

    /// Pushes the document (or its absence) now and after every change to it.
    fn watch(&self, doc: &DocRef) -> std::result::Result<Subscription<Option<Document>>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUp {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

/// Identity contract: who is signed in, and when that changes.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Synchronous "currently signed in actor" accessor.
    fn current_actor(&self) -> Option<Actor>;

    /// Sign-in/sign-out transitions. `None` while signed out.
    fn subscribe(&self) -> watch::Receiver<Option<Actor>>;

    async fn sign_up(&self, request: SignUp) -> Result<Actor>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Actor>;

    async fn sign_out(&self) -> Result<()>;

    /// Renames the signed-in actor; `None` or a blank name keeps the current one.
    /// The photo is left untouched. Fails with `AuthenticationRequired` while signed out.
    async fn update_profile(&self, display_name: Option<String>) -> Result<Actor>;
}

/// Blob storage contract for cover photos and point photos.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Stores the bytes under `path` and returns a retrievable URL.
    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        content_type: &Mime,
    ) -> std::result::Result<String, StoreError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("map SDK failed to load: {0}")]
    Load(String),
    #[error("geocoder request failed: {0}")]
    Geocoder(String),
}

/// Deferred loader for the third-party map SDK.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MapSdkLoader: Send + Sync {
    /// Resolves once the SDK can render.
    async fn load(&self) -> std::result::Result<(), MapError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub precision: Option<String>,
}

/// Address-to-coordinates lookup.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the address resolves to nothing usable.
    async fn geocode(&self, query: &str) -> std::result::Result<Option<GeocodeResult>, MapError>;
}
