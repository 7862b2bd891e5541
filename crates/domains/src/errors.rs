//! # AppError
//!
//! Centralized error handling for the wayfarer core.
//! Collaborator failures arrive as [`StoreError`] and are categorised into [`AppError`].

use thiserror::Error;

use crate::decode::DecodeError;
use crate::models::PointId;

/// Failure reported by the persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed document does not exist (e.g., partial update on a deleted point)
    #[error("document not found: {0}")]
    NotFound(String),

    /// The collaborator's access rules refused the operation
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The query needs a composite index the collaborator does not have
    #[error("missing index: {0}")]
    MissingIndex(String),

    /// Transport or backend failure
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A create collided with an existing document
    #[error("conflict: {0}")]
    Conflict(String),

    /// A payload could not be (de)serialised by the collaborator
    #[error("serialization failure: {0}")]
    Serialization(String),
}

/// The primary error type for all core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// A point was submitted without a picked or supplied location
    #[error("choose a location on the map before adding a point")]
    MissingCoordinates,

    /// Resource not found (e.g., Route, Point, Comment)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Any create/update/delete rejected by the collaborator
    #[error("remote write failed: {0}")]
    RemoteWriteFailure(#[source] StoreError),

    /// Any get/list rejected by the collaborator
    #[error("remote read failed: {0}")]
    RemoteReadFailure(#[source] StoreError),

    /// The first order write of a sequential swap landed, the second did not
    #[error("swap of {applied} and {failed} left both points with the same order: {source}")]
    PartialSwapFailure {
        applied: PointId,
        failed: PointId,
        #[source]
        source: StoreError,
    },

    /// A mutating operation needs a signed-in actor
    #[error("sign in to continue")]
    AuthenticationRequired,

    /// The actor is signed in but not allowed to do this
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Validation failure (e.g., empty title, comment too long)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Resource already exists (e.g., duplicate account e-mail)
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored document did not have the expected shape
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl AppError {
    /// Categorises a failure raised by a write call.
    pub fn write(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => AppError::NotFound("document".into(), path),
            other => AppError::RemoteWriteFailure(other),
        }
    }

    /// Categorises a failure raised by a read call.
    pub fn read(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => AppError::NotFound("document".into(), path),
            other => AppError::RemoteReadFailure(other),
        }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        AppError::NotFound(entity.to_owned(), id.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(..))
    }
}

/// A specialized Result type for wayfarer core logic.
pub type Result<T> = std::result::Result<T, AppError>;
