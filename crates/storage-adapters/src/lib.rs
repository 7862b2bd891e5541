//! # storage-adapters
//!
//! Implementations of the persistence, blob storage and geocoder ports.

pub mod geocoder;
#[cfg(feature = "media-local")]
pub mod local_blobs;
pub mod memory;

pub use geocoder::parse_response as parse_geocoder_response;
#[cfg(feature = "geocoder-http")]
pub use geocoder::HttpGeocoder;
#[cfg(feature = "media-local")]
pub use local_blobs::LocalBlobStorage;
pub use memory::{MemoryStore, WriteHold};
