//! wayfarer/crates/domains/src/lib.rs
//!
//! Entities, the document boundary and the port traits of the wayfarer core.

pub mod decode;
pub mod document;
pub mod errors;
pub mod models;
pub mod subscription;
pub mod traits;

// Re-exporting for easier access in other crates
pub use decode::*;
pub use document::*;
pub use errors::*;
pub use models::*;
pub use subscription::*;
pub use traits::*;
