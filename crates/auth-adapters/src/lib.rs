//! # auth-adapters
//!
//! `AuthProvider` implementations and the session context built on top of them.

pub mod local;
pub mod session;

pub use local::LocalAuth;
pub use session::SessionContext;
