//! cs-core: shared types, IDs, errors, and configuration.
//!
//! This crate is the foundational dependency for the other cs-* crates,
//! providing typed identifiers, a unified error type with HTTP status
//! mapping, the media-domain types exchanged between the playback
//! controller and the server, and application configuration.

pub mod config;
pub mod error;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use media::*;
