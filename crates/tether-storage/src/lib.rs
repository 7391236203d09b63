//! # tether-storage
//!
//! The storage boundary for Tether: a generic relational client addressed by
//! table name and filters, with rows represented as JSON maps.
//!
//! The Tether core never introspects schemas. Writes are speculative; when
//! they fail, the backend's raw error message is translated by exactly one
//! function ([`ErrorShape::of`]) into a closed set of tagged shapes, and the
//! adaptive-write logic upstream reacts to those tags. If the backend's error
//! dialect ever changes, that function is the only thing to update.

pub mod client;
pub mod error;
pub mod pg;

#[cfg(any(test, feature = "fixtures"))]
pub mod fake;

pub use client::{Filter, Row, SelectSpec, StorageClient};
pub use error::{ErrorShape, StorageError};
pub use pg::PgStorage;
