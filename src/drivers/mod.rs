//! Concrete driver implementations.
//!
//! `sqlite` is a real backend, feature-gated since it pulls in a bundled C
//! library via `rusqlite`. The document and columnar drivers are in-process
//! stand-ins for MongoDB and a Cassandra-family store respectively, per
//! spec.md §9's non-goal on implementing real wire protocols — they exist so
//! the document and columnar pool facades have something concrete to drive
//! in tests, not as production backends.

#[cfg(feature = "sqlite")]
mod sqlite;

mod memory_columnar;
mod memory_cursor;
mod memory_document;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDriver;

pub use memory_columnar::InMemoryColumnarDriver;
pub use memory_document::InMemoryDocumentDriver;

/// Registers every driver built into this crate with the process-wide
/// [`crate::registry::registry`]. Applications that only need a subset can
/// skip this and register drivers individually instead.
pub fn register_default_drivers() {
    #[cfg(feature = "sqlite")]
    crate::registry::registry().register_driver(SqliteDriver::new());

    crate::registry::registry().register_driver(InMemoryDocumentDriver::new());
    crate::registry::registry().register_driver(InMemoryColumnarDriver::new());
}
