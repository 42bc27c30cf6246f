//! The base connection contract (spec.md §4.2), inherited by every paradigm.

use async_trait::async_trait;

use crate::error::DbResult;

/// The storage-model family a driver/connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Paradigm {
    Relational,
    Document,
    Columnar,
}

impl std::fmt::Display for Paradigm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Paradigm::Relational => "relational",
            Paradigm::Document => "document",
            Paradigm::Columnar => "columnar",
        };
        f.write_str(s)
    }
}

/// Operations common to every paradigm's connection contract.
///
/// Every paradigm contract (`RelationalConnection`, `DocumentConnection`,
/// `ColumnarConnection`) extends this trait.
#[async_trait]
pub trait BaseConnection: Send + Sync {
    /// Idempotent: calling this more than once is a no-op after the first.
    async fn close(&self) -> DbResult<()>;

    /// Reflects the effective closed state, including closure of whatever
    /// this connection ultimately wraps.
    fn is_closed(&self) -> bool;

    /// For pooled handles, releases the connection back to its pool. For a
    /// standalone (unpooled) connection, behaves like [`close`](Self::close).
    async fn return_to_pool(&self) -> DbResult<()>;

    /// Distinguishes a pool-wrapped handle from a raw, standalone connection.
    fn is_pooled(&self) -> bool;

    /// The URL this connection (or its underlying pooled connection) was
    /// obtained with.
    fn get_url(&self) -> &str;
}
