//! A paradigm-aware connection pooling layer over relational, document, and
//! columnar database backends.
//!
//! A URL of the form `cpp_dbc:<backend>://...` is dispatched through the
//! process-wide [`registry`] to the driver that owns that backend's scheme.
//! Each of the three paradigm modules ([`relational`], [`document`],
//! [`columnar`]) exposes its own pooled-connection facade
//! (`RelationalPool`, `DocumentPool`, `ColumnarPool`) built on one shared,
//! generic pool engine (`pool`, private) so the admission control, idle
//! queue, validation, and maintenance logic is written and tested exactly
//! once.
//!
//! Every operation returns a [`error::DbResult`] rather than panicking or
//! unwinding — there is no "throwing" counterpart API in this crate.
//!
//! ```no_run
//! # async fn example() -> cpp_dbc::error::DbResult<()> {
//! let pool = cpp_dbc::relational::RelationalPool::new(
//!     "cpp_dbc:sqlite://:memory:",
//!     Default::default(),
//!     Default::default(),
//!     cpp_dbc::drivers::SqliteDriver::new(),
//! ).await?;
//!
//! let conn = pool.acquire().await?;
//! conn.execute_update("CREATE TABLE t (id INTEGER)").await?;
//! conn.return_to_pool().await?;
//! # Ok(())
//! # }
//! ```

pub mod columnar;
pub mod connection;
pub mod document;
pub mod drivers;
pub mod error;
mod pool;
pub mod registry;
pub mod relational;
pub mod url;

pub use connection::{BaseConnection, Paradigm};
pub use error::{DbResult, Error, ErrorKind};
pub use pool::PoolConfig;
pub use registry::{registry, ConnectOptions, Driver, DriverRegistry};
pub use url::ConnectionUrl;
