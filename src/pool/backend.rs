//! The [`PoolBackend`] seam (spec.md §9 design note).
//!
//! A single generic pool core (`PoolInner<B>`) drives borrow/release/
//! maintenance/shutdown identically for all three paradigms. What differs
//! per paradigm — how a connection is opened, how it's validated, and what
//! needs to happen before a used connection re-enters the idle queue — is
//! factored out into this trait, so the pool algorithm itself is written
//! exactly once.

use async_trait::async_trait;

use crate::connection::BaseConnection;
use crate::error::DbResult;
use crate::registry::ConnectOptions;
use crate::url::ConnectionUrl;

use super::options::PoolConfig;

#[async_trait]
pub trait PoolBackend: Send + Sync + 'static {
    /// The concrete handle type this backend's pool hands out, already
    /// bound to a specific paradigm contract (e.g. `Arc<dyn
    /// RelationalConnection>`). Always `Clone` — pool internals keep their
    /// own reference alongside the one lent to the caller.
    type Connection: BaseConnection + Clone + 'static;

    /// Opens one fresh connection, e.g. by dispatching through a
    /// paradigm-specific driver.
    async fn open(&self, url: &ConnectionUrl, options: &ConnectOptions) -> DbResult<Self::Connection>;

    /// Applies pool-wide settings to a freshly opened connection, e.g.
    /// `config.transaction_isolation` (spec.md §3, §6). Runs once per
    /// connection, right after `open` succeeds and before it is ever
    /// handed out. The default is a no-op for backends/paradigms with
    /// nothing to configure (e.g. document).
    async fn configure(&self, _conn: &Self::Connection, _config: &PoolConfig) -> DbResult<()> {
        Ok(())
    }

    /// Validation probe run on borrow (if `test_on_borrow`) and on return
    /// (if `test_on_return`). A cheap round-trip, e.g. `SELECT 1` or a ping.
    async fn validate(&self, conn: &Self::Connection) -> DbResult<()>;

    /// Runs just before a used connection re-enters the idle queue, e.g.
    /// rolling back an open transaction left dangling by the caller. Errors
    /// are logged by the caller, not propagated: cleanup failing is not a
    /// reason to refuse returning the connection to the pool.
    async fn pre_return_cleanup(&self, conn: &Self::Connection);
}
