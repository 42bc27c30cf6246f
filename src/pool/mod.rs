//! The generic connection pool (spec.md §4.5, §9).
//!
//! One algorithm (`PoolInner<B>`, in [`core`]) drives borrow, release,
//! maintenance and shutdown for all three paradigms; [`PoolBackend`] is the
//! seam a paradigm plugs into to say how a connection of its kind is
//! opened, validated, and cleaned up before reuse.

mod backend;
mod core;
mod handle;
mod idle;
pub(crate) mod macros;
mod options;

pub(crate) use backend::PoolBackend;
pub use options::PoolConfig;
pub(crate) use handle::HandleCore;

use std::sync::Arc;

use crate::error::DbResult;
use crate::registry::ConnectOptions;
use crate::url::ConnectionUrl;

use self::core::PoolInner;

/// A connection pool over one backend, generic in the [`PoolBackend`] it
/// was built with. Not exposed directly: each paradigm wraps this in a
/// facade (`relational::RelationalPool`, etc.) that knows how to turn a
/// borrowed handle into its paradigm's connection trait object. Cheaply
/// `Clone`: clones share the same underlying pool.
pub(crate) struct Pool<B: PoolBackend> {
    inner: Arc<PoolInner<B>>,
}

impl<B: PoolBackend> Clone for Pool<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: PoolBackend> Pool<B> {
    /// Builds a pool, eagerly opening `config.initial_size` connections and
    /// starting the maintenance worker. Fails if even the first connection
    /// cannot be opened.
    pub async fn new(
        url: &str,
        connect_options: ConnectOptions,
        config: PoolConfig,
        backend: B,
    ) -> DbResult<Self> {
        let url = ConnectionUrl::parse(url)?;
        let inner = PoolInner::establish(url, connect_options, config, backend).await?;
        Ok(Self { inner })
    }

    /// Borrows a connection, creating fresh capacity or waiting up to
    /// `max_wait` as needed. See spec.md §4.5.2.
    pub async fn acquire(&self) -> DbResult<Arc<HandleCore<B>>> {
        self.inner.acquire().await
    }

    /// Gracefully shuts the pool down: stops accepting new borrows, waits
    /// briefly for outstanding handles to come back, then force-closes
    /// whatever's left. Idempotent.
    pub async fn close(&self) {
        self.inner.shutdown().await
    }

    pub fn url(&self) -> &str {
        self.inner.url().as_str()
    }

    pub fn size(&self) -> u32 {
        self.inner.size()
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle_count()
    }

    pub fn active_count(&self) -> u32 {
        self.inner.active_count()
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }
}
