//! The pooled-handle protocol (spec.md §4.6).
//!
//! [`HandleCore`] is the concurrency substrate shared by all three
//! paradigms' pooled-connection wrappers: the `active`/`closed` atomics, the
//! shared `pool_alive` flag, timestamps for idle/lifetime eviction, and the
//! compare-and-exchange close semantics that make `close()` and
//! `return_to_pool()` idempotent and race-free. Each paradigm wraps a
//! `HandleCore<B>` in a thin type implementing that paradigm's connection
//! trait by delegating to the wrapped connection (see
//! `relational::pool`, `document::pool`, `columnar::pool`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::connection::BaseConnection;
use crate::error::DbResult;

use super::backend::PoolBackend;
use super::core::PoolInner;

pub(crate) struct HandleCore<B: PoolBackend> {
    pub(crate) conn: B::Connection,
    pool: Weak<PoolInner<B>>,
    pool_alive: Arc<AtomicBool>,
    url: String,
    created_at: Instant,
    last_used: Mutex<Instant>,
    /// Lent out to a caller right now. Cleared by `release_or_close` on
    /// `return_to_pool`, checked (and not re-set) by `close`.
    pub(crate) active: AtomicBool,
    /// Set exactly once, by whichever of `close`/`return_to_pool` wins the
    /// compare-exchange race.
    closed: AtomicBool,
    self_weak: Weak<HandleCore<B>>,
}

impl<B: PoolBackend> HandleCore<B> {
    pub(crate) fn new(
        conn: B::Connection,
        pool: Weak<PoolInner<B>>,
        pool_alive: Arc<AtomicBool>,
        url: String,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_weak| Self {
            conn,
            pool,
            pool_alive,
            url,
            created_at: Instant::now(),
            last_used: Mutex::new(Instant::now()),
            active: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            self_weak: self_weak.clone(),
        })
    }

    pub(crate) fn touch(&self) {
        *self.last_used.lock().unwrap() = Instant::now();
    }

    pub(crate) fn idle_duration(&self) -> Duration {
        self.last_used.lock().unwrap().elapsed()
    }

    pub(crate) fn life_duration(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub(crate) fn assert_open(&self) -> DbResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(crate::error::Error::connection_closed())
        } else {
            Ok(())
        }
    }

    /// Runs `f` against the wrapped connection after checking this handle
    /// hasn't been closed out from under the caller, refreshing the idle
    /// timestamp on success. Every delegating paradigm wrapper routes its
    /// calls through this.
    pub(crate) fn guarded<T>(&self, f: impl FnOnce(&B::Connection) -> T) -> DbResult<T> {
        self.assert_open()?;
        self.touch();
        Ok(f(&self.conn))
    }

    /// Shared by `BaseConnection::close` and `BaseConnection::return_to_pool`:
    /// both funnel through here, and only the first caller does anything.
    async fn release_or_close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        if !self.pool_alive.load(Ordering::Acquire) {
            let _ = self.conn.close().await;
            return;
        }

        let Some(pool) = self.pool.upgrade() else {
            let _ = self.conn.close().await;
            return;
        };
        let Some(handle) = self.self_weak.upgrade() else {
            let _ = self.conn.close().await;
            return;
        };

        // `closed` is about to be reopened for reuse: a returned handle
        // keeps living in the idle queue, so flip it back before handing it
        // to the pool's release path.
        self.closed.store(false, Ordering::Release);
        pool.return_connection(handle).await;
    }
}

#[async_trait]
impl<B: PoolBackend> BaseConnection for HandleCore<B> {
    async fn close(&self) -> DbResult<()> {
        self.release_or_close().await;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.conn.is_closed()
    }

    async fn return_to_pool(&self) -> DbResult<()> {
        self.release_or_close().await;
        Ok(())
    }

    fn is_pooled(&self) -> bool {
        true
    }

    fn get_url(&self) -> &str {
        &self.url
    }
}
