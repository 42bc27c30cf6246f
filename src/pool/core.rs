//! The generic pool core (spec.md §4.5): construction, borrow, release,
//! maintenance and shutdown, written once and shared by every paradigm via
//! [`PoolBackend`]. This is the central algorithm the specification singles
//! out as the hardest piece.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::{DbResult, Error};
use crate::registry::ConnectOptions;
use crate::url::ConnectionUrl;

use super::backend::PoolBackend;
use super::handle::HandleCore;
use super::idle::IdleQueue;
use super::options::PoolConfig;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);
const BORROW_POLL_INTERVAL: Duration = Duration::from_millis(10);
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) struct PoolInner<B: PoolBackend> {
    url: ConnectionUrl,
    connect_options: ConnectOptions,
    config: PoolConfig,
    backend: B,

    /// Every handle this pool has ever created and not yet permanently
    /// dropped, whether currently idle, on loan, or mid-creation.
    all: Mutex<Vec<Arc<HandleCore<B>>>>,
    /// Admission counter, kept in lockstep with `all`'s length. Separate
    /// from the `all` vector so a borrower can reserve a creation slot with
    /// a single compare-exchange instead of holding `all`'s lock across the
    /// `.await` that opens the connection.
    size: AtomicU32,
    idle: IdleQueue<B>,
    active_count: AtomicU32,

    /// Cleared the instant shutdown begins; shared with every outstanding
    /// [`HandleCore`] so a handle being returned while shutdown is underway
    /// closes itself instead of re-entering the idle queue.
    pool_alive: Arc<AtomicBool>,
    running: AtomicBool,

    borrow_lock: tokio::sync::Mutex<()>,
    return_lock: tokio::sync::Mutex<()>,
    maintenance_notify: Notify,
    maintenance_task: Mutex<Option<JoinHandle<()>>>,
}

impl<B: PoolBackend> PoolInner<B> {
    pub(crate) async fn establish(
        url: ConnectionUrl,
        connect_options: ConnectOptions,
        config: PoolConfig,
        backend: B,
    ) -> DbResult<Arc<Self>> {
        let idle = IdleQueue::new(config.max_size.max(1) as usize);
        let inner = Arc::new(Self {
            url,
            connect_options,
            all: Mutex::new(Vec::new()),
            size: AtomicU32::new(0),
            idle,
            active_count: AtomicU32::new(0),
            pool_alive: Arc::new(AtomicBool::new(true)),
            running: AtomicBool::new(true),
            borrow_lock: tokio::sync::Mutex::new(()),
            return_lock: tokio::sync::Mutex::new(()),
            maintenance_notify: Notify::new(),
            maintenance_task: Mutex::new(None),
            config,
            backend,
        });

        for _ in 0..inner.config.initial_size {
            if !inner.try_reserve_slot() {
                break;
            }
            match inner.create_handle_raw().await {
                Ok(handle) => {
                    inner.all.lock().unwrap().push(handle.clone());
                    inner.idle.push(handle);
                }
                Err(e) => {
                    inner.release_slot();
                    // A backend that can't open even its first connection is
                    // a configuration error worth failing construction over.
                    inner.running.store(false, Ordering::Release);
                    inner.pool_alive.store(false, Ordering::Release);
                    return Err(e);
                }
            }
        }

        let maintenance_pool = inner.clone();
        let task = tokio::spawn(async move { maintenance_pool.maintenance_loop().await });
        *inner.maintenance_task.lock().unwrap() = Some(task);

        Ok(inner)
    }

    pub(crate) fn url(&self) -> &ConnectionUrl {
        &self.url
    }

    pub(crate) fn size(&self) -> u32 {
        self.size.load(Ordering::Acquire)
    }

    pub(crate) fn idle_count(&self) -> usize {
        self.idle.len()
    }

    pub(crate) fn active_count(&self) -> u32 {
        self.active_count.load(Ordering::Acquire)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn try_reserve_slot(&self) -> bool {
        self.size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n < self.config.max_size {
                    Some(n + 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    fn release_slot(&self) {
        self.size.fetch_sub(1, Ordering::AcqRel);
    }

    async fn create_handle_raw(self: &Arc<Self>) -> DbResult<Arc<HandleCore<B>>> {
        let conn = self.backend.open(&self.url, &self.connect_options).await?;
        self.backend.configure(&conn, &self.config).await?;
        Ok(HandleCore::new(
            conn,
            Arc::downgrade(self),
            self.pool_alive.clone(),
            self.url.as_str().to_owned(),
        ))
    }

    fn remove_from_all(&self, target: &Arc<HandleCore<B>>) {
        let mut all = self.all.lock().unwrap();
        let before = all.len();
        all.retain(|h| !Arc::ptr_eq(h, target));
        if all.len() != before {
            drop(all);
            self.release_slot();
        }
    }

    /// spec.md §4.5.2: pop one idle handle, validate it if `test_on_borrow`
    /// is set, and replace it in place if validation fails. Bounded by
    /// `max_size` attempts total (see SPEC_FULL.md's resolution of the
    /// "validation storm" open question) so a backend that is entirely down
    /// fails fast with [`Error::validation_exhausted`] instead of spinning
    /// until `max_wait` silently expires.
    async fn get_idle_handle(self: &Arc<Self>) -> DbResult<Option<Arc<HandleCore<B>>>> {
        let mut attempts = 0u32;
        let bound = self.config.max_size.max(1);

        loop {
            let Some(handle) = self.idle.try_pop() else {
                return Ok(None);
            };

            if !self.config.test_on_borrow {
                return Ok(Some(handle));
            }

            match tokio::time::timeout(self.config.validation_timeout, self.backend.validate(&handle.conn)).await {
                Ok(Ok(())) => return Ok(Some(handle)),
                Ok(Err(e)) => log::info!("idle connection failed validation, replacing: {e}"),
                Err(_) => log::info!("idle connection validation timed out, replacing"),
            }

            self.remove_from_all(&handle);
            let _ = handle.conn.close().await;

            if !self.running.load(Ordering::Acquire) {
                return Ok(None);
            }

            attempts += 1;
            if attempts > bound {
                return Err(Error::validation_exhausted(attempts));
            }

            if !self.try_reserve_slot() {
                continue;
            }
            match self.create_handle_raw().await {
                Ok(fresh) => {
                    self.all.lock().unwrap().push(fresh.clone());
                    return Ok(Some(fresh));
                }
                Err(_) => {
                    self.release_slot();
                    continue;
                }
            }
        }
    }

    /// spec.md §4.5.1–4.5.2: borrow a handle, creating fresh capacity or
    /// waiting as needed.
    pub(crate) async fn acquire(self: &Arc<Self>) -> DbResult<Arc<HandleCore<B>>> {
        let _guard = self.borrow_lock.lock().await;

        if !self.running.load(Ordering::Acquire) {
            return Err(Error::pool_closed());
        }

        if let Some(handle) = self.get_idle_handle().await? {
            return Ok(self.activate(handle));
        }

        if self.try_reserve_slot() {
            match self.create_handle_raw().await {
                Ok(handle) => {
                    self.all.lock().unwrap().push(handle.clone());
                    return Ok(self.activate(handle));
                }
                Err(e) => {
                    self.release_slot();
                    return Err(e);
                }
            }
        }

        let deadline = Instant::now() + self.config.max_wait;
        loop {
            if !self.running.load(Ordering::Acquire) {
                return Err(Error::pool_closed());
            }
            if Instant::now() >= deadline {
                return Err(Error::borrow_timeout());
            }
            tokio::time::sleep(BORROW_POLL_INTERVAL).await;
            if let Some(handle) = self.get_idle_handle().await? {
                return Ok(self.activate(handle));
            }
        }
    }

    fn activate(&self, handle: Arc<HandleCore<B>>) -> Arc<HandleCore<B>> {
        handle.active.store(true, Ordering::Release);
        handle.touch();
        self.active_count.fetch_add(1, Ordering::AcqRel);
        handle
    }

    /// spec.md §4.5.3: return a borrowed handle to the idle queue, replacing
    /// it in place if `test_on_return` finds it unfit.
    pub(crate) async fn return_connection(self: &Arc<Self>, handle: Arc<HandleCore<B>>) {
        let _guard = self.return_lock.lock().await;

        if !self.running.load(Ordering::Acquire) {
            let _ = handle.conn.close().await;
            return;
        }

        if handle
            .active
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let still_registered = {
            let all = self.all.lock().unwrap();
            all.iter().any(|h| Arc::ptr_eq(h, &handle))
        };
        if !still_registered {
            self.active_count.fetch_sub(1, Ordering::AcqRel);
            return;
        }

        self.backend.pre_return_cleanup(&handle.conn).await;

        let valid = if self.config.test_on_return {
            matches!(
                tokio::time::timeout(self.config.validation_timeout, self.backend.validate(&handle.conn)).await,
                Ok(Ok(()))
            )
        } else {
            true
        };

        self.active_count.fetch_sub(1, Ordering::AcqRel);

        if valid {
            handle.touch();
            self.idle.push(handle);
        } else {
            log::info!("connection failed test-on-return validation, replacing");
            self.remove_from_all(&handle);
            let _ = handle.conn.close().await;
            if self.running.load(Ordering::Acquire) && self.try_reserve_slot() {
                match self.create_handle_raw().await {
                    Ok(fresh) => {
                        self.all.lock().unwrap().push(fresh.clone());
                        self.idle.push(fresh);
                    }
                    Err(e) => {
                        self.release_slot();
                        log::warn!("failed to replace a connection evicted on return: {e}");
                    }
                }
            }
        }

        self.maintenance_notify.notify_one();
    }

    async fn maintenance_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(MAINTENANCE_INTERVAL) => {}
                _ = self.maintenance_notify.notified() => {}
            }
            if !self.running.load(Ordering::Acquire) {
                return;
            }
            self.sweep().await;
        }
    }

    /// spec.md §4.5.4: evict idle handles past `idle_timeout` or
    /// `max_lifetime`, never dropping the pool below `min_idle`, then
    /// top back up to `min_idle`.
    async fn sweep(self: &Arc<Self>) {
        let (candidates, budget) = {
            let all = self.all.lock().unwrap();
            let budget = (all.len() as u32).saturating_sub(self.config.min_idle);
            let mut candidates = Vec::new();
            for handle in all.iter() {
                if handle.active.load(Ordering::Acquire) {
                    continue;
                }
                let idle_expired = self
                    .config
                    .idle_timeout
                    .map_or(false, |d| handle.idle_duration() >= d);
                let life_expired = self
                    .config
                    .max_lifetime
                    .map_or(false, |d| handle.life_duration() >= d);
                if idle_expired || life_expired {
                    candidates.push(handle.clone());
                }
            }
            (candidates, budget)
        };

        for handle in candidates.into_iter().take(budget as usize) {
            if self.idle.remove(&handle) {
                self.remove_from_all(&handle);
                let _ = handle.conn.close().await;
            }
        }

        while self.running.load(Ordering::Acquire) && (self.all.lock().unwrap().len() as u32) < self.config.min_idle {
            if !self.try_reserve_slot() {
                break;
            }
            match self.create_handle_raw().await {
                Ok(handle) => {
                    self.all.lock().unwrap().push(handle.clone());
                    self.idle.push(handle);
                }
                Err(e) => {
                    self.release_slot();
                    log::warn!("maintenance worker failed to top up min_idle: {e}");
                    break;
                }
            }
        }
    }

    /// spec.md §4.5.5: stop accepting borrows, wait (briefly) for borrowed
    /// handles to come back, then close everything outright.
    pub(crate) async fn shutdown(self: &Arc<Self>) {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        if !was_running {
            return;
        }
        self.pool_alive.store(false, Ordering::Release);

        let deadline = Instant::now() + SHUTDOWN_DRAIN_TIMEOUT;
        while self.active_count.load(Ordering::Acquire) > 0 && Instant::now() < deadline {
            tokio::time::sleep(BORROW_POLL_INTERVAL).await;
        }

        self.maintenance_notify.notify_waiters();
        if let Some(task) = self.maintenance_task.lock().unwrap().take() {
            let _ = task.await;
        }

        let handles: Vec<Arc<HandleCore<B>>> = {
            let mut all = self.all.lock().unwrap();
            std::mem::take(&mut *all)
        };
        self.idle.clear();
        self.size.store(0, Ordering::Release);

        for handle in handles {
            handle.active.store(false, Ordering::Release);
            let _ = handle.conn.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool as StdAtomicBool;

    use async_trait::async_trait;

    use super::*;
    use crate::connection::BaseConnection;

    #[derive(Clone)]
    struct FakeConnection(Arc<StdAtomicBool>);

    impl FakeConnection {
        fn new() -> Self {
            Self(Arc::new(StdAtomicBool::new(false)))
        }
    }

    #[async_trait]
    impl BaseConnection for FakeConnection {
        async fn close(&self) -> DbResult<()> {
            self.0.store(true, Ordering::Release);
            Ok(())
        }
        fn is_closed(&self) -> bool {
            self.0.load(Ordering::Acquire)
        }
        async fn return_to_pool(&self) -> DbResult<()> {
            self.close().await
        }
        fn is_pooled(&self) -> bool {
            false
        }
        fn get_url(&self) -> &str {
            "fake://test"
        }
    }

    struct FakeBackend;

    #[async_trait]
    impl PoolBackend for FakeBackend {
        type Connection = FakeConnection;

        async fn open(&self, _url: &ConnectionUrl, _options: &ConnectOptions) -> DbResult<Self::Connection> {
            Ok(FakeConnection::new())
        }

        async fn validate(&self, conn: &Self::Connection) -> DbResult<()> {
            if conn.is_closed() {
                Err(Error::connection_closed())
            } else {
                Ok(())
            }
        }

        async fn pre_return_cleanup(&self, _conn: &Self::Connection) {}
    }

    async fn fake_pool(config: PoolConfig) -> Arc<PoolInner<FakeBackend>> {
        let url = ConnectionUrl::parse("cpp_dbc:fake://host").unwrap();
        PoolInner::establish(url, ConnectOptions::default(), config, FakeBackend).await.unwrap()
    }

    struct SlowValidateBackend {
        delay: Duration,
    }

    #[async_trait]
    impl PoolBackend for SlowValidateBackend {
        type Connection = FakeConnection;

        async fn open(&self, _url: &ConnectionUrl, _options: &ConnectOptions) -> DbResult<Self::Connection> {
            Ok(FakeConnection::new())
        }

        async fn validate(&self, _conn: &Self::Connection) -> DbResult<()> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        async fn pre_return_cleanup(&self, _conn: &Self::Connection) {}
    }

    async fn slow_validate_pool(config: PoolConfig, delay: Duration) -> Arc<PoolInner<SlowValidateBackend>> {
        let url = ConnectionUrl::parse("cpp_dbc:fake://host").unwrap();
        PoolInner::establish(url, ConnectOptions::default(), config, SlowValidateBackend { delay })
            .await
            .unwrap()
    }

    // spec.md §8 invariant: |all| <= max_size, |idle| + active_count = |all|.
    #[tokio::test]
    async fn quiescent_pool_satisfies_size_invariant() {
        let pool = fake_pool(PoolConfig::new().with_initial_size(2).with_max_size(3).with_min_idle(1)).await;
        assert!(pool.size() <= 3);
        assert_eq!(pool.idle_count() as u32 + pool.active_count(), pool.size());
    }

    // spec.md §8 scenario 4: idle eviction respects min_idle.
    #[tokio::test]
    async fn idle_eviction_respects_min_idle() {
        let pool = fake_pool(
            PoolConfig::new()
                .with_initial_size(0)
                .with_max_size(3)
                .with_min_idle(1)
                .with_idle_timeout(Some(Duration::from_millis(100)))
                .with_test_on_borrow(false),
        )
        .await;

        let mut handles = Vec::new();
        for _ in 0..3 {
            handles.push(pool.acquire().await.unwrap());
        }
        for h in handles {
            pool.return_connection(h).await;
        }
        assert_eq!(pool.size(), 3);

        tokio::time::sleep(Duration::from_millis(300)).await;
        pool.sweep().await;

        assert_eq!(pool.size(), 1);
        assert_eq!(pool.idle_count(), 1);
    }

    // spec.md §8 concurrency: a single idle handle under max_size=1 is
    // handed to exactly one of two concurrent borrowers.
    #[tokio::test]
    async fn concurrent_borrow_on_single_slot_is_exclusive() {
        let pool = fake_pool(
            PoolConfig::new()
                .with_initial_size(1)
                .with_max_size(1)
                .with_max_wait(Duration::from_millis(150)),
        )
        .await;

        let first = pool.acquire().await.unwrap();

        let pool2 = pool.clone();
        let waiter = tokio::spawn(async move { pool2.acquire().await });

        tokio::time::sleep(Duration::from_millis(250)).await;
        let second = waiter.await.unwrap();
        assert!(second.is_err());
        assert_eq!(second.unwrap_err().kind(), crate::error::ErrorKind::BorrowTimeout);

        pool.return_connection(first).await;
        let third = pool.acquire().await;
        assert!(third.is_ok());
    }

    // spec.md §8 boundary: initial_size = 0 starts empty; first borrow
    // creates on demand.
    #[tokio::test]
    async fn zero_initial_size_creates_on_first_borrow() {
        let pool = fake_pool(PoolConfig::new().with_initial_size(0).with_max_size(1)).await;
        assert_eq!(pool.size(), 0);
        let handle = pool.acquire().await.unwrap();
        assert_eq!(pool.size(), 1);
        pool.return_connection(handle).await;
    }

    // spec.md §8: borrow on a pool that has finished shutting down fails
    // immediately with pool-closed, and close() leaves the pool empty.
    #[tokio::test]
    async fn shutdown_empties_pool_and_rejects_new_borrows() {
        let pool = fake_pool(PoolConfig::new().with_initial_size(2).with_max_size(2)).await;
        pool.shutdown().await;

        assert_eq!(pool.size(), 0);
        assert_eq!(pool.idle_count(), 0);
        assert!(!pool.is_running());

        let err = pool.acquire().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PoolClosed);
    }

    // spec.md §4.5.7: the test_on_return probe is bounded by
    // validation_timeout exactly like the borrow-path probe, so a backend
    // that hangs on validation gets replaced instead of stalling release.
    #[tokio::test]
    async fn test_on_return_probe_is_bounded_by_validation_timeout() {
        let pool = slow_validate_pool(
            PoolConfig::new()
                .with_initial_size(1)
                .with_max_size(1)
                .with_test_on_borrow(false)
                .with_test_on_return(true)
                .with_validation_timeout(Duration::from_millis(20)),
            Duration::from_millis(200),
        )
        .await;

        let handle = pool.acquire().await.unwrap();
        pool.return_connection(handle).await;

        assert_eq!(pool.size(), 1);
        assert_eq!(pool.idle_count(), 1);
    }
}
