//! Shared delegation boilerplate for the three paradigm-specific pooled
//! connection wrappers. Each wrapper is a newtype over
//! `Arc<HandleCore<TheirBackend>>`; [`BaseConnection`] behaves identically
//! for all of them, so it is implemented once here instead of three times.

macro_rules! impl_base_connection_via_handle {
    ($wrapper:ty) => {
        #[async_trait::async_trait]
        impl crate::connection::BaseConnection for $wrapper {
            async fn close(&self) -> crate::error::DbResult<()> {
                self.0.close().await
            }

            fn is_closed(&self) -> bool {
                self.0.is_closed()
            }

            async fn return_to_pool(&self) -> crate::error::DbResult<()> {
                self.0.return_to_pool().await
            }

            fn is_pooled(&self) -> bool {
                true
            }

            fn get_url(&self) -> &str {
                self.0.get_url()
            }
        }

        impl Drop for $wrapper {
            /// spec.md §4.6: a dropped handle that was never explicitly
            /// closed or returned must not leak. `return_to_pool` is async,
            /// so the actual release is spawned; if no runtime is available
            /// to spawn on (e.g. during process teardown), the connection is
            /// leaked rather than blocking or panicking inside `drop`.
            fn drop(&mut self) {
                if !self.0.active.load(std::sync::atomic::Ordering::Acquire) {
                    return;
                }
                if let Ok(rt) = tokio::runtime::Handle::try_current() {
                    let handle = self.0.clone();
                    rt.spawn(async move {
                        let _ = crate::connection::BaseConnection::return_to_pool(&*handle).await;
                    });
                } else {
                    log::warn!("pooled connection dropped outside a tokio runtime; leaking handle");
                }
            }
        }
    };
}

pub(crate) use impl_base_connection_via_handle;
