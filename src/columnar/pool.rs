//! The columnar pool facade, mirroring `relational::pool`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::BaseConnection;
use crate::error::DbResult;
use crate::pool::{HandleCore, Pool, PoolBackend, PoolConfig};
use crate::registry::ConnectOptions;

use super::driver::ColumnarDriver;
use super::{ColumnarConnection, IsolationLevel, PreparedStatement, ResultSet};

pub(crate) struct ColumnarBackend {
    driver: Arc<dyn ColumnarDriver>,
    validation_query: String,
}

#[async_trait]
impl PoolBackend for ColumnarBackend {
    type Connection = Arc<dyn ColumnarConnection>;

    async fn open(
        &self,
        url: &crate::url::ConnectionUrl,
        options: &ConnectOptions,
    ) -> DbResult<Self::Connection> {
        self.driver.connect_columnar(url, options).await
    }

    async fn configure(&self, conn: &Self::Connection, config: &PoolConfig) -> DbResult<()> {
        if let Some(spelling) = &config.transaction_isolation {
            let level: IsolationLevel = spelling.parse()?;
            conn.set_transaction_isolation(level).await?;
        }
        Ok(())
    }

    async fn validate(&self, conn: &Self::Connection) -> DbResult<()> {
        conn.execute_query(&self.validation_query).await.map(|_| ())
    }

    async fn pre_return_cleanup(&self, conn: &Self::Connection) {
        if conn.supports_transactions() && conn.in_transaction() {
            if let Err(e) = conn.rollback().await {
                log::warn!("failed to roll back dangling transaction before returning connection: {e}");
            }
        }
    }
}

/// A pool of columnar (CQL-family) connections.
pub struct ColumnarPool {
    inner: Pool<ColumnarBackend>,
}

impl ColumnarPool {
    pub async fn new(
        url: &str,
        connect_options: ConnectOptions,
        config: PoolConfig,
        driver: Arc<dyn ColumnarDriver>,
    ) -> DbResult<Self> {
        let backend = ColumnarBackend {
            driver,
            validation_query: "SELECT now() FROM system.local".to_owned(),
        };
        let inner = Pool::new(url, connect_options, config, backend).await?;
        Ok(Self { inner })
    }

    pub async fn acquire(&self) -> DbResult<Arc<dyn ColumnarConnection>> {
        let handle = self.inner.acquire().await?;
        Ok(Arc::new(ColumnarPooledConnection(handle)))
    }

    pub async fn close(&self) {
        self.inner.close().await
    }

    pub fn url(&self) -> &str {
        self.inner.url()
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
}

struct ColumnarPooledConnection(Arc<HandleCore<ColumnarBackend>>);

crate::pool::macros::impl_base_connection_via_handle!(ColumnarPooledConnection);

#[async_trait]
impl ColumnarConnection for ColumnarPooledConnection {
    async fn prepare(&self, cql: &str) -> DbResult<Box<dyn PreparedStatement>> {
        self.0.assert_open()?;
        self.0.touch();
        self.0.conn.prepare(cql).await
    }

    async fn execute_query(&self, cql: &str) -> DbResult<Box<dyn ResultSet>> {
        self.0.assert_open()?;
        self.0.touch();
        self.0.conn.execute_query(cql).await
    }

    async fn execute_update(&self, cql: &str) -> DbResult<u64> {
        self.0.assert_open()?;
        self.0.touch();
        self.0.conn.execute_update(cql).await
    }

    fn supports_transactions(&self) -> bool {
        self.0.conn.supports_transactions()
    }

    async fn begin_transaction(&self) -> DbResult<()> {
        self.0.assert_open()?;
        self.0.conn.begin_transaction().await
    }

    async fn commit(&self) -> DbResult<()> {
        self.0.assert_open()?;
        self.0.conn.commit().await
    }

    async fn rollback(&self) -> DbResult<()> {
        self.0.assert_open()?;
        self.0.conn.rollback().await
    }

    fn in_transaction(&self) -> bool {
        self.0.conn.in_transaction()
    }

    async fn set_transaction_isolation(&self, level: IsolationLevel) -> DbResult<()> {
        self.0.assert_open()?;
        self.0.conn.set_transaction_isolation(level).await
    }

    async fn get_transaction_isolation(&self) -> DbResult<IsolationLevel> {
        self.0.assert_open()?;
        self.0.conn.get_transaction_isolation().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::InMemoryColumnarDriver;
    use crate::error::ErrorKind;

    async fn memory_pool(config: PoolConfig) -> ColumnarPool {
        ColumnarPool::new(
            "cpp_dbc:scylladb://localhost/ks",
            ConnectOptions::default(),
            config,
            InMemoryColumnarDriver::new(),
        )
        .await
        .unwrap()
    }

    // spec.md §8 scenario 6: columnar transactions are unsupported; DDL and
    // DML row-count estimates follow the CQL-family convention (0 for DDL,
    // 1 for a single-row INSERT).
    #[tokio::test]
    async fn transactions_unsupported_and_row_counts_are_estimates() {
        let pool = memory_pool(PoolConfig::new().with_initial_size(1).with_max_size(1)).await;
        let conn = pool.acquire().await.unwrap();

        assert!(!conn.supports_transactions());
        let err = conn.begin_transaction().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionNotSupported);

        let created = conn.execute_update("CREATE TABLE events (id UUID PRIMARY KEY, name TEXT)").await.unwrap();
        assert_eq!(created, 0);

        let stmt = conn.prepare("INSERT INTO events (id, name) VALUES (?, ?)").await.unwrap();
        stmt.set_uuid(1, uuid::Uuid::new_v4()).unwrap();
        stmt.set_string(2, "login").unwrap();
        assert_eq!(stmt.execute_update().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn query_round_trip_reads_back_inserted_row() {
        let pool = memory_pool(PoolConfig::new().with_initial_size(1).with_max_size(1)).await;
        let conn = pool.acquire().await.unwrap();

        conn.execute_update("CREATE TABLE events (id UUID PRIMARY KEY, name TEXT)").await.unwrap();
        let stmt = conn.prepare("INSERT INTO events (id, name) VALUES (?, ?)").await.unwrap();
        stmt.set_uuid(1, uuid::Uuid::new_v4()).unwrap();
        stmt.set_string(2, "login").unwrap();
        stmt.execute_update().await.unwrap();

        let result = conn.execute_query("SELECT name FROM events").await.unwrap();
        assert!(result.next().unwrap());
        assert_eq!(result.get_string("name").unwrap(), Some("login".to_owned()));
        result.close().unwrap();
    }
}
