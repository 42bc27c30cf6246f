//! The document-store pool facade, mirroring `relational::pool`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::BaseConnection;
use crate::error::DbResult;
use crate::pool::{HandleCore, Pool, PoolBackend, PoolConfig};
use crate::registry::ConnectOptions;

use super::driver::DocumentDriver;
use super::{Collection, Document, DocumentConnection};

pub(crate) struct DocumentBackend {
    driver: Arc<dyn DocumentDriver>,
}

#[async_trait]
impl PoolBackend for DocumentBackend {
    type Connection = Arc<dyn DocumentConnection>;

    async fn open(
        &self,
        url: &crate::url::ConnectionUrl,
        options: &ConnectOptions,
    ) -> DbResult<Self::Connection> {
        self.driver.connect_document(url, options).await
    }

    async fn validate(&self, conn: &Self::Connection) -> DbResult<()> {
        conn.ping().await
    }

    async fn pre_return_cleanup(&self, _conn: &Self::Connection) {
        // Document sessions/transactions are keyed by an explicit session
        // id the caller manages, not implicit pooled-connection state, so
        // there is nothing for the pool itself to clean up here.
    }
}

/// A pool of document-store connections.
pub struct DocumentPool {
    inner: Pool<DocumentBackend>,
}

impl DocumentPool {
    pub async fn new(
        url: &str,
        connect_options: ConnectOptions,
        config: PoolConfig,
        driver: Arc<dyn DocumentDriver>,
    ) -> DbResult<Self> {
        let backend = DocumentBackend { driver };
        let inner = Pool::new(url, connect_options, config, backend).await?;
        Ok(Self { inner })
    }

    pub async fn acquire(&self) -> DbResult<Arc<dyn DocumentConnection>> {
        let handle = self.inner.acquire().await?;
        Ok(Arc::new(DocumentPooledConnection(handle)))
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

struct DocumentPooledConnection(Arc<HandleCore<DocumentBackend>>);

crate::pool::macros::impl_base_connection_via_handle!(DocumentPooledConnection);

#[async_trait]
impl DocumentConnection for DocumentPooledConnection {
    async fn list_databases(&self) -> DbResult<Vec<String>> {
        self.0.assert_open()?;
        self.0.conn.list_databases().await
    }

    async fn list_collections(&self) -> DbResult<Vec<String>> {
        self.0.assert_open()?;
        self.0.conn.list_collections().await
    }

    async fn create_collection(&self, name: &str) -> DbResult<()> {
        self.0.assert_open()?;
        self.0.conn.create_collection(name).await
    }

    async fn drop_collection(&self, name: &str) -> DbResult<()> {
        self.0.assert_open()?;
        self.0.conn.drop_collection(name).await
    }

    async fn rename_collection(&self, from: &str, to: &str) -> DbResult<()> {
        self.0.assert_open()?;
        self.0.conn.rename_collection(from, to).await
    }

    fn collection(&self, name: &str) -> Box<dyn Collection> {
        self.0.conn.collection(name)
    }

    fn empty_document(&self) -> Document {
        self.0.conn.empty_document()
    }

    fn document_from_json(&self, json: &str) -> DbResult<Document> {
        self.0.conn.document_from_json(json)
    }

    async fn run_command(&self, command_json: &str) -> DbResult<String> {
        self.0.assert_open()?;
        self.0.conn.run_command(command_json).await
    }

    async fn server_info(&self) -> DbResult<String> {
        self.0.assert_open()?;
        self.0.conn.server_info().await
    }

    async fn server_status(&self) -> DbResult<String> {
        self.0.assert_open()?;
        self.0.conn.server_status().await
    }

    async fn ping(&self) -> DbResult<()> {
        self.0.assert_open()?;
        self.0.conn.ping().await
    }

    async fn start_session(&self) -> DbResult<String> {
        self.0.assert_open()?;
        self.0.conn.start_session().await
    }

    async fn end_session(&self, session_id: &str) -> DbResult<()> {
        self.0.assert_open()?;
        self.0.conn.end_session(session_id).await
    }

    async fn start_transaction(&self, session_id: &str) -> DbResult<()> {
        self.0.assert_open()?;
        self.0.conn.start_transaction(session_id).await
    }

    async fn commit_transaction(&self, session_id: &str) -> DbResult<()> {
        self.0.assert_open()?;
        self.0.conn.commit_transaction(session_id).await
    }

    async fn abort_transaction(&self, session_id: &str) -> DbResult<()> {
        self.0.assert_open()?;
        self.0.conn.abort_transaction(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::InMemoryDocumentDriver;

    async fn memory_pool(config: PoolConfig) -> DocumentPool {
        DocumentPool::new(
            "cpp_dbc:mongodb://localhost/testdb",
            ConnectOptions::default(),
            config,
            InMemoryDocumentDriver::new(),
        )
        .await
        .unwrap()
    }

    // spec.md §8 scenario 5: document collection round-trip.
    #[tokio::test]
    async fn document_collection_round_trip() {
        let pool = memory_pool(PoolConfig::new().with_initial_size(1).with_max_size(1)).await;
        let conn = pool.acquire().await.unwrap();
        let people = conn.collection("people");

        let inserted = people.insert_one(r#"{"name":"bob","age":30}"#).await.unwrap();
        assert_eq!(inserted.inserted_count, 1);

        let found = people.find_one(r#"{"name":"bob"}"#).await.unwrap().unwrap();
        assert_eq!(found.get_int("age"), Some(30));
        assert!(found.get_id().is_some());

        let deleted = people.delete_one(r#"{"name":"bob"}"#).await.unwrap();
        assert_eq!(deleted.deleted_count, 1);

        assert!(people.find_one(r#"{"name":"bob"}"#).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_one_applies_set_operator() {
        let pool = memory_pool(PoolConfig::new().with_initial_size(1).with_max_size(1)).await;
        let conn = pool.acquire().await.unwrap();
        let people = conn.collection("people");

        people.insert_one(r#"{"name":"bob","age":30}"#).await.unwrap();
        let result = people
            .update_one(r#"{"name":"bob"}"#, r#"{"$set":{"age":31}}"#)
            .await
            .unwrap();
        assert_eq!(result.matched_count, 1);

        let found = people.find_one(r#"{"name":"bob"}"#).await.unwrap().unwrap();
        assert_eq!(found.get_int("age"), Some(31));
    }

    #[tokio::test]
    async fn returning_connection_makes_it_available_again() {
        let pool = memory_pool(PoolConfig::new().with_initial_size(1).with_max_size(1)).await;
        let conn = pool.acquire().await.unwrap();
        conn.return_to_pool().await.unwrap();
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.active_count(), 0);

        let conn = pool.acquire().await.unwrap();
        conn.ping().await.unwrap();
    }
}
