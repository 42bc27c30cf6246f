//! The document paradigm contract (spec.md §4.3 "Document").
//!
//! Filters, updates, projections and pipelines are conveyed as JSON strings
//! at the boundary, per the spec; [`Document`] is the crate's in-process
//! representation, a thin wrapper over [`serde_json::Value`].

mod cursor;
mod document;
mod driver;
mod pool;

pub use cursor::Cursor;
pub use document::Document;
pub use driver::DocumentDriver;
pub use pool::DocumentPool;

use async_trait::async_trait;

use crate::connection::BaseConnection;
use crate::error::DbResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOneResult {
    pub inserted_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertManyResult {
    pub inserted_count: u64,
    pub inserted_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// A document-store connection: database/collection enumeration, document
/// factory, arbitrary commands, server info, and session/transaction
/// lifecycle scoped by session id.
#[async_trait]
pub trait DocumentConnection: BaseConnection {
    async fn list_databases(&self) -> DbResult<Vec<String>>;
    async fn list_collections(&self) -> DbResult<Vec<String>>;
    async fn create_collection(&self, name: &str) -> DbResult<()>;
    async fn drop_collection(&self, name: &str) -> DbResult<()>;
    async fn rename_collection(&self, from: &str, to: &str) -> DbResult<()>;

    /// Returns a handle to the named collection. Collections do not need to
    /// already exist: most document stores create them lazily on first
    /// write, and this call does not touch the backend.
    fn collection(&self, name: &str) -> Box<dyn Collection>;

    fn empty_document(&self) -> Document {
        Document::empty()
    }
    fn document_from_json(&self, json: &str) -> DbResult<Document> {
        Document::from_json(json)
    }

    /// Executes an arbitrary backend command, given and returned as JSON.
    async fn run_command(&self, command_json: &str) -> DbResult<String>;
    async fn server_info(&self) -> DbResult<String>;
    async fn server_status(&self) -> DbResult<String>;
    async fn ping(&self) -> DbResult<()>;

    async fn start_session(&self) -> DbResult<String>;
    async fn end_session(&self, session_id: &str) -> DbResult<()>;

    async fn start_transaction(&self, session_id: &str) -> DbResult<()>;
    async fn commit_transaction(&self, session_id: &str) -> DbResult<()>;
    async fn abort_transaction(&self, session_id: &str) -> DbResult<()>;
}

/// A named collection of documents.
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    async fn insert_one(&self, document_json: &str) -> DbResult<InsertOneResult>;
    async fn insert_many(&self, documents_json: &[String]) -> DbResult<InsertManyResult>;

    async fn find_one(&self, filter_json: &str) -> DbResult<Option<Document>>;
    async fn find_by_id(&self, id: &str) -> DbResult<Option<Document>>;
    async fn find(
        &self,
        filter_json: &str,
        projection_json: Option<&str>,
    ) -> DbResult<Box<dyn Cursor>>;

    async fn update_one(&self, filter_json: &str, update_json: &str) -> DbResult<UpdateResult>;
    async fn update_many(&self, filter_json: &str, update_json: &str) -> DbResult<UpdateResult>;
    async fn replace_one(&self, filter_json: &str, replacement_json: &str) -> DbResult<UpdateResult>;

    async fn delete_one(&self, filter_json: &str) -> DbResult<DeleteResult>;
    async fn delete_many(&self, filter_json: &str) -> DbResult<DeleteResult>;
    async fn delete_by_id(&self, id: &str) -> DbResult<DeleteResult>;

    async fn create_index(&self, keys_json: &str) -> DbResult<String>;
    async fn drop_index(&self, name: &str) -> DbResult<()>;
    async fn drop_all_indexes(&self) -> DbResult<()>;
    async fn list_indexes(&self) -> DbResult<Vec<String>>;

    async fn drop(&self) -> DbResult<()>;
    async fn rename(&self, new_name: &str) -> DbResult<()>;

    async fn aggregate(&self, pipeline_json: &str) -> DbResult<Box<dyn Cursor>>;
    async fn distinct(&self, field: &str, filter_json: &str) -> DbResult<Vec<Document>>;
}
