//! An in-process, in-memory document store standing in for MongoDB
//! (spec.md §9 non-goal: no real wire protocol driver is implemented for
//! any backend). Filtering supports flat equality matching only — no
//! query operators (`$gt`, `$in`, ...) — which is enough to exercise the
//! `DocumentConnection`/`Collection`/`Cursor` contracts end to end without
//! pretending to be a real MongoDB client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value as Json;

use crate::connection::{BaseConnection, Paradigm};
use crate::document::{
    Collection, Cursor, DeleteResult, Document, DocumentConnection, DocumentDriver, InsertManyResult,
    InsertOneResult, UpdateResult,
};
use crate::error::{DbResult, Error};
use crate::registry::{ConnectOptions, Driver};
use crate::url::ConnectionUrl;

type Store = Mutex<HashMap<String, Vec<Document>>>;

pub struct InMemoryDocumentDriver;

impl InMemoryDocumentDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl Driver for InMemoryDocumentDriver {
    fn name(&self) -> &str {
        "memory-document"
    }

    fn paradigm(&self) -> Paradigm {
        Paradigm::Document
    }

    fn default_port(&self) -> u16 {
        27017
    }

    fn url_schemes(&self) -> &[&str] {
        &["mongodb", "mongodb+srv"]
    }

    async fn connect(&self, url: &ConnectionUrl, options: &ConnectOptions) -> DbResult<Arc<dyn BaseConnection>> {
        Ok(InMemoryDocumentConnection::open(url, options))
    }
}

#[async_trait]
impl DocumentDriver for InMemoryDocumentDriver {
    async fn connect_document(
        &self,
        url: &ConnectionUrl,
        options: &ConnectOptions,
    ) -> DbResult<Arc<dyn DocumentConnection>> {
        Ok(InMemoryDocumentConnection::open(url, options))
    }
}

pub struct InMemoryDocumentConnection {
    url: String,
    database: String,
    store: Arc<Store>,
    closed: AtomicBool,
    sessions: Mutex<Vec<String>>,
}

impl InMemoryDocumentConnection {
    fn open(url: &ConnectionUrl, _options: &ConnectOptions) -> Arc<Self> {
        Arc::new(Self {
            url: url.as_str().to_owned(),
            database: url.database().unwrap_or("test").to_owned(),
            store: Arc::new(Mutex::new(HashMap::new())),
            closed: AtomicBool::new(false),
            sessions: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl BaseConnection for InMemoryDocumentConnection {
    async fn close(&self) -> DbResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn return_to_pool(&self) -> DbResult<()> {
        self.close().await
    }

    fn is_pooled(&self) -> bool {
        false
    }

    fn get_url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl DocumentConnection for InMemoryDocumentConnection {
    async fn list_databases(&self) -> DbResult<Vec<String>> {
        Ok(vec![self.database.clone()])
    }

    async fn list_collections(&self) -> DbResult<Vec<String>> {
        Ok(self.store.lock().unwrap().keys().cloned().collect())
    }

    async fn create_collection(&self, name: &str) -> DbResult<()> {
        self.store.lock().unwrap().entry(name.to_owned()).or_default();
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DbResult<()> {
        self.store.lock().unwrap().remove(name);
        Ok(())
    }

    async fn rename_collection(&self, from: &str, to: &str) -> DbResult<()> {
        let mut store = self.store.lock().unwrap();
        let docs = store.remove(from).unwrap_or_default();
        store.insert(to.to_owned(), docs);
        Ok(())
    }

    fn collection(&self, name: &str) -> Box<dyn Collection> {
        Box::new(InMemoryCollection {
            name: name.to_owned(),
            store: self.store.clone(),
        })
    }

    async fn run_command(&self, _command_json: &str) -> DbResult<String> {
        Ok(r#"{"ok":1}"#.to_owned())
    }

    async fn server_info(&self) -> DbResult<String> {
        Ok(r#"{"version":"in-memory-reference"}"#.to_owned())
    }

    async fn server_status(&self) -> DbResult<String> {
        let collections = self.store.lock().unwrap().len();
        Ok(format!(r#"{{"ok":1,"collections":{collections}}}"#))
    }

    async fn ping(&self) -> DbResult<()> {
        if self.is_closed() {
            return Err(Error::connection_closed());
        }
        Ok(())
    }

    async fn start_session(&self) -> DbResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.sessions.lock().unwrap().push(id.clone());
        Ok(id)
    }

    async fn end_session(&self, session_id: &str) -> DbResult<()> {
        self.sessions.lock().unwrap().retain(|s| s != session_id);
        Ok(())
    }

    async fn start_transaction(&self, _session_id: &str) -> DbResult<()> {
        Ok(())
    }

    async fn commit_transaction(&self, _session_id: &str) -> DbResult<()> {
        Ok(())
    }

    async fn abort_transaction(&self, _session_id: &str) -> DbResult<()> {
        Ok(())
    }
}

struct InMemoryCollection {
    name: String,
    store: Arc<Store>,
}

fn matches_filter(doc: &Document, filter: &Json) -> bool {
    let Json::Object(fields) = filter else {
        return true;
    };
    fields.iter().all(|(k, expected)| doc.value().get(k) == Some(expected))
}

fn parse_json(json: &str) -> DbResult<Json> {
    serde_json::from_str(json).map_err(|e| Error::invalid_parameter(format!("invalid json: {e}")))
}

#[async_trait]
impl Collection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, document_json: &str) -> DbResult<InsertOneResult> {
        let mut value = parse_json(document_json)?;
        if let Json::Object(map) = &mut value {
            map.entry("_id").or_insert_with(|| Json::String(uuid::Uuid::new_v4().to_string()));
        }
        self.store
            .lock()
            .unwrap()
            .entry(self.name.clone())
            .or_default()
            .push(Document::from_value(value));
        Ok(InsertOneResult { inserted_count: 1 })
    }

    async fn insert_many(&self, documents_json: &[String]) -> DbResult<InsertManyResult> {
        let mut ids = Vec::with_capacity(documents_json.len());
        for json in documents_json {
            let mut value = parse_json(json)?;
            let id = if let Json::Object(map) = &mut value {
                let id = map
                    .entry("_id")
                    .or_insert_with(|| Json::String(uuid::Uuid::new_v4().to_string()))
                    .clone();
                match id {
                    Json::String(s) => s,
                    other => other.to_string(),
                }
            } else {
                String::new()
            };
            ids.push(id);
            self.store
                .lock()
                .unwrap()
                .entry(self.name.clone())
                .or_default()
                .push(Document::from_value(value));
        }
        Ok(InsertManyResult {
            inserted_count: ids.len() as u64,
            inserted_ids: ids,
        })
    }

    async fn find_one(&self, filter_json: &str) -> DbResult<Option<Document>> {
        let filter = parse_json(filter_json)?;
        let store = self.store.lock().unwrap();
        Ok(store
            .get(&self.name)
            .and_then(|docs| docs.iter().find(|d| matches_filter(d, &filter)).cloned()))
    }

    async fn find_by_id(&self, id: &str) -> DbResult<Option<Document>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .get(&self.name)
            .and_then(|docs| docs.iter().find(|d| d.get_id().as_deref() == Some(id)).cloned()))
    }

    async fn find(&self, filter_json: &str, _projection_json: Option<&str>) -> DbResult<Box<dyn Cursor>> {
        let filter = parse_json(filter_json)?;
        let store = self.store.lock().unwrap();
        let matches = store
            .get(&self.name)
            .map(|docs| docs.iter().filter(|d| matches_filter(d, &filter)).cloned().collect())
            .unwrap_or_default();
        Ok(Box::new(super::memory_cursor::InMemoryCursor::new(matches)))
    }

    async fn update_one(&self, filter_json: &str, update_json: &str) -> DbResult<UpdateResult> {
        let filter = parse_json(filter_json)?;
        let update = parse_json(update_json)?;
        let mut store = self.store.lock().unwrap();
        let Some(docs) = store.get_mut(&self.name) else {
            return Ok(UpdateResult::default());
        };
        match docs.iter_mut().find(|d| matches_filter(d, &filter)) {
            Some(doc) => {
                apply_update(doc, &update);
                Ok(UpdateResult {
                    matched_count: 1,
                    modified_count: 1,
                })
            }
            None => Ok(UpdateResult::default()),
        }
    }

    async fn update_many(&self, filter_json: &str, update_json: &str) -> DbResult<UpdateResult> {
        let filter = parse_json(filter_json)?;
        let update = parse_json(update_json)?;
        let mut store = self.store.lock().unwrap();
        let Some(docs) = store.get_mut(&self.name) else {
            return Ok(UpdateResult::default());
        };
        let mut modified = 0u64;
        for doc in docs.iter_mut().filter(|d| matches_filter(d, &filter)) {
            apply_update(doc, &update);
            modified += 1;
        }
        Ok(UpdateResult {
            matched_count: modified,
            modified_count: modified,
        })
    }

    async fn replace_one(&self, filter_json: &str, replacement_json: &str) -> DbResult<UpdateResult> {
        let filter = parse_json(filter_json)?;
        let replacement = parse_json(replacement_json)?;
        let mut store = self.store.lock().unwrap();
        let Some(docs) = store.get_mut(&self.name) else {
            return Ok(UpdateResult::default());
        };
        match docs.iter_mut().find(|d| matches_filter(d, &filter)) {
            Some(doc) => {
                *doc = Document::from_value(replacement);
                Ok(UpdateResult {
                    matched_count: 1,
                    modified_count: 1,
                })
            }
            None => Ok(UpdateResult::default()),
        }
    }

    async fn delete_one(&self, filter_json: &str) -> DbResult<DeleteResult> {
        let filter = parse_json(filter_json)?;
        let mut store = self.store.lock().unwrap();
        let Some(docs) = store.get_mut(&self.name) else {
            return Ok(DeleteResult::default());
        };
        if let Some(pos) = docs.iter().position(|d| matches_filter(d, &filter)) {
            docs.remove(pos);
            Ok(DeleteResult { deleted_count: 1 })
        } else {
            Ok(DeleteResult::default())
        }
    }

    async fn delete_many(&self, filter_json: &str) -> DbResult<DeleteResult> {
        let filter = parse_json(filter_json)?;
        let mut store = self.store.lock().unwrap();
        let Some(docs) = store.get_mut(&self.name) else {
            return Ok(DeleteResult::default());
        };
        let before = docs.len();
        docs.retain(|d| !matches_filter(d, &filter));
        Ok(DeleteResult {
            deleted_count: (before - docs.len()) as u64,
        })
    }

    async fn delete_by_id(&self, id: &str) -> DbResult<DeleteResult> {
        let mut store = self.store.lock().unwrap();
        let Some(docs) = store.get_mut(&self.name) else {
            return Ok(DeleteResult::default());
        };
        if let Some(pos) = docs.iter().position(|d| d.get_id().as_deref() == Some(id)) {
            docs.remove(pos);
            Ok(DeleteResult { deleted_count: 1 })
        } else {
            Ok(DeleteResult::default())
        }
    }

    async fn create_index(&self, _keys_json: &str) -> DbResult<String> {
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn drop_index(&self, _name: &str) -> DbResult<()> {
        Ok(())
    }

    async fn drop_all_indexes(&self) -> DbResult<()> {
        Ok(())
    }

    async fn list_indexes(&self) -> DbResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn drop(&self) -> DbResult<()> {
        self.store.lock().unwrap().remove(&self.name);
        Ok(())
    }

    async fn rename(&self, _new_name: &str) -> DbResult<()> {
        Err(Error::backend_error("rename a collection handle via the connection, not the handle itself"))
    }

    async fn aggregate(&self, _pipeline_json: &str) -> DbResult<Box<dyn Cursor>> {
        let store = self.store.lock().unwrap();
        let docs = store.get(&self.name).cloned().unwrap_or_default();
        Ok(Box::new(super::memory_cursor::InMemoryCursor::new(docs)))
    }

    async fn distinct(&self, field: &str, filter_json: &str) -> DbResult<Vec<Document>> {
        let filter = parse_json(filter_json)?;
        let store = self.store.lock().unwrap();
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        if let Some(docs) = store.get(&self.name) {
            for doc in docs.iter().filter(|d| matches_filter(d, &filter)) {
                if let Some(v) = doc.value().get(field) {
                    if seen.insert(v.to_string()) {
                        out.push(Document::from_value(v.clone()));
                    }
                }
            }
        }
        Ok(out)
    }
}

fn apply_update(doc: &mut Document, update: &Json) {
    let Json::Object(ops) = update else { return };
    let set_fields = ops.get("$set").and_then(|v| v.as_object());
    let Some(set_fields) = set_fields else {
        *doc = Document::from_value(update.clone());
        return;
    };
    let mut value = doc.value().clone();
    if let Json::Object(map) = &mut value {
        for (k, v) in set_fields {
            map.insert(k.clone(), v.clone());
        }
    }
    *doc = Document::from_value(value);
}
