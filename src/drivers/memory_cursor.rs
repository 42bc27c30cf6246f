//! A cursor over an already-materialized `Vec<Document>`, used by the
//! in-memory document driver. Sort/skip/limit are recorded as requested but
//! applied lazily, on the first call that actually advances the cursor —
//! matching the contract's note that they are pre-iteration modifiers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::document::{Cursor, Document};
use crate::error::{DbResult, Error};

pub(crate) struct InMemoryCursor {
    source: Vec<Document>,
    materialized: Mutex<Option<Vec<Document>>>,
    skip: AtomicU64,
    limit: AtomicU64,
    sort: Mutex<Option<(String, bool)>>,
    position: AtomicU64,
    closed: AtomicBool,
}

impl InMemoryCursor {
    pub(crate) fn new(source: Vec<Document>) -> Self {
        Self {
            source,
            materialized: Mutex::new(None),
            skip: AtomicU64::new(0),
            limit: AtomicU64::new(0),
            sort: Mutex::new(None),
            position: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_materialized(&self) -> Vec<Document> {
        let mut materialized = self.materialized.lock().unwrap();
        if let Some(docs) = materialized.as_ref() {
            return docs.clone();
        }

        let mut docs = self.source.clone();
        if let Some((field, ascending)) = self.sort.lock().unwrap().clone() {
            docs.sort_by(|a, b| {
                let av = a.value().get(field.as_str()).map(|v| v.to_string()).unwrap_or_default();
                let bv = b.value().get(field.as_str()).map(|v| v.to_string()).unwrap_or_default();
                if ascending {
                    av.cmp(&bv)
                } else {
                    bv.cmp(&av)
                }
            });
        }

        let skip = self.skip.load(Ordering::Acquire) as usize;
        let docs = if skip >= docs.len() {
            Vec::new()
        } else {
            docs.split_off(skip)
        };

        let limit = self.limit.load(Ordering::Acquire) as usize;
        let docs = if limit > 0 && docs.len() > limit {
            docs[..limit].to_vec()
        } else {
            docs
        };

        *materialized = Some(docs.clone());
        docs
    }
}

#[async_trait]
impl Cursor for InMemoryCursor {
    fn set_skip(&self, n: u64) {
        self.skip.store(n, Ordering::Release);
    }

    fn set_limit(&self, n: u64) {
        self.limit.store(n, Ordering::Release);
    }

    fn set_sort(&self, field: &str, ascending: bool) {
        *self.sort.lock().unwrap() = Some((field.to_owned(), ascending));
    }

    async fn next(&self) -> DbResult<bool> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::cursor_closed());
        }
        let docs = self.ensure_materialized();
        let next_pos = self.position.load(Ordering::Acquire) + 1;
        if next_pos as usize <= docs.len() {
            self.position.store(next_pos, Ordering::Release);
            Ok(true)
        } else {
            self.position.store(docs.len() as u64 + 1, Ordering::Release);
            Ok(false)
        }
    }

    fn has_next(&self) -> DbResult<bool> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::cursor_closed());
        }
        let docs = self.ensure_materialized();
        Ok((self.position.load(Ordering::Acquire) as usize) < docs.len())
    }

    fn current(&self) -> DbResult<Option<Document>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::cursor_closed());
        }
        let docs = self.ensure_materialized();
        let pos = self.position.load(Ordering::Acquire);
        if pos == 0 || pos as usize > docs.len() {
            return Ok(None);
        }
        Ok(docs.get(pos as usize - 1).cloned())
    }

    async fn next_document(&self) -> DbResult<Option<Document>> {
        if !self.next().await? {
            return Ok(None);
        }
        self.current()
    }

    async fn to_vector(&self) -> DbResult<Vec<Document>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::cursor_closed());
        }
        Ok(self.ensure_materialized())
    }

    async fn get_batch(&self, size: usize) -> DbResult<Vec<Document>> {
        let mut batch = Vec::with_capacity(size);
        while batch.len() < size {
            match self.next_document().await? {
                Some(doc) => batch.push(doc),
                None => break,
            }
        }
        Ok(batch)
    }

    fn count(&self) -> DbResult<u64> {
        Ok(self.ensure_materialized().len() as u64)
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    fn rewind(&self) -> DbResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::cursor_closed());
        }
        self.position.store(0, Ordering::Release);
        Ok(())
    }

    fn is_exhausted(&self) -> DbResult<bool> {
        let docs = self.ensure_materialized();
        Ok(self.position.load(Ordering::Acquire) as usize >= docs.len())
    }

    fn close(&self) -> DbResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(age: i64) -> Document {
        Document::from_value(serde_json::json!({"age": age}))
    }

    #[tokio::test]
    async fn sort_skip_and_limit_compose_as_pre_iteration_modifiers() {
        let cursor = InMemoryCursor::new(vec![doc(3), doc(1), doc(2)]);
        cursor.sort("age", true).skip(1).limit(1);

        assert!(cursor.next().await.unwrap());
        assert_eq!(cursor.current().unwrap().unwrap().get_int("age"), Some(2));
        assert!(!cursor.next().await.unwrap());
    }

    #[tokio::test]
    async fn to_vector_and_count_see_the_same_materialized_set() {
        let cursor = InMemoryCursor::new(vec![doc(1), doc(2), doc(3)]);
        let all = cursor.to_vector().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(cursor.count().unwrap(), 3);
    }

    #[tokio::test]
    async fn exhaustion_and_rewind_round_trip() {
        let cursor = InMemoryCursor::new(vec![doc(1), doc(2)]);
        assert!(!cursor.is_exhausted().unwrap());
        assert!(cursor.has_next().unwrap());

        cursor.next().await.unwrap();
        cursor.next().await.unwrap();
        assert!(!cursor.next().await.unwrap());
        assert!(cursor.is_exhausted().unwrap());

        cursor.rewind().unwrap();
        assert!(!cursor.is_exhausted().unwrap());
        assert_eq!(cursor.position(), 0);
    }

    #[tokio::test]
    async fn get_batch_stops_at_exhaustion() {
        let cursor = InMemoryCursor::new(vec![doc(1), doc(2)]);
        let batch = cursor.get_batch(5).await.unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn operations_on_a_closed_cursor_fail() {
        let cursor = InMemoryCursor::new(vec![doc(1)]);
        cursor.close().unwrap();
        assert!(cursor.is_closed());
        assert_eq!(cursor.next().await.unwrap_err().kind(), crate::error::ErrorKind::CursorClosed);
    }
}
