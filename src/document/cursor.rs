use async_trait::async_trait;

use super::Document;
use crate::error::DbResult;

/// A server-side or in-memory cursor over a sequence of documents.
///
/// `skip`/`limit`/`sort` are pre-iteration modifiers and return `self` so
/// callers can chain them (`cursor.skip(10).limit(5)`); calling any of them
/// after iteration has started has no effect on documents already yielded.
/// `rewind` is best-effort: implementations backed by a one-shot server-side
/// cursor may refuse it.
#[async_trait]
pub trait Cursor: Send + Sync {
    fn set_skip(&self, n: u64);
    fn set_limit(&self, n: u64);
    fn set_sort(&self, field: &str, ascending: bool);

    fn skip(&self, n: u64) -> &dyn Cursor {
        self.set_skip(n);
        self
    }
    fn limit(&self, n: u64) -> &dyn Cursor {
        self.set_limit(n);
        self
    }
    fn sort(&self, field: &str, ascending: bool) -> &dyn Cursor {
        self.set_sort(field, ascending);
        self
    }

    async fn next(&self) -> DbResult<bool>;
    fn has_next(&self) -> DbResult<bool>;
    fn current(&self) -> DbResult<Option<Document>>;
    async fn next_document(&self) -> DbResult<Option<Document>>;
    async fn to_vector(&self) -> DbResult<Vec<Document>>;
    async fn get_batch(&self, size: usize) -> DbResult<Vec<Document>>;

    fn count(&self) -> DbResult<u64>;
    fn position(&self) -> u64;
    fn is_exhausted(&self) -> DbResult<bool>;

    /// Resets the cursor to its pre-iteration state. Returns
    /// [`crate::error::ErrorKind::CursorClosed`]-adjacent errors if this
    /// implementation cannot rewind (e.g. a consumed server-side cursor).
    fn rewind(&self) -> DbResult<()>;

    fn close(&self) -> DbResult<()>;
    fn is_closed(&self) -> bool;
}
