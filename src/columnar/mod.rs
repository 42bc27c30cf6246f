//! The columnar paradigm contract (spec.md §4.3 "Columnar"), modeled on
//! Cassandra-family (CQL) backends such as ScyllaDB.

mod driver;
mod pool;

pub use driver::ColumnarDriver;
pub use pool::ColumnarPool;

use async_trait::async_trait;

use crate::connection::BaseConnection;
use crate::error::DbResult;

/// Re-exported rather than redefined: spec.md §3 stores one
/// `transaction-isolation` setting on `PoolState` and applies it "to
/// connections where the paradigm supports it", so columnar and relational
/// connections share the same level vocabulary instead of each inventing
/// their own.
pub use crate::relational::IsolationLevel;

/// A columnar (CQL-family) connection.
///
/// `begin_transaction` signals "not supported" with
/// [`crate::error::ErrorKind::TransactionNotSupported`] on backends that
/// lack ACID transactions, per spec.md §4.3.
#[async_trait]
pub trait ColumnarConnection: BaseConnection {
    async fn prepare(&self, cql: &str) -> DbResult<Box<dyn PreparedStatement>>;
    async fn execute_query(&self, cql: &str) -> DbResult<Box<dyn ResultSet>>;

    /// Executes a DDL or DML statement and returns a row-count estimate.
    ///
    /// Cassandra-family drivers do not return real affected-row counts; the
    /// estimate is deliberately lossy (0 for DDL, a parsed count from an
    /// `IN (...)` list, else 1) per spec.md §9. Callers needing an exact
    /// count must use a lightweight-transaction-style confirmation instead.
    async fn execute_update(&self, cql: &str) -> DbResult<u64>;

    /// `true` if this backend supports ACID transactions at all. When
    /// `false`, `begin_transaction` always returns
    /// [`crate::error::ErrorKind::TransactionNotSupported`].
    fn supports_transactions(&self) -> bool;

    async fn begin_transaction(&self) -> DbResult<()>;
    async fn commit(&self) -> DbResult<()>;
    async fn rollback(&self) -> DbResult<()>;
    fn in_transaction(&self) -> bool;

    /// Stores the isolation level for this connection. CQL-family backends
    /// have no engine-level notion of SQL isolation (they use consistency
    /// levels instead), so this is bookkeeping only — symmetric with
    /// `RelationalConnection`'s isolation accessors so the pool can apply
    /// `PoolConfig::transaction_isolation` uniformly.
    async fn set_transaction_isolation(&self, level: IsolationLevel) -> DbResult<()>;
    async fn get_transaction_isolation(&self) -> DbResult<IsolationLevel>;
}

#[async_trait]
pub trait PreparedStatement: Send + Sync {
    fn set_int(&self, index: i32, value: i32) -> DbResult<()>;
    fn set_long(&self, index: i32, value: i64) -> DbResult<()>;
    fn set_double(&self, index: i32, value: f64) -> DbResult<()>;
    fn set_string(&self, index: i32, value: &str) -> DbResult<()>;
    fn set_bool(&self, index: i32, value: bool) -> DbResult<()>;
    fn set_uuid(&self, index: i32, value: uuid::Uuid) -> DbResult<()>;
    fn set_bytes(&self, index: i32, value: &[u8]) -> DbResult<()>;

    async fn execute_query(&self) -> DbResult<Box<dyn ResultSet>>;
    async fn execute_update(&self) -> DbResult<u64>;

    /// Queues this statement's currently-bound parameters as one batch
    /// entry. Call repeatedly (re-binding between calls) to build a batch.
    fn add_batch(&self) -> DbResult<()>;
    fn clear_batch(&self) -> DbResult<()>;
    /// Executes all queued batch entries, returning one row-count estimate
    /// per entry, in the order they were queued.
    async fn execute_batch(&self) -> DbResult<Vec<u64>>;

    fn close(&self) -> DbResult<()>;
    fn is_closed(&self) -> bool;
}

/// A columnar result set. Extends the relational accessor set with UUID,
/// date, and timestamp typed accessors.
#[async_trait]
pub trait ResultSet: Send + Sync {
    fn next(&self) -> DbResult<bool>;
    fn is_before_first(&self) -> DbResult<bool>;
    fn is_after_last(&self) -> DbResult<bool>;
    fn get_row(&self) -> DbResult<u64>;

    fn column_names(&self) -> &[String];
    fn column_count(&self) -> usize {
        self.column_names().len()
    }

    fn is_null_by_index(&self, index: i32) -> DbResult<bool>;
    fn get_string_by_index(&self, index: i32) -> DbResult<Option<String>>;
    fn get_int_by_index(&self, index: i32) -> DbResult<Option<i32>>;
    fn get_long_by_index(&self, index: i32) -> DbResult<Option<i64>>;
    fn get_double_by_index(&self, index: i32) -> DbResult<Option<f64>>;
    fn get_bool_by_index(&self, index: i32) -> DbResult<Option<bool>>;
    fn get_bytes_by_index(&self, index: i32) -> DbResult<Option<Vec<u8>>>;
    fn get_uuid_by_index(&self, index: i32) -> DbResult<Option<uuid::Uuid>>;
    fn get_date_by_index(&self, index: i32) -> DbResult<Option<time::Date>>;
    fn get_timestamp_by_index(&self, index: i32) -> DbResult<Option<time::PrimitiveDateTime>>;

    fn close(&self) -> DbResult<()>;
    fn is_closed(&self) -> bool;

    fn column_index(&self, name: &str) -> DbResult<i32> {
        self.column_names()
            .iter()
            .position(|c| c == name)
            .map(|i| i as i32 + 1)
            .ok_or_else(|| crate::error::Error::invalid_column(format!("unknown column {name:?}")))
    }

    fn is_null(&self, name: &str) -> DbResult<bool> {
        self.is_null_by_index(self.column_index(name)?)
    }
    fn get_string(&self, name: &str) -> DbResult<Option<String>> {
        self.get_string_by_index(self.column_index(name)?)
    }
    fn get_int(&self, name: &str) -> DbResult<Option<i32>> {
        self.get_int_by_index(self.column_index(name)?)
    }
    fn get_long(&self, name: &str) -> DbResult<Option<i64>> {
        self.get_long_by_index(self.column_index(name)?)
    }
    fn get_double(&self, name: &str) -> DbResult<Option<f64>> {
        self.get_double_by_index(self.column_index(name)?)
    }
    fn get_bool(&self, name: &str) -> DbResult<Option<bool>> {
        self.get_bool_by_index(self.column_index(name)?)
    }
    fn get_bytes(&self, name: &str) -> DbResult<Option<Vec<u8>>> {
        self.get_bytes_by_index(self.column_index(name)?)
    }
    fn get_uuid(&self, name: &str) -> DbResult<Option<uuid::Uuid>> {
        self.get_uuid_by_index(self.column_index(name)?)
    }
    fn get_date(&self, name: &str) -> DbResult<Option<time::Date>> {
        self.get_date_by_index(self.column_index(name)?)
    }
    fn get_timestamp(&self, name: &str) -> DbResult<Option<time::PrimitiveDateTime>> {
        self.get_timestamp_by_index(self.column_index(name)?)
    }
}
