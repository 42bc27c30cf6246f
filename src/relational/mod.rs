//! The relational paradigm contract (spec.md §4.3 "Relational").

mod driver;
mod pool;

pub use driver::RelationalDriver;
pub use pool::RelationalPool;

use async_trait::async_trait;

use crate::connection::BaseConnection;
use crate::error::DbResult;

/// Standard SQL transaction isolation levels. Stored on `PoolState` and
/// applied to connections where the backend supports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl std::str::FromStr for IsolationLevel {
    type Err = crate::error::Error;

    /// Parses the config-record spelling of `PoolConfig::transaction_isolation`
    /// (spec.md §6), case- and separator-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "READ_UNCOMMITTED" => Ok(Self::ReadUncommitted),
            "READ_COMMITTED" => Ok(Self::ReadCommitted),
            "REPEATABLE_READ" => Ok(Self::RepeatableRead),
            "SERIALIZABLE" => Ok(Self::Serializable),
            other => Err(crate::error::Error::invalid_parameter(format!(
                "unknown transaction isolation level {other:?}"
            ))),
        }
    }
}

/// A relational (SQL) connection: prepared statements, result sets,
/// transactions, auto-commit, and isolation level.
#[async_trait]
pub trait RelationalConnection: BaseConnection {
    /// Prepares a parameterized SQL statement.
    async fn prepare(&self, sql: &str) -> DbResult<Box<dyn PreparedStatement>>;

    /// Executes `sql` directly (no parameters) and returns its result set.
    async fn execute_query(&self, sql: &str) -> DbResult<Box<dyn ResultSet>>;

    /// Executes `sql` directly (no parameters) and returns the affected-row
    /// count.
    async fn execute_update(&self, sql: &str) -> DbResult<u64>;

    async fn set_auto_commit(&self, enabled: bool) -> DbResult<()>;
    async fn get_auto_commit(&self) -> DbResult<bool>;

    async fn begin_transaction(&self) -> DbResult<()>;
    async fn commit(&self) -> DbResult<()>;
    async fn rollback(&self) -> DbResult<()>;

    /// `true` if a transaction is currently open on this connection. Used
    /// by the pool's pre-return cleanup to decide whether a rollback is
    /// needed before the handle re-enters the idle queue.
    fn in_transaction(&self) -> bool;

    async fn set_transaction_isolation(&self, level: IsolationLevel) -> DbResult<()>;
    async fn get_transaction_isolation(&self) -> DbResult<IsolationLevel>;
}

/// A parameterized SQL statement obtained from [`RelationalConnection::prepare`].
///
/// Parameter indices are 1-based, matching the spec and the conventions of
/// the SQL standard itself. Binding an index `< 1` or beyond the statement's
/// parameter count is an [`crate::error::ErrorKind::InvalidParameter`] error.
#[async_trait]
pub trait PreparedStatement: Send + Sync {
    fn set_int(&self, index: i32, value: i32) -> DbResult<()>;
    fn set_long(&self, index: i32, value: i64) -> DbResult<()>;
    fn set_double(&self, index: i32, value: f64) -> DbResult<()>;
    fn set_string(&self, index: i32, value: &str) -> DbResult<()>;
    fn set_bool(&self, index: i32, value: bool) -> DbResult<()>;
    /// Binds SQL `NULL` at `index`, tagged with the SQL type it would have
    /// held (used by backends that must still send a type code for a null
    /// parameter).
    fn set_null(&self, index: i32, sql_type: &str) -> DbResult<()>;
    fn set_date(&self, index: i32, value: time::Date) -> DbResult<()>;
    fn set_timestamp(&self, index: i32, value: time::PrimitiveDateTime) -> DbResult<()>;
    fn set_bytes(&self, index: i32, value: &[u8]) -> DbResult<()>;

    async fn execute_query(&self) -> DbResult<Box<dyn ResultSet>>;
    async fn execute_update(&self) -> DbResult<u64>;

    fn close(&self) -> DbResult<()>;
    fn is_closed(&self) -> bool;
}

/// A relational result set: row navigation plus typed, 1-based-index or
/// by-name column accessors.
///
/// Implementors need only provide the `*_by_index` primitives and
/// [`ResultSet::column_names`]; the by-name accessors are derived default
/// methods that resolve the name to an index and delegate, so there is
/// exactly one code path per type, matching the dual-access invariant in
/// spec.md §8 ("reading a non-null column by index `i` equals reading by
/// name `column_names[i-1]`").
#[async_trait]
pub trait ResultSet: Send + Sync {
    fn next(&self) -> DbResult<bool>;
    fn is_before_first(&self) -> DbResult<bool>;
    fn is_after_last(&self) -> DbResult<bool>;
    /// 1-based current row number, or 0 before the first `next()`.
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
    fn get_date_by_index(&self, index: i32) -> DbResult<Option<time::Date>>;
    fn get_timestamp_by_index(&self, index: i32) -> DbResult<Option<time::PrimitiveDateTime>>;
    fn get_bytes_by_index(&self, index: i32) -> DbResult<Option<Vec<u8>>>;

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
    fn get_date(&self, name: &str) -> DbResult<Option<time::Date>> {
        self.get_date_by_index(self.column_index(name)?)
    }
    fn get_timestamp(&self, name: &str) -> DbResult<Option<time::PrimitiveDateTime>> {
        self.get_timestamp_by_index(self.column_index(name)?)
    }
    fn get_bytes(&self, name: &str) -> DbResult<Option<Vec<u8>>> {
        self.get_bytes_by_index(self.column_index(name)?)
    }
}
