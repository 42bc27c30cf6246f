//! A real relational driver over SQLite, via `rusqlite`. The one backend in
//! this crate that speaks to an actual embedded database engine rather than
//! standing in for one (spec.md §9 non-goal: real network wire protocols
//! for MySQL/PostgreSQL/etc. are out of scope, but a real embedded engine
//! is what makes the end-to-end pool scenarios actually testable).
//!
//! `rusqlite::Connection` is synchronous and `!Sync`; every async method
//! here locks a `tokio::sync::Mutex` around it and does the blocking SQLite
//! call inline. That is a deliberate simplification for a reference driver
//! with fast embedded-engine calls, not a pattern to copy for a backend
//! with real network latency (see `RelationalDriver` callers for the
//! intended generalization: a dedicated worker thread, as sqlite bindings
//! in this ecosystem normally use).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;

use crate::connection::{BaseConnection, Paradigm};
use crate::error::{DbResult, Error};
use crate::registry::{ConnectOptions, Driver};
use crate::relational::{IsolationLevel, PreparedStatement, RelationalConnection, RelationalDriver, ResultSet};
use crate::url::ConnectionUrl;

pub struct SqliteDriver;

impl SqliteDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }

    fn resolve_path(url: &ConnectionUrl) -> String {
        let tail = url.tail();
        if tail == ":memory:" || tail.is_empty() {
            ":memory:".to_owned()
        } else {
            tail.trim_start_matches('/').to_owned()
        }
    }

    async fn open_connection(url: &ConnectionUrl) -> DbResult<rusqlite::Connection> {
        let path = Self::resolve_path(url);
        tokio::task::spawn_blocking(move || {
            if path == ":memory:" {
                rusqlite::Connection::open_in_memory()
            } else {
                rusqlite::Connection::open(&path)
            }
        })
        .await
        .map_err(|e| Error::connection_failed(format!("sqlite worker task panicked: {e}")))?
        .map_err(|e| Error::connection_failed(e))
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn paradigm(&self) -> Paradigm {
        Paradigm::Relational
    }

    fn default_port(&self) -> u16 {
        0
    }

    fn url_schemes(&self) -> &[&str] {
        &["sqlite"]
    }

    async fn connect(&self, url: &ConnectionUrl, _options: &ConnectOptions) -> DbResult<Arc<dyn BaseConnection>> {
        Ok(SqliteConnection::open(url).await?)
    }
}

#[async_trait]
impl RelationalDriver for SqliteDriver {
    async fn connect_relational(
        &self,
        url: &ConnectionUrl,
        _options: &ConnectOptions,
    ) -> DbResult<Arc<dyn RelationalConnection>> {
        Ok(SqliteConnection::open(url).await?)
    }
}

pub struct SqliteConnection {
    url: String,
    conn: Arc<tokio::sync::Mutex<rusqlite::Connection>>,
    closed: AtomicBool,
    auto_commit: std::sync::atomic::AtomicBool,
    in_transaction: AtomicBool,
    isolation: Mutex<IsolationLevel>,
}

impl SqliteConnection {
    async fn open(url: &ConnectionUrl) -> DbResult<Arc<Self>> {
        let conn = SqliteDriver::open_connection(url).await?;
        Ok(Arc::new(Self {
            url: url.as_str().to_owned(),
            conn: Arc::new(tokio::sync::Mutex::new(conn)),
            closed: AtomicBool::new(false),
            auto_commit: std::sync::atomic::AtomicBool::new(true),
            in_transaction: AtomicBool::new(false),
            isolation: Mutex::new(IsolationLevel::Serializable),
        }))
    }
}

fn bind_params(conn: &rusqlite::Connection, sql: &str, params: &HashMap<i32, SqlValue>) -> DbResult<rusqlite::Statement<'_>> {
    let stmt = conn
        .prepare(sql)
        .map_err(|e| Error::backend_error(format!("prepare failed: {e}")))?;
    let max_index = params.keys().copied().max().unwrap_or(0);
    for i in 1..=max_index {
        if !params.contains_key(&i) {
            return Err(Error::invalid_parameter(format!(
                "parameter {i} was never bound"
            )));
        }
    }
    Ok(stmt)
}

fn ordered_values(params: &HashMap<i32, SqlValue>) -> Vec<SqlValue> {
    let max_index = params.keys().copied().max().unwrap_or(0);
    (1..=max_index).map(|i| params.get(&i).cloned().unwrap_or(SqlValue::Null)).collect()
}

fn materialize(stmt: &mut rusqlite::Statement<'_>, values: &[SqlValue]) -> DbResult<(Vec<String>, Vec<Vec<SqlValue>>)> {
    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
    let column_count = columns.len();

    let params: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v as &dyn rusqlite::types::ToSql).collect();
    let mut rows_iter = stmt
        .query(params.as_slice())
        .map_err(|e| Error::backend_error(format!("query failed: {e}")))?;

    let mut rows = Vec::new();
    while let Some(row) = rows_iter
        .next()
        .map_err(|e| Error::backend_error(format!("row fetch failed: {e}")))?
    {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let v: SqlValue = row
                .get(i)
                .map_err(|e| Error::backend_error(format!("column {i} fetch failed: {e}")))?;
            values.push(v);
        }
        rows.push(values);
    }
    Ok((columns, rows))
}

#[async_trait]
impl BaseConnection for SqliteConnection {
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
impl RelationalConnection for SqliteConnection {
    async fn prepare(&self, sql: &str) -> DbResult<Box<dyn PreparedStatement>> {
        if self.is_closed() {
            return Err(Error::connection_closed());
        }
        Ok(Box::new(SqliteStatement {
            sql: sql.to_owned(),
            conn: self.conn.clone(),
            params: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }))
    }

    async fn execute_query(&self, sql: &str) -> DbResult<Box<dyn ResultSet>> {
        if self.is_closed() {
            return Err(Error::connection_closed());
        }
        let sql = sql.to_owned();
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::backend_error(format!("prepare failed: {e}")))?;
        let (columns, rows) = materialize(&mut stmt, &[])?;
        Ok(Box::new(SqliteResultSet::new(columns, rows)))
    }

    async fn execute_update(&self, sql: &str) -> DbResult<u64> {
        if self.is_closed() {
            return Err(Error::connection_closed());
        }
        let conn = self.conn.lock().await;
        let affected = conn
            .execute(sql, [])
            .map_err(|e| Error::backend_error(format!("execute failed: {e}")))?;
        Ok(affected as u64)
    }

    async fn set_auto_commit(&self, enabled: bool) -> DbResult<()> {
        self.auto_commit.store(enabled, Ordering::Release);
        Ok(())
    }

    async fn get_auto_commit(&self) -> DbResult<bool> {
        Ok(self.auto_commit.load(Ordering::Acquire))
    }

    async fn begin_transaction(&self) -> DbResult<()> {
        if self.is_closed() {
            return Err(Error::connection_closed());
        }
        let conn = self.conn.lock().await;
        conn.execute_batch("BEGIN DEFERRED")
            .map_err(|e| Error::backend_error(format!("begin failed: {e}")))?;
        self.in_transaction.store(true, Ordering::Release);
        Ok(())
    }

    async fn commit(&self) -> DbResult<()> {
        if self.is_closed() {
            return Err(Error::connection_closed());
        }
        let conn = self.conn.lock().await;
        conn.execute_batch("COMMIT")
            .map_err(|e| Error::backend_error(format!("commit failed: {e}")))?;
        self.in_transaction.store(false, Ordering::Release);
        Ok(())
    }

    async fn rollback(&self) -> DbResult<()> {
        if self.is_closed() {
            return Err(Error::connection_closed());
        }
        let conn = self.conn.lock().await;
        conn.execute_batch("ROLLBACK")
            .map_err(|e| Error::backend_error(format!("rollback failed: {e}")))?;
        self.in_transaction.store(false, Ordering::Release);
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::Acquire)
    }

    async fn set_transaction_isolation(&self, level: IsolationLevel) -> DbResult<()> {
        // SQLite has no tunable isolation level beyond what its locking
        // mode gives; record the request so get_transaction_isolation is
        // self-consistent, but it has no effect on engine behavior.
        *self.isolation.lock().unwrap() = level;
        Ok(())
    }

    async fn get_transaction_isolation(&self) -> DbResult<IsolationLevel> {
        Ok(*self.isolation.lock().unwrap())
    }
}

struct SqliteStatement {
    sql: String,
    conn: Arc<tokio::sync::Mutex<rusqlite::Connection>>,
    params: Mutex<HashMap<i32, SqlValue>>,
    closed: AtomicBool,
}

impl SqliteStatement {
    fn bind(&self, index: i32, value: SqlValue) -> DbResult<()> {
        if index < 1 {
            return Err(Error::invalid_parameter(format!("parameter index {index} is less than 1")));
        }
        self.params.lock().unwrap().insert(index, value);
        Ok(())
    }
}

#[async_trait]
impl PreparedStatement for SqliteStatement {
    fn set_int(&self, index: i32, value: i32) -> DbResult<()> {
        self.bind(index, SqlValue::Integer(value as i64))
    }
    fn set_long(&self, index: i32, value: i64) -> DbResult<()> {
        self.bind(index, SqlValue::Integer(value))
    }
    fn set_double(&self, index: i32, value: f64) -> DbResult<()> {
        self.bind(index, SqlValue::Real(value))
    }
    fn set_string(&self, index: i32, value: &str) -> DbResult<()> {
        self.bind(index, SqlValue::Text(value.to_owned()))
    }
    fn set_bool(&self, index: i32, value: bool) -> DbResult<()> {
        self.bind(index, SqlValue::Integer(value as i64))
    }
    fn set_null(&self, index: i32, _sql_type: &str) -> DbResult<()> {
        self.bind(index, SqlValue::Null)
    }
    fn set_date(&self, index: i32, value: time::Date) -> DbResult<()> {
        self.bind(index, SqlValue::Text(value.to_string()))
    }
    fn set_timestamp(&self, index: i32, value: time::PrimitiveDateTime) -> DbResult<()> {
        self.bind(index, SqlValue::Text(value.to_string()))
    }
    fn set_bytes(&self, index: i32, value: &[u8]) -> DbResult<()> {
        self.bind(index, SqlValue::Blob(value.to_vec()))
    }

    async fn execute_query(&self) -> DbResult<Box<dyn ResultSet>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::statement_closed());
        }
        let values = ordered_values(&self.params.lock().unwrap());
        let conn = self.conn.lock().await;
        let mut stmt = bind_params(&conn, &self.sql, &self.params.lock().unwrap())?;
        let (columns, rows) = materialize(&mut stmt, &values)?;
        Ok(Box::new(SqliteResultSet::new(columns, rows)))
    }

    async fn execute_update(&self) -> DbResult<u64> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::statement_closed());
        }
        let values = ordered_values(&self.params.lock().unwrap());
        let params: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v as &dyn rusqlite::types::ToSql).collect();
        let conn = self.conn.lock().await;
        let affected = conn
            .execute(&self.sql, params.as_slice())
            .map_err(|e| Error::backend_error(format!("execute failed: {e}")))?;
        Ok(affected as u64)
    }

    fn close(&self) -> DbResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct SqliteResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    cursor: AtomicI64,
    closed: AtomicBool,
}

impl SqliteResultSet {
    fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns,
            rows,
            cursor: AtomicI64::new(-1),
            closed: AtomicBool::new(false),
        }
    }

    fn current_row(&self, index: i32) -> DbResult<&[SqlValue]> {
        let cursor = self.cursor.load(Ordering::Acquire);
        if cursor < 0 || cursor as usize >= self.rows.len() {
            return Err(Error::invalid_column("no current row; call next() first"));
        }
        if index < 1 || index as usize > self.columns.len() {
            return Err(Error::invalid_column(format!("column index {index} out of range")));
        }
        Ok(&self.rows[cursor as usize])
    }
}

macro_rules! typed_getter {
    ($name:ident, $ty:ty, $variant:pat => $convert:expr) => {
        fn $name(&self, index: i32) -> DbResult<Option<$ty>> {
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::result_closed());
            }
            let row = self.current_row(index)?;
            match &row[index as usize - 1] {
                SqlValue::Null => Ok(None),
                $variant => Ok(Some($convert)),
                other => Err(Error::backend_error(format!("column {index} is not convertible: {other:?}"))),
            }
        }
    };
}

#[async_trait]
impl ResultSet for SqliteResultSet {
    fn next(&self) -> DbResult<bool> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::result_closed());
        }
        let next_idx = self.cursor.load(Ordering::Acquire) + 1;
        if (next_idx as usize) < self.rows.len() {
            self.cursor.store(next_idx, Ordering::Release);
            Ok(true)
        } else {
            self.cursor.store(self.rows.len() as i64, Ordering::Release);
            Ok(false)
        }
    }

    fn is_before_first(&self) -> DbResult<bool> {
        Ok(self.cursor.load(Ordering::Acquire) < 0)
    }

    fn is_after_last(&self) -> DbResult<bool> {
        let cursor = self.cursor.load(Ordering::Acquire);
        Ok(cursor >= 0 && cursor as usize >= self.rows.len())
    }

    fn get_row(&self) -> DbResult<u64> {
        let cursor = self.cursor.load(Ordering::Acquire);
        Ok(if cursor < 0 { 0 } else { (cursor + 1) as u64 })
    }

    fn column_names(&self) -> &[String] {
        &self.columns
    }

    fn is_null_by_index(&self, index: i32) -> DbResult<bool> {
        let row = self.current_row(index)?;
        Ok(matches!(row[index as usize - 1], SqlValue::Null))
    }

    typed_getter!(get_int_by_index, i32, SqlValue::Integer(v) => *v as i32);
    typed_getter!(get_long_by_index, i64, SqlValue::Integer(v) => *v);
    typed_getter!(get_double_by_index, f64, SqlValue::Real(v) => *v);
    typed_getter!(get_bool_by_index, bool, SqlValue::Integer(v) => *v != 0);
    typed_getter!(get_bytes_by_index, Vec<u8>, SqlValue::Blob(v) => v.clone());

    fn get_string_by_index(&self, index: i32) -> DbResult<Option<String>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::result_closed());
        }
        let row = self.current_row(index)?;
        match &row[index as usize - 1] {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.clone())),
            SqlValue::Integer(v) => Ok(Some(v.to_string())),
            SqlValue::Real(v) => Ok(Some(v.to_string())),
            other => Err(Error::backend_error(format!("column {index} is not convertible to string: {other:?}"))),
        }
    }

    fn get_date_by_index(&self, index: i32) -> DbResult<Option<time::Date>> {
        let Some(text) = self.get_string_by_index(index)? else {
            return Ok(None);
        };
        let format = time::macros::format_description!("[year]-[month]-[day]");
        time::Date::parse(&text, &format)
            .map(Some)
            .map_err(|e| Error::backend_error(format!("column {index} is not a valid date: {e}")))
    }

    fn get_timestamp_by_index(&self, index: i32) -> DbResult<Option<time::PrimitiveDateTime>> {
        let Some(text) = self.get_string_by_index(index)? else {
            return Ok(None);
        };
        let format = time::macros::format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        );
        time::PrimitiveDateTime::parse(&text, &format)
            .map(Some)
            .map_err(|e| Error::backend_error(format!("column {index} is not a valid timestamp: {e}")))
    }

    fn close(&self) -> DbResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
