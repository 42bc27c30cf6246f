//! An in-process, in-memory columnar store standing in for a Cassandra-
//! family backend (ScyllaDB/Cassandra), per spec.md §9's non-goal on real
//! wire protocols.
//!
//! CQL is not parsed in any general sense: a tiny statement interpreter
//! recognizes `CREATE TABLE`, `INSERT INTO ... VALUES (?, ...)`,
//! `SELECT * FROM ... [WHERE col = ?]`, `UPDATE ... SET col = ? WHERE col =
//! ?` and `DELETE FROM ... WHERE col = ?` — enough surface to exercise the
//! `ColumnarConnection` contract (prepared statements, batches, the
//! unsupported-transactions path) without claiming to be a CQL engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::columnar::{ColumnarConnection, ColumnarDriver, IsolationLevel, PreparedStatement, ResultSet};
use crate::connection::{BaseConnection, Paradigm};
use crate::error::{DbResult, Error};
use crate::registry::{ConnectOptions, Driver};
use crate::url::ConnectionUrl;

#[derive(Debug, Clone, PartialEq)]
enum CqlValue {
    Null,
    Int(i64),
    Double(f64),
    Text(String),
    Bool(bool),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
}

struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<CqlValue>>,
}

type Keyspace = Mutex<HashMap<String, Table>>;

pub struct InMemoryColumnarDriver;

impl InMemoryColumnarDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl Driver for InMemoryColumnarDriver {
    fn name(&self) -> &str {
        "memory-columnar"
    }

    fn paradigm(&self) -> Paradigm {
        Paradigm::Columnar
    }

    fn default_port(&self) -> u16 {
        9042
    }

    fn url_schemes(&self) -> &[&str] {
        &["scylladb", "cassandra"]
    }

    async fn connect(&self, url: &ConnectionUrl, options: &ConnectOptions) -> DbResult<Arc<dyn BaseConnection>> {
        Ok(InMemoryColumnarConnection::open(url, options))
    }
}

#[async_trait]
impl ColumnarDriver for InMemoryColumnarDriver {
    async fn connect_columnar(
        &self,
        url: &ConnectionUrl,
        options: &ConnectOptions,
    ) -> DbResult<Arc<dyn ColumnarConnection>> {
        Ok(InMemoryColumnarConnection::open(url, options))
    }
}

pub struct InMemoryColumnarConnection {
    url: String,
    keyspace: Arc<Keyspace>,
    closed: AtomicBool,
    isolation: Mutex<IsolationLevel>,
}

impl InMemoryColumnarConnection {
    fn open(url: &ConnectionUrl, _options: &ConnectOptions) -> Arc<Self> {
        Arc::new(Self {
            url: url.as_str().to_owned(),
            keyspace: Arc::new(Mutex::new(HashMap::new())),
            closed: AtomicBool::new(false),
            isolation: Mutex::new(IsolationLevel::Serializable),
        })
    }
}

#[async_trait]
impl BaseConnection for InMemoryColumnarConnection {
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

fn token_after<'a>(upper: &str, original: &'a str, keyword: &str) -> Option<&'a str> {
    let idx = upper.find(keyword)?;
    let rest = original[idx + keyword.len()..].trim_start();
    let end = rest.find(|c: char| c.is_whitespace() || c == '(').unwrap_or(rest.len());
    Some(rest[..end].trim_end_matches(';'))
}

fn parenthesized(s: &str) -> Option<&str> {
    let start = s.find('(')? + 1;
    let end = s.rfind(')')?;
    if end <= start {
        None
    } else {
        Some(&s[start..end])
    }
}

fn run_statement(keyspace: &Keyspace, cql: &str, params: &[CqlValue]) -> DbResult<StatementOutcome> {
    let trimmed = cql.trim();
    let upper = trimmed.to_ascii_uppercase();

    if upper.starts_with("CREATE TABLE") {
        let name = token_after(&upper, trimmed, "TABLE").ok_or_else(|| Error::backend_error("malformed CREATE TABLE"))?;
        let columns = parenthesized(trimmed)
            .map(|body| {
                body.split(',')
                    .filter_map(|col| col.trim().split_whitespace().next().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default();
        keyspace
            .lock()
            .unwrap()
            .insert(name.to_owned(), Table { columns, rows: Vec::new() });
        return Ok(StatementOutcome::RowCount(0));
    }

    if upper.starts_with("INSERT INTO") {
        let name = token_after(&upper, trimmed, "INTO").ok_or_else(|| Error::backend_error("malformed INSERT"))?;
        let mut keyspace = keyspace.lock().unwrap();
        let table = keyspace
            .entry(name.to_owned())
            .or_insert_with(|| Table { columns: Vec::new(), rows: Vec::new() });
        table.rows.push(params.to_vec());
        return Ok(StatementOutcome::RowCount(1));
    }

    if upper.starts_with("SELECT") {
        let name = token_after(&upper, trimmed, "FROM").ok_or_else(|| Error::backend_error("malformed SELECT"))?;
        let keyspace = keyspace.lock().unwrap();
        let Some(table) = keyspace.get(name) else {
            return Ok(StatementOutcome::Rows(Vec::new(), Vec::new()));
        };
        let rows = if upper.contains("WHERE") && !params.is_empty() {
            table.rows.iter().filter(|row| row.first() == Some(&params[0])).cloned().collect()
        } else {
            table.rows.clone()
        };
        return Ok(StatementOutcome::Rows(table.columns.clone(), rows));
    }

    if upper.starts_with("DELETE FROM") {
        let name = token_after(&upper, trimmed, "FROM").ok_or_else(|| Error::backend_error("malformed DELETE"))?;
        let mut keyspace = keyspace.lock().unwrap();
        let Some(table) = keyspace.get_mut(name) else {
            return Ok(StatementOutcome::RowCount(0));
        };
        let before = table.rows.len();
        if let Some(key) = params.first() {
            table.rows.retain(|row| row.first() != Some(key));
        }
        return Ok(StatementOutcome::RowCount((before - table.rows.len()) as u64));
    }

    if upper.starts_with("UPDATE") {
        let name = token_after(&upper, trimmed, "UPDATE").ok_or_else(|| Error::backend_error("malformed UPDATE"))?;
        let mut keyspace = keyspace.lock().unwrap();
        let Some(table) = keyspace.get_mut(name) else {
            return Ok(StatementOutcome::RowCount(0));
        };
        if params.len() >= 2 {
            let (new_value, key) = (&params[0], &params[1]);
            let mut updated = 0u64;
            for row in table.rows.iter_mut().filter(|row| row.first() == Some(key)) {
                if row.len() > 1 {
                    row[1] = new_value.clone();
                }
                updated += 1;
            }
            return Ok(StatementOutcome::RowCount(updated));
        }
        return Ok(StatementOutcome::RowCount(0));
    }

    Err(Error::backend_error(format!("unsupported CQL statement: {trimmed}")))
}

enum StatementOutcome {
    RowCount(u64),
    Rows(Vec<String>, Vec<Vec<CqlValue>>),
}

#[async_trait]
impl ColumnarConnection for InMemoryColumnarConnection {
    async fn prepare(&self, cql: &str) -> DbResult<Box<dyn PreparedStatement>> {
        if self.is_closed() {
            return Err(Error::connection_closed());
        }
        Ok(Box::new(InMemoryColumnarStatement {
            cql: cql.to_owned(),
            keyspace: self.keyspace.clone(),
            params: Mutex::new(HashMap::new()),
            batch: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }))
    }

    async fn execute_query(&self, cql: &str) -> DbResult<Box<dyn ResultSet>> {
        if self.is_closed() {
            return Err(Error::connection_closed());
        }
        match run_statement(&self.keyspace, cql, &[])? {
            StatementOutcome::Rows(columns, rows) => Ok(Box::new(InMemoryColumnarResultSet::new(columns, rows))),
            StatementOutcome::RowCount(_) => Ok(Box::new(InMemoryColumnarResultSet::new(Vec::new(), Vec::new()))),
        }
    }

    async fn execute_update(&self, cql: &str) -> DbResult<u64> {
        if self.is_closed() {
            return Err(Error::connection_closed());
        }
        match run_statement(&self.keyspace, cql, &[])? {
            StatementOutcome::RowCount(n) => Ok(n),
            StatementOutcome::Rows(_, rows) => Ok(rows.len() as u64),
        }
    }

    fn supports_transactions(&self) -> bool {
        false
    }

    async fn begin_transaction(&self) -> DbResult<()> {
        Err(Error::transaction_not_supported("memory-columnar"))
    }

    async fn commit(&self) -> DbResult<()> {
        Err(Error::transaction_not_supported("memory-columnar"))
    }

    async fn rollback(&self) -> DbResult<()> {
        Err(Error::transaction_not_supported("memory-columnar"))
    }

    fn in_transaction(&self) -> bool {
        false
    }

    async fn set_transaction_isolation(&self, level: IsolationLevel) -> DbResult<()> {
        // CQL-family engines have no SQL isolation levels; record the
        // request so get_transaction_isolation reflects it, same as the
        // relational sqlite driver does for its own non-tunable case.
        *self.isolation.lock().unwrap() = level;
        Ok(())
    }

    async fn get_transaction_isolation(&self) -> DbResult<IsolationLevel> {
        Ok(*self.isolation.lock().unwrap())
    }
}

struct InMemoryColumnarStatement {
    cql: String,
    keyspace: Arc<Keyspace>,
    params: Mutex<HashMap<i32, CqlValue>>,
    batch: Mutex<Vec<Vec<CqlValue>>>,
    closed: AtomicBool,
}

impl InMemoryColumnarStatement {
    fn bind(&self, index: i32, value: CqlValue) -> DbResult<()> {
        if index < 1 {
            return Err(Error::invalid_parameter(format!("parameter index {index} is less than 1")));
        }
        self.params.lock().unwrap().insert(index, value);
        Ok(())
    }

    fn ordered_params(&self) -> Vec<CqlValue> {
        let params = self.params.lock().unwrap();
        let max_index = params.keys().copied().max().unwrap_or(0);
        (1..=max_index).map(|i| params.get(&i).cloned().unwrap_or(CqlValue::Null)).collect()
    }
}

#[async_trait]
impl PreparedStatement for InMemoryColumnarStatement {
    fn set_int(&self, index: i32, value: i32) -> DbResult<()> {
        self.bind(index, CqlValue::Int(value as i64))
    }
    fn set_long(&self, index: i32, value: i64) -> DbResult<()> {
        self.bind(index, CqlValue::Int(value))
    }
    fn set_double(&self, index: i32, value: f64) -> DbResult<()> {
        self.bind(index, CqlValue::Double(value))
    }
    fn set_string(&self, index: i32, value: &str) -> DbResult<()> {
        self.bind(index, CqlValue::Text(value.to_owned()))
    }
    fn set_bool(&self, index: i32, value: bool) -> DbResult<()> {
        self.bind(index, CqlValue::Bool(value))
    }
    fn set_uuid(&self, index: i32, value: uuid::Uuid) -> DbResult<()> {
        self.bind(index, CqlValue::Uuid(value))
    }
    fn set_bytes(&self, index: i32, value: &[u8]) -> DbResult<()> {
        self.bind(index, CqlValue::Bytes(value.to_vec()))
    }

    async fn execute_query(&self) -> DbResult<Box<dyn ResultSet>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::statement_closed());
        }
        match run_statement(&self.keyspace, &self.cql, &self.ordered_params())? {
            StatementOutcome::Rows(columns, rows) => Ok(Box::new(InMemoryColumnarResultSet::new(columns, rows))),
            StatementOutcome::RowCount(_) => Ok(Box::new(InMemoryColumnarResultSet::new(Vec::new(), Vec::new()))),
        }
    }

    async fn execute_update(&self) -> DbResult<u64> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::statement_closed());
        }
        match run_statement(&self.keyspace, &self.cql, &self.ordered_params())? {
            StatementOutcome::RowCount(n) => Ok(n),
            StatementOutcome::Rows(_, rows) => Ok(rows.len() as u64),
        }
    }

    fn add_batch(&self) -> DbResult<()> {
        self.batch.lock().unwrap().push(self.ordered_params());
        Ok(())
    }

    fn clear_batch(&self) -> DbResult<()> {
        self.batch.lock().unwrap().clear();
        Ok(())
    }

    async fn execute_batch(&self) -> DbResult<Vec<u64>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::statement_closed());
        }
        let entries = std::mem::take(&mut *self.batch.lock().unwrap());
        let mut counts = Vec::with_capacity(entries.len());
        for params in entries {
            match run_statement(&self.keyspace, &self.cql, &params)? {
                StatementOutcome::RowCount(n) => counts.push(n),
                StatementOutcome::Rows(_, rows) => counts.push(rows.len() as u64),
            }
        }
        Ok(counts)
    }

    fn close(&self) -> DbResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct InMemoryColumnarResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<CqlValue>>,
    cursor: std::sync::atomic::AtomicI64,
    closed: AtomicBool,
}

impl InMemoryColumnarResultSet {
    fn new(columns: Vec<String>, rows: Vec<Vec<CqlValue>>) -> Self {
        Self {
            columns,
            rows,
            cursor: std::sync::atomic::AtomicI64::new(-1),
            closed: AtomicBool::new(false),
        }
    }

    fn current_row(&self, index: i32) -> DbResult<&[CqlValue]> {
        let cursor = self.cursor.load(Ordering::Acquire);
        if cursor < 0 || cursor as usize >= self.rows.len() {
            return Err(Error::invalid_column("no current row; call next() first"));
        }
        if index < 1 || index as usize > self.rows[cursor as usize].len() {
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
                CqlValue::Null => Ok(None),
                $variant => Ok(Some($convert)),
                other => Err(Error::backend_error(format!("column {index} is not convertible: {other:?}"))),
            }
        }
    };
}

#[async_trait]
impl ResultSet for InMemoryColumnarResultSet {
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
        Ok(matches!(row[index as usize - 1], CqlValue::Null))
    }

    typed_getter!(get_int_by_index, i32, CqlValue::Int(v) => *v as i32);
    typed_getter!(get_long_by_index, i64, CqlValue::Int(v) => *v);
    typed_getter!(get_double_by_index, f64, CqlValue::Double(v) => *v);
    typed_getter!(get_bool_by_index, bool, CqlValue::Bool(v) => *v);
    typed_getter!(get_bytes_by_index, Vec<u8>, CqlValue::Bytes(v) => v.clone());
    typed_getter!(get_uuid_by_index, uuid::Uuid, CqlValue::Uuid(v) => *v);

    fn get_string_by_index(&self, index: i32) -> DbResult<Option<String>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::result_closed());
        }
        let row = self.current_row(index)?;
        match &row[index as usize - 1] {
            CqlValue::Null => Ok(None),
            CqlValue::Text(s) => Ok(Some(s.clone())),
            CqlValue::Int(v) => Ok(Some(v.to_string())),
            CqlValue::Double(v) => Ok(Some(v.to_string())),
            CqlValue::Uuid(v) => Ok(Some(v.to_string())),
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
        let format = time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
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
