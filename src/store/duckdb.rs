//! DuckDB warehouse store implementation
//!
//! Provides an embedded warehouse using DuckDB. Supports both file-based
//! persistence and in-memory mode.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::DateTime;
use duckdb::ToSql;
use duckdb::types::{TimeUnit, ToSqlOutput, ValueRef};

use super::{QueryResult, StoreError, StoreResult, StoreTransaction, WarehouseStore};
use crate::batch::Value;

/// DuckDB warehouse store
///
/// The connection is wrapped in a `Mutex`; an open transaction holds the lock
/// until it is committed or dropped.
pub struct DuckDbStore {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    /// DuckDB connection
    connection: Mutex<duckdb::Connection>,
}

impl DuckDbStore {
    /// Open (or create) a file-based DuckDB warehouse
    pub fn new(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let connection = duckdb::Connection::open(&path)
            .map_err(|e| StoreError::ConnectionFailed(format!("Failed to open DuckDB: {}", e)))?;

        Ok(Self {
            db_path: Some(path),
            connection: Mutex::new(connection),
        })
    }

    /// Create an in-memory DuckDB warehouse
    ///
    /// Useful for testing or dry runs where persistence is not needed.
    pub fn in_memory() -> StoreResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            StoreError::ConnectionFailed(format!("Failed to create in-memory DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: None,
            connection: Mutex::new(connection),
        })
    }

    /// Get the database file path (None for in-memory)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Check if this is an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.db_path.is_none()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, duckdb::Connection>> {
        self.connection
            .lock()
            .map_err(|e| StoreError::ConnectionFailed(format!("Lock error: {}", e)))
    }

    fn run_query(
        conn: &duckdb::Connection,
        sql: &str,
        params: &[Value],
    ) -> StoreResult<QueryResult> {
        let start = std::time::Instant::now();

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| StoreError::QueryFailed(format!("Prepare failed: {}", e)))?;

        // Columns are only known once the statement has been executed
        let mut result_rows = stmt
            .query(duckdb::params_from_iter(params.iter()))
            .map_err(|e| StoreError::QueryFailed(format!("Query failed: {}", e)))?;

        let column_count = result_rows.as_ref().map(|r| r.column_count()).unwrap_or(0);
        let columns: Vec<String> = (0..column_count)
            .map(|i| {
                result_rows
                    .as_ref()
                    .and_then(|r| r.column_name(i).ok())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("col{}", i))
            })
            .collect();

        let mut rows = Vec::new();
        while let Some(row) = result_rows
            .next()
            .map_err(|e| StoreError::QueryFailed(format!("Row fetch error: {}", e)))?
        {
            let values = (0..column_count)
                .map(|i| match row.get_ref(i) {
                    Ok(value_ref) => Self::value_ref_to_value(value_ref),
                    Err(_) => Value::Null,
                })
                .collect();
            rows.push(values);
        }

        Ok(QueryResult {
            columns,
            rows,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn run_execute(conn: &duckdb::Connection, sql: &str, params: &[Value]) -> StoreResult<usize> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| StoreError::QueryFailed(format!("Prepare failed: {}", e)))?;

        stmt.execute(duckdb::params_from_iter(params.iter()))
            .map_err(|e| StoreError::QueryFailed(format!("Execute failed: {}", e)))
    }

    /// Convert a DuckDB ValueRef to a cell value
    fn value_ref_to_value(value: ValueRef) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Boolean(b) => Value::Bool(b),
            ValueRef::TinyInt(i) => Value::Int(i.into()),
            ValueRef::SmallInt(i) => Value::Int(i.into()),
            ValueRef::Int(i) => Value::Int(i.into()),
            ValueRef::BigInt(i) => Value::Int(i),
            ValueRef::HugeInt(i) => match i64::try_from(i) {
                Ok(v) => Value::Int(v),
                Err(_) => Value::Text(i.to_string()),
            },
            ValueRef::UTinyInt(i) => Value::Int(i.into()),
            ValueRef::USmallInt(i) => Value::Int(i.into()),
            ValueRef::UInt(i) => Value::Int(i.into()),
            ValueRef::UBigInt(i) => match i64::try_from(i) {
                Ok(v) => Value::Int(v),
                Err(_) => Value::Text(i.to_string()),
            },
            ValueRef::Float(f) => Value::from(f as f64),
            ValueRef::Double(f) => Value::from(f),
            ValueRef::Decimal(d) => d
                .to_string()
                .parse::<f64>()
                .map(Value::from)
                .unwrap_or(Value::Null),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Timestamp(unit, v) => {
                let micros = match unit {
                    TimeUnit::Second => v.saturating_mul(1_000_000),
                    TimeUnit::Millisecond => v.saturating_mul(1_000),
                    TimeUnit::Microsecond => v,
                    TimeUnit::Nanosecond => v / 1_000,
                };
                DateTime::from_timestamp_micros(micros)
                    .map(|dt| Value::Timestamp(dt.naive_utc()))
                    .unwrap_or(Value::Null)
            }
            ValueRef::Date32(days) => DateTime::from_timestamp(i64::from(days) * 86_400, 0)
                .map(|dt| Value::Timestamp(dt.naive_utc()))
                .unwrap_or(Value::Null),
            other => Value::Text(format!("{:?}", other)),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        use duckdb::types::Value as DuckValue;

        Ok(match self {
            Value::Null => ToSqlOutput::Owned(DuckValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(DuckValue::Boolean(*b)),
            Value::Int(i) => ToSqlOutput::Owned(DuckValue::BigInt(*i)),
            Value::Float(f) => ToSqlOutput::Owned(DuckValue::Double(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Timestamp(ts) => ToSqlOutput::Owned(DuckValue::Timestamp(
                TimeUnit::Microsecond,
                ts.and_utc().timestamp_micros(),
            )),
        })
    }
}

impl WarehouseStore for DuckDbStore {
    fn table_exists(&self, table: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let result = Self::run_query(
            &conn,
            "SELECT COUNT(*) AS count FROM information_schema.tables WHERE lower(table_name) = lower(?)",
            &[Value::Text(table.to_string())],
        )?;

        Ok(matches!(result.scalar(), Some(Value::Int(n)) if *n > 0))
    }

    fn execute_ddl(&self, sql: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql)
            .map_err(|e| StoreError::QueryFailed(format!("Batch execute failed: {}", e)))
    }

    fn query(&self, sql: &str, params: &[Value]) -> StoreResult<QueryResult> {
        let conn = self.lock()?;
        Self::run_query(&conn, sql, params)
    }

    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN TRANSACTION").map_err(|e| {
            StoreError::TransactionFailed(format!("Failed to begin transaction: {}", e))
        })?;

        Ok(Box::new(DuckDbTransaction {
            conn,
            finished: false,
        }))
    }

    fn backend_type(&self) -> &'static str {
        "duckdb"
    }
}

/// Open DuckDB transaction; rolls back on drop unless committed
pub struct DuckDbTransaction<'a> {
    conn: MutexGuard<'a, duckdb::Connection>,
    finished: bool,
}

impl StoreTransaction for DuckDbTransaction<'_> {
    fn query(&mut self, sql: &str, params: &[Value]) -> StoreResult<QueryResult> {
        DuckDbStore::run_query(&self.conn, sql, params)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> StoreResult<usize> {
        DuckDbStore::run_execute(&self.conn, sql, params)
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| StoreError::TransactionFailed(format!("Commit failed: {}", e)))?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for DuckDbTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished
            && let Err(e) = self.conn.execute_batch("ROLLBACK")
        {
            tracing::warn!("Rollback failed: {}", e);
        }
    }
}
