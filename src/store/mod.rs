//! Warehouse store abstraction
//!
//! This module provides the relational seam the loaders write through:
//! - `table_exists` / `execute_ddl` for lazy table creation
//! - parameterized queries outside a transaction (key projections)
//! - transactions with parameterized queries and writes
//!
//! Implementations:
//! - DuckDB: embedded warehouse (`duckdb-backend` feature)
//!
//! SQL identifiers never come from batch data. Callers quote identifiers taken
//! from the validated schema registry with [`quote_ident`] and bind every value
//! as a parameter.

use serde::{Deserialize, Serialize};

use crate::batch::Value;

#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDbStore;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to connect to the warehouse or acquire the connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction begin/commit/rollback failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Query result set
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    /// Column names as reported by the store
    pub columns: Vec<String>,
    /// Rows of data, one value per column
    pub rows: Vec<Vec<Value>>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create a new query result
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            execution_time_ms: 0,
        }
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, compared case-insensitively
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Value of a named column in a row
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// First column of the first row, for scalar queries
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.first())
    }
}

/// Warehouse backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendType {
    /// DuckDB embedded database (default)
    #[default]
    DuckDB,
}

impl std::str::FromStr for StoreBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "duckdb" => Ok(StoreBackendType::DuckDB),
            _ => Err(format!("Unknown warehouse backend: {}. Use 'duckdb'.", s)),
        }
    }
}

impl std::fmt::Display for StoreBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackendType::DuckDB => write!(f, "duckdb"),
        }
    }
}

/// Relational warehouse the loaders write into
///
/// Calls on the store itself must not be made while a transaction obtained
/// from [`WarehouseStore::begin`] is alive; implementations may hold an
/// exclusive connection for the transaction's lifetime.
pub trait WarehouseStore {
    /// Check whether a table is visible to subsequent statements
    fn table_exists(&self, table: &str) -> StoreResult<bool>;

    /// Execute one or more DDL statements
    fn execute_ddl(&self, sql: &str) -> StoreResult<()>;

    /// Run a parameterized query outside any explicit transaction
    fn query(&self, sql: &str, params: &[Value]) -> StoreResult<QueryResult>;

    /// Begin a transaction
    ///
    /// Dropping the returned transaction without committing rolls it back.
    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>>;

    /// Get the backend type name
    fn backend_type(&self) -> &'static str;
}

/// An open warehouse transaction
pub trait StoreTransaction {
    /// Run a parameterized query inside the transaction
    fn query(&mut self, sql: &str, params: &[Value]) -> StoreResult<QueryResult>;

    /// Run a parameterized write; returns the number of affected rows
    fn execute(&mut self, sql: &str, params: &[Value]) -> StoreResult<usize>;

    /// Commit the transaction
    fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Quote a validated identifier for use in SQL text
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Comma-separated `?` placeholders
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("Dk_Mensajero"), "\"Dk_Mensajero\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(0), "");
    }

    #[test]
    fn test_backend_type_from_str() {
        assert_eq!(
            StoreBackendType::from_str("DuckDB").unwrap(),
            StoreBackendType::DuckDB
        );
        assert!(StoreBackendType::from_str("oracle").is_err());
        assert_eq!(StoreBackendType::DuckDB.to_string(), "duckdb");
    }

    #[test]
    fn test_query_result_lookup() {
        let result = QueryResult::new(
            vec!["Dk_Area".to_string(), "Nombre_Area".to_string()],
            vec![vec![Value::Int(1), Value::Text("Ventas".to_string())]],
        );
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.get(0, "nombre_area"), Some(&Value::Text("Ventas".to_string())));
        assert_eq!(result.scalar(), Some(&Value::Int(1)));
        assert!(result.get(1, "Dk_Area").is_none());
    }
}
