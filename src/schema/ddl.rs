//! DDL generation
//!
//! Tables use the canonical physical column names. The audit log table keeps
//! its fixed lowercase shape.

use super::TableDefinition;
use crate::store::quote_ident;

/// Default name of the run audit table
pub const DEFAULT_AUDIT_TABLE: &str = "etl_tracking";

/// `CREATE TABLE IF NOT EXISTS` for a registry table
pub fn create_table_sql(table: &TableDefinition) -> String {
    let primary_key = table.physical_primary_key();

    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|col| {
            let name = col.physical_name();
            let mut line = format!("    {} {}", quote_ident(&name), col.column_type.sql_type());
            if name == primary_key {
                line.push_str(" PRIMARY KEY");
            } else if !col.nullable {
                line.push_str(" NOT NULL");
            }
            line
        })
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
        quote_ident(&table.name),
        columns.join(",\n")
    )
}

/// `CREATE TABLE IF NOT EXISTS` for the run audit table
pub fn create_audit_table_sql(table: &str) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS {} (
    id TEXT PRIMARY KEY,
    execution_time TIMESTAMP NOT NULL,
    tables_loaded INTEGER NOT NULL,
    rows_loaded BIGINT NOT NULL,
    status VARCHAR(20) NOT NULL,
    details TEXT
);"#,
        quote_ident(table)
    )
}

/// Parameterized insert of one audit row
pub fn insert_audit_row_sql(table: &str) -> String {
    format!(
        "INSERT INTO {} (id, execution_time, tables_loaded, rows_loaded, status, details) VALUES (?, ?, ?, ?, ?, ?)",
        quote_ident(table)
    )
}
