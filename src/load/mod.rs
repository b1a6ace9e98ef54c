//! Warehouse load engine
//!
//! This module provides the loaders and their shared plumbing:
//! - [`dimension`]: SCD Type 2 upserts
//! - [`resolver`]: business key to surrogate key resolution for facts
//! - [`fact`]: append-only, deduplicated fact inserts
//! - [`orchestrator`]: run sequencing and the audit log
//!
//! Every component receives a [`LoadContext`] holding the store, the schema
//! registry, the load settings and the clock.

pub mod dimension;
pub mod fact;
pub mod orchestrator;
pub mod resolver;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, SubsecRound, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use dimension::DimensionLoader;
pub use fact::FactLoader;
pub use orchestrator::{
    LoadFailure, LoadOrchestrator, LoadPlan, LoadSummary, PlannedLoad, TableBatch, TableStrategy,
};
pub use resolver::FactKeyResolver;

use crate::batch::{Batch, Value, normalize_column_name};
use crate::error::{LoadError, LoadResult};
use crate::schema::{ColumnDefinition, SchemaRegistry, TableDefinition, TableKind};
use crate::schema::ddl::DEFAULT_AUDIT_TABLE;
use crate::store::{StoreTransaction, WarehouseStore, placeholders, quote_ident};

/// `valid_to` of a current dimension version
pub static MAX_VALID_TO: Lazy<NaiveDateTime> = Lazy::new(|| {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .expect("Invalid sentinel date")
});

/// Default wait after creating a table
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// What to do with a dimension row that carries no business key value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingKeyPolicy {
    /// Skip the row and record it as a row issue
    #[default]
    Reject,
    /// Abort the table load
    Fail,
    /// Insert the row as a brand-new entity
    InsertAsNew,
}

impl std::str::FromStr for MissingKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "reject" => Ok(MissingKeyPolicy::Reject),
            "fail" => Ok(MissingKeyPolicy::Fail),
            "insert_as_new" => Ok(MissingKeyPolicy::InsertAsNew),
            _ => Err(format!(
                "Unknown missing business key policy: {}. Use 'reject', 'fail' or 'insert_as_new'.",
                s
            )),
        }
    }
}

/// Tunables for a load run
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSettings {
    /// Wait after creating a table, and between visibility checks
    pub settle_delay: Duration,
    /// Handling of dimension rows without business key values
    pub missing_key_policy: MissingKeyPolicy,
    /// Run audit table
    pub audit_table: String,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            missing_key_policy: MissingKeyPolicy::default(),
            audit_table: DEFAULT_AUDIT_TABLE.to_string(),
        }
    }
}

/// Source of load timestamps
pub trait Clock {
    /// Current time
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock (UTC)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// Manually driven clock
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    /// Create a clock stopped at `now`
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock to `now`
    pub fn set(&self, now: NaiveDateTime) {
        if let Ok(mut current) = self.now.lock() {
            *current = now;
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut current) = self.now.lock() {
            *current += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.now
            .lock()
            .map(|now| *now)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

/// Everything a loader needs, passed explicitly
pub struct LoadContext<'a> {
    /// Target warehouse
    pub store: &'a dyn WarehouseStore,
    /// Table definitions
    pub registry: &'a SchemaRegistry,
    /// Run settings
    pub settings: LoadSettings,
    /// Timestamp source
    pub clock: &'a dyn Clock,
}

impl<'a> LoadContext<'a> {
    /// Create a context with default settings and the system clock
    pub fn new(store: &'a dyn WarehouseStore, registry: &'a SchemaRegistry) -> Self {
        Self {
            store,
            registry,
            settings: LoadSettings::default(),
            clock: &SystemClock,
        }
    }

    /// Replace the settings
    pub fn with_settings(mut self, settings: LoadSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the clock
    pub fn with_clock(mut self, clock: &'a dyn Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Load timestamp at the store's microsecond resolution
    pub fn now(&self) -> NaiveDateTime {
        self.clock.now().trunc_subsecs(6)
    }

    /// Definition of `table`, which must be of `kind`
    pub(crate) fn table_of_kind(&self, table: &str, kind: TableKind) -> LoadResult<&'a TableDefinition> {
        let def = self.registry.table(table)?;
        if def.kind != kind {
            return Err(LoadError::Configuration(format!(
                "'{}' is a {} table, expected {}",
                def.name, def.kind, kind
            )));
        }
        Ok(def)
    }
}

/// A row that could not be loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowIssue {
    /// Zero-based row index within the input batch
    pub row: usize,
    /// What was wrong with it
    pub message: String,
}

/// Outcome of loading one table batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableLoadResult {
    /// Table name
    pub table: String,
    /// Table kind
    pub kind: TableKind,
    /// New rows inserted
    pub rows_loaded: usize,
    /// Dimension rows versioned
    pub rows_updated: usize,
    /// Rows unchanged, duplicated or rejected
    pub rows_skipped: usize,
    /// Rejected rows
    pub issues: Vec<RowIssue>,
}

impl TableLoadResult {
    /// Create an empty result
    pub fn new(table: impl Into<String>, kind: TableKind) -> Self {
        Self {
            table: table.into(),
            kind,
            rows_loaded: 0,
            rows_updated: 0,
            rows_skipped: 0,
            issues: Vec::new(),
        }
    }

    /// Count a row as skipped because it could not be loaded
    pub fn reject(&mut self, row: usize, message: impl Into<String>) {
        let message = message.into();
        warn!("Skipping row {} of {}: {}", row, self.table, message);
        self.rows_skipped += 1;
        self.issues.push(RowIssue { row, message });
    }
}

/// Input row after normalization and coercion
#[derive(Debug, Clone)]
pub(crate) struct PreparedRow {
    /// Position in the input batch
    pub index: usize,
    /// One value per [`PreparedBatch::columns`] entry
    pub values: Vec<Value>,
}

/// Batch restricted to a table's columns, with values coerced to their types
#[derive(Debug, Clone)]
pub(crate) struct PreparedBatch {
    /// Physical column names
    pub columns: Vec<String>,
    pub rows: Vec<PreparedRow>,
}

impl PreparedBatch {
    /// Normalize, check and coerce `batch` for `table`
    ///
    /// Unknown columns and a supplied primary key are configuration errors.
    /// Audit columns other than the creation timestamp are maintained by the
    /// loaders and dropped from the input. Rows with values that cannot be
    /// coerced are rejected into `result`.
    pub fn prepare(
        table: &TableDefinition,
        registry: &SchemaRegistry,
        batch: &Batch,
        result: &mut TableLoadResult,
    ) -> LoadResult<Self> {
        let (normalized, dropped) = batch.normalized();
        for column in &dropped {
            warn!(
                "Dropping column {} of {} batch: duplicates an earlier column",
                column, table.name
            );
        }

        let audit = registry.audit();
        let created = normalize_column_name(&audit.created);
        let primary_key = table.physical_primary_key();

        let mut kept: Vec<(usize, &ColumnDefinition)> = Vec::new();
        for (idx, name) in normalized.columns().iter().enumerate() {
            let column = table.column(name).ok_or_else(|| {
                LoadError::Configuration(format!(
                    "Column '{}' is not defined for table '{}'",
                    name, table.name
                ))
            })?;
            if column.physical_name() == primary_key {
                return Err(LoadError::Configuration(format!(
                    "Surrogate key '{}' of '{}' is assigned by the loader",
                    name, table.name
                )));
            }
            if audit.contains(name) && column.physical_name() != created {
                debug!("Ignoring loader-maintained column {} of {}", name, table.name);
                continue;
            }
            kept.push((idx, column));
        }

        let null_exempt: Vec<String> = match table.kind {
            TableKind::Dimension => table
                .business_keys
                .iter()
                .map(|k| normalize_column_name(k))
                .collect(),
            TableKind::Fact => Vec::new(),
        };

        let mut rows = Vec::with_capacity(normalized.len());
        'rows: for (index, row) in normalized.rows().iter().enumerate() {
            let mut values = Vec::with_capacity(kept.len());
            for (idx, column) in &kept {
                let physical = column.physical_name();
                let value = match column.column_type.coerce(&row[*idx]) {
                    Ok(value) => value,
                    Err(e) => {
                        result.reject(index, format!("column {}: {}", physical, e));
                        continue 'rows;
                    }
                };
                if value.is_null() && !column.nullable && !null_exempt.contains(&physical) {
                    result.reject(index, format!("column {} must not be null", physical));
                    continue 'rows;
                }
                values.push(value);
            }
            rows.push(PreparedRow { index, values });
        }

        Ok(Self {
            columns: kept.iter().map(|(_, c)| c.physical_name()).collect(),
            rows,
        })
    }

    /// Position of a physical column
    pub fn position(&self, physical: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == physical)
    }

    /// Join-key tuple of `row` over the given column positions
    ///
    /// Columns absent from the batch contribute `None`.
    pub fn key_of(&self, row: &PreparedRow, positions: &[Option<usize>]) -> Vec<Option<String>> {
        positions
            .iter()
            .map(|pos| pos.and_then(|p| row.values[p].join_key()))
            .collect()
    }
}

/// Join-key tuple of a stored row
pub(crate) fn stored_key(values: &[Value], positions: &[usize]) -> Vec<Option<String>> {
    positions.iter().map(|&p| values[p].join_key()).collect()
}

/// Positions of key columns within a table definition's columns
pub(crate) fn definition_positions(table: &TableDefinition, keys: &[String]) -> LoadResult<Vec<usize>> {
    keys.iter()
        .map(|key| {
            let physical = normalize_column_name(key);
            table
                .columns
                .iter()
                .position(|c| c.physical_name() == physical)
                .ok_or_else(|| {
                    LoadError::Configuration(format!(
                        "Key column '{}' is not a column of '{}'",
                        key, table.name
                    ))
                })
        })
        .collect()
}

/// `SELECT` of all definition columns, in definition order
pub(crate) fn select_columns_sql(table: &TableDefinition, filter: Option<&str>) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| quote_ident(&c.physical_name()))
        .collect();
    let mut sql = format!("SELECT {} FROM {}", columns.join(", "), quote_ident(&table.name));
    if let Some(filter) = filter {
        sql.push_str(" WHERE ");
        sql.push_str(filter);
    }
    sql
}

/// `INSERT` of all definition columns, in definition order
pub(crate) fn insert_sql(table: &TableDefinition) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| quote_ident(&c.physical_name()))
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&table.name),
        columns.join(", "),
        placeholders(columns.len())
    )
}

/// First unused surrogate key, read inside the table's transaction
pub(crate) fn next_surrogate_key(
    tx: &mut dyn StoreTransaction,
    table: &TableDefinition,
) -> LoadResult<i64> {
    let sql = format!(
        "SELECT COALESCE(MAX({}), 0) FROM {}",
        quote_ident(&table.physical_primary_key()),
        quote_ident(&table.name)
    );
    match tx.query(&sql, &[])?.scalar() {
        Some(Value::Int(max)) => Ok(max + 1),
        other => Err(LoadError::IntegrityViolation(format!(
            "Unexpected surrogate key maximum {:?} in '{}'",
            other, table.name
        ))),
    }
}

/// Full row for a definition, built from named values; other columns are null
pub(crate) fn definition_row(table: &TableDefinition, values: &HashMap<String, Value>) -> Vec<Value> {
    table
        .columns
        .iter()
        .map(|c| values.get(&c.physical_name()).cloned().unwrap_or(Value::Null))
        .collect()
}
