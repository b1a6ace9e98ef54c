//! Schema registry
//!
//! Holds the deploy-time table definitions the loaders consult: table kind,
//! primary key, business keys (dimensions) or unique columns (facts), typed
//! columns and fact key mappings. Definitions are read from TOML:
//!
//! ```toml
//! [audit]
//! valid_from = "valid_from"
//!
//! [[tables]]
//! name = "dim_courier"
//! kind = "dimension"
//! primary_key = "dk_courier"
//! business_keys = ["id_courier_bdo"]
//! columns = [
//!     { name = "id_courier_bdo", type = "text", nullable = false },
//!     { name = "name", type = "text" },
//! ]
//! ```
//!
//! Primary keys, fact mapping targets and audit columns are appended to a
//! table's columns when not declared. Every identifier is validated on
//! construction, so SQL text built from the registry never contains input
//! data.

pub mod ddl;
pub mod sample;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::batch::{Value, normalize_column_name};
use crate::error::{LoadError, LoadResult};
use crate::store::WarehouseStore;

pub use sample::{SAMPLE_SCHEMA, sample_schema};

static RE_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid regex"));

/// Visibility checks made after creating a table
pub const VISIBILITY_ATTEMPTS: u32 = 5;

/// Check whether a name is usable as a SQL identifier
pub fn is_valid_identifier(name: &str) -> bool {
    RE_IDENTIFIER.is_match(name)
}

fn validate_identifier(name: &str, what: &str) -> LoadResult<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(LoadError::Configuration(format!(
            "Invalid {} name '{}': must match [A-Za-z_][A-Za-z0-9_]*",
            what, name
        )))
    }
}

/// Role a table plays in the star schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    /// Versioned descriptive table (SCD Type 2)
    Dimension,
    /// Append-only event table
    Fact,
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableKind::Dimension => write!(f, "dimension"),
            TableKind::Fact => write!(f, "fact"),
        }
    }
}

/// Logical column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[serde(alias = "int")]
    Integer,
    BigInt,
    #[serde(alias = "float")]
    Double,
    #[serde(alias = "string")]
    Text,
    #[serde(alias = "bool")]
    Boolean,
    Timestamp,
}

impl ColumnType {
    /// SQL type used in DDL
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }

    /// Convert a batch value to this column's representation
    ///
    /// `Null` always passes through. Timestamps are truncated to microseconds,
    /// the store's resolution.
    pub fn coerce(&self, value: &Value) -> Result<Value, String> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match self {
            ColumnType::Integer | ColumnType::BigInt => {
                let int = match value {
                    Value::Int(i) => Some(*i),
                    Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Some(*f as i64),
                    Value::Text(s) => s.trim().parse::<i64>().ok().or_else(|| {
                        s.trim()
                            .parse::<f64>()
                            .ok()
                            .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                            .map(|f| f as i64)
                    }),
                    _ => None,
                };
                match int {
                    Some(i) if *self == ColumnType::Integer && i32::try_from(i).is_err() => {
                        Err(format!("{} is out of range for integer", i))
                    }
                    Some(i) => Ok(Value::Int(i)),
                    None => Err(format!("cannot convert {:?} to an integer", value)),
                }
            }
            ColumnType::Double => match value {
                Value::Int(i) => Ok(Value::Float(*i as f64)),
                Value::Float(f) => Ok(Value::Float(*f)),
                Value::Text(s) => match s.trim().parse::<f64>() {
                    Ok(f) if f.is_finite() => Ok(Value::Float(f)),
                    _ => Err(format!("cannot convert {:?} to a double", value)),
                },
                _ => Err(format!("cannot convert {:?} to a double", value)),
            },
            ColumnType::Text => value
                .join_key()
                .map(Value::Text)
                .ok_or_else(|| "missing value".to_string()),
            ColumnType::Boolean => match value {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::Int(0) => Ok(Value::Bool(false)),
                Value::Int(1) => Ok(Value::Bool(true)),
                Value::Float(f) if *f == 0.0 => Ok(Value::Bool(false)),
                Value::Float(f) if *f == 1.0 => Ok(Value::Bool(true)),
                Value::Text(s) => match s.trim().to_lowercase().as_str() {
                    "true" | "t" | "yes" | "y" | "1" => Ok(Value::Bool(true)),
                    "false" | "f" | "no" | "n" | "0" => Ok(Value::Bool(false)),
                    _ => Err(format!("cannot convert {:?} to a boolean", value)),
                },
                _ => Err(format!("cannot convert {:?} to a boolean", value)),
            },
            ColumnType::Timestamp => match value {
                Value::Timestamp(ts) => Ok(Value::Timestamp(ts.trunc_subsecs(6))),
                Value::Text(s) => parse_timestamp(s.trim())
                    .map(|ts| Value::Timestamp(ts.trunc_subsecs(6)))
                    .ok_or_else(|| format!("cannot parse {:?} as a timestamp", s)),
                _ => Err(format!("cannot convert {:?} to a timestamp", value)),
            },
        }
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn default_nullable() -> bool {
    true
}

/// A typed column of a warehouse table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Logical column name
    pub name: String,
    /// Column type
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Whether the column accepts missing values
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

impl ColumnDefinition {
    /// Create a column definition
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable,
        }
    }

    /// Name used in DDL and DML
    pub fn physical_name(&self) -> String {
        normalize_column_name(&self.name)
    }
}

/// How a fact column is resolved from a referenced table
///
/// `source_column` holds the business key in the incoming batch. Its value,
/// prefixed with `role_prefix` when set, is looked up in `table.business_key`
/// and replaced by `table.surrogate_key`, written to `target_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMapping {
    /// Referenced dimension or fact table
    pub table: String,
    /// Batch column carrying the business key
    pub source_column: String,
    /// Business key column in the referenced table
    pub business_key: String,
    /// Surrogate key column in the referenced table
    pub surrogate_key: String,
    /// Fact column receiving the surrogate key
    pub target_column: String,
    /// Role tag prepended to the business key before the join (e.g. `O-`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_prefix: Option<String>,
}

fn default_valid_from() -> String {
    "valid_from".to_string()
}

fn default_valid_to() -> String {
    "valid_to".to_string()
}

fn default_is_current() -> String {
    "is_current".to_string()
}

fn default_created() -> String {
    "created_at".to_string()
}

fn default_modified() -> String {
    "updated_at".to_string()
}

/// Logical names of the columns the loaders maintain themselves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditColumns {
    /// Start of a dimension version's validity
    #[serde(default = "default_valid_from")]
    pub valid_from: String,
    /// End of a dimension version's validity
    #[serde(default = "default_valid_to")]
    pub valid_to: String,
    /// Current-version flag
    #[serde(default = "default_is_current")]
    pub is_current: String,
    /// Creation timestamp
    #[serde(default = "default_created")]
    pub created: String,
    /// Last-modified timestamp
    #[serde(default = "default_modified")]
    pub modified: String,
}

impl Default for AuditColumns {
    fn default() -> Self {
        Self {
            valid_from: default_valid_from(),
            valid_to: default_valid_to(),
            is_current: default_is_current(),
            created: default_created(),
            modified: default_modified(),
        }
    }
}

impl AuditColumns {
    /// Audit columns carried by tables of a given kind
    pub fn columns_for(&self, kind: TableKind) -> Vec<ColumnDefinition> {
        match kind {
            TableKind::Dimension => vec![
                ColumnDefinition::new(&self.created, ColumnType::Timestamp, true),
                ColumnDefinition::new(&self.valid_from, ColumnType::Timestamp, false),
                ColumnDefinition::new(&self.valid_to, ColumnType::Timestamp, false),
                ColumnDefinition::new(&self.is_current, ColumnType::Boolean, false),
                ColumnDefinition::new(&self.modified, ColumnType::Timestamp, false),
            ],
            TableKind::Fact => vec![
                ColumnDefinition::new(&self.created, ColumnType::Timestamp, true),
                ColumnDefinition::new(&self.modified, ColumnType::Timestamp, true),
            ],
        }
    }

    /// Whether a column (any spelling) is one of the audit columns
    pub fn contains(&self, name: &str) -> bool {
        let canonical = normalize_column_name(name);
        [
            &self.valid_from,
            &self.valid_to,
            &self.is_current,
            &self.created,
            &self.modified,
        ]
        .iter()
        .any(|c| normalize_column_name(c) == canonical)
    }

    fn validate(&self) -> LoadResult<()> {
        let names = [
            &self.valid_from,
            &self.valid_to,
            &self.is_current,
            &self.created,
            &self.modified,
        ];
        let mut seen = HashSet::new();
        for name in names {
            validate_identifier(name, "audit column")?;
            if !seen.insert(normalize_column_name(name)) {
                return Err(LoadError::Configuration(format!(
                    "Audit column '{}' is configured twice",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Definition of one warehouse table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table name
    pub name: String,
    /// Dimension or fact
    pub kind: TableKind,
    /// Surrogate key column
    pub primary_key: String,
    /// Columns identifying a dimension entity
    #[serde(default)]
    pub business_keys: Vec<String>,
    /// Columns identifying a fact event
    #[serde(default)]
    pub unique_columns: Vec<String>,
    /// Column definitions
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,
    /// Fact key mappings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_mappings: Vec<KeyMapping>,
}

impl TableDefinition {
    /// Find a column by logical or physical name
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        let canonical = normalize_column_name(name);
        self.columns.iter().find(|c| c.physical_name() == canonical)
    }

    /// Whether the table defines a column (any spelling)
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Physical name of the primary key column
    pub fn physical_primary_key(&self) -> String {
        normalize_column_name(&self.primary_key)
    }

    /// Columns identifying a row: business keys for dimensions, unique
    /// columns for facts
    pub fn identity_columns(&self) -> &[String] {
        match self.kind {
            TableKind::Dimension => &self.business_keys,
            TableKind::Fact => &self.unique_columns,
        }
    }

    /// Append generated columns and check internal consistency
    fn complete(&mut self, audit: &AuditColumns) -> LoadResult<()> {
        validate_identifier(&self.name, "table")?;

        match self.column(&self.primary_key) {
            Some(col) if !matches!(col.column_type, ColumnType::Integer | ColumnType::BigInt) => {
                return Err(LoadError::Configuration(format!(
                    "Primary key '{}' of '{}' must be an integer column",
                    self.primary_key, self.name
                )));
            }
            Some(_) => {}
            None => self.columns.insert(
                0,
                ColumnDefinition::new(&self.primary_key, ColumnType::BigInt, false),
            ),
        }

        match self.kind {
            TableKind::Dimension => {
                if self.business_keys.is_empty() {
                    return Err(LoadError::Configuration(format!(
                        "Dimension '{}' declares no business keys",
                        self.name
                    )));
                }
                if !self.key_mappings.is_empty() {
                    return Err(LoadError::Configuration(format!(
                        "Key mappings are only valid on fact tables, found on '{}'",
                        self.name
                    )));
                }
            }
            TableKind::Fact => {
                if self.unique_columns.is_empty() {
                    return Err(LoadError::Configuration(format!(
                        "Fact '{}' declares no unique columns",
                        self.name
                    )));
                }
                let targets: Vec<String> = self
                    .key_mappings
                    .iter()
                    .map(|m| m.target_column.clone())
                    .collect();
                for target in targets {
                    if !self.has_column(&target) {
                        self.columns
                            .push(ColumnDefinition::new(target, ColumnType::BigInt, true));
                    }
                }
            }
        }

        for col in audit.columns_for(self.kind) {
            if !self.has_column(&col.name) {
                self.columns.push(col);
            }
        }

        let mut seen = HashSet::new();
        for col in &self.columns {
            validate_identifier(&col.name, "column")?;
            if !seen.insert(col.physical_name()) {
                return Err(LoadError::Configuration(format!(
                    "Columns of '{}' collide on the name '{}'",
                    self.name,
                    col.physical_name()
                )));
            }
        }

        for key in self.identity_columns() {
            if !self.has_column(key) {
                return Err(LoadError::Configuration(format!(
                    "Key column '{}' is not a column of '{}'",
                    key, self.name
                )));
            }
            if audit.contains(key) || normalize_column_name(key) == self.physical_primary_key() {
                return Err(LoadError::Configuration(format!(
                    "Key column '{}' of '{}' cannot be the primary key or an audit column",
                    key, self.name
                )));
            }
        }

        for mapping in &self.key_mappings {
            validate_identifier(&mapping.source_column, "source column")?;
            validate_identifier(&mapping.business_key, "business key")?;
            validate_identifier(&mapping.surrogate_key, "surrogate key")?;
        }

        Ok(())
    }
}

/// Schema file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaFile {
    /// Audit column naming
    #[serde(default)]
    pub audit: AuditColumns,
    /// Table definitions
    #[serde(default)]
    pub tables: Vec<TableDefinition>,
}

/// Validated set of table definitions
///
/// Remembers which tables it has already confirmed in the store, so
/// [`SchemaRegistry::ensure_table_exists`] only asks the store once per table.
#[derive(Debug)]
pub struct SchemaRegistry {
    audit: AuditColumns,
    tables: Vec<TableDefinition>,
    confirmed: Mutex<HashSet<String>>,
}

impl SchemaRegistry {
    /// Build a registry from table definitions
    pub fn new(audit: AuditColumns, tables: Vec<TableDefinition>) -> LoadResult<Self> {
        audit.validate()?;

        let mut completed: Vec<TableDefinition> = Vec::with_capacity(tables.len());
        for mut table in tables {
            if completed
                .iter()
                .any(|t| t.name.eq_ignore_ascii_case(&table.name))
            {
                return Err(LoadError::Configuration(format!(
                    "Table '{}' is defined twice",
                    table.name
                )));
            }
            table.complete(&audit)?;
            completed.push(table);
        }

        for table in &completed {
            for mapping in &table.key_mappings {
                let referenced = completed
                    .iter()
                    .find(|t| t.name.eq_ignore_ascii_case(&mapping.table))
                    .ok_or_else(|| {
                        LoadError::Configuration(format!(
                            "Table '{}' maps '{}' through unknown table '{}'",
                            table.name, mapping.source_column, mapping.table
                        ))
                    })?;
                for column in [&mapping.business_key, &mapping.surrogate_key] {
                    if !referenced.has_column(column) {
                        return Err(LoadError::Configuration(format!(
                            "Mapping of '{}' in '{}' references missing column '{}.{}'",
                            mapping.source_column, table.name, referenced.name, column
                        )));
                    }
                }
            }
        }

        debug!("Schema registry built with {} tables", completed.len());

        Ok(Self {
            audit,
            tables: completed,
            confirmed: Mutex::new(HashSet::new()),
        })
    }

    /// Parse a registry from TOML
    pub fn from_toml_str(content: &str) -> LoadResult<Self> {
        let file: SchemaFile = toml::from_str(content)
            .map_err(|e| LoadError::Configuration(format!("Failed to parse schema: {}", e)))?;
        Self::new(file.audit, file.tables)
    }

    /// Load a registry from a TOML file
    pub fn load(path: &Path) -> LoadResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LoadError::Configuration(format!(
                "Failed to read schema {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Registry for the bundled messaging-services warehouse
    pub fn sample() -> LoadResult<Self> {
        Self::from_toml_str(sample_schema())
    }

    /// Audit column naming
    pub fn audit(&self) -> &AuditColumns {
        &self.audit
    }

    /// Look up a table definition
    pub fn table(&self, name: &str) -> LoadResult<&TableDefinition> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| LoadError::Configuration(format!("Unknown table '{}'", name)))
    }

    /// Whether a table is defined
    pub fn contains(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// All tables in definition order
    pub fn tables(&self) -> &[TableDefinition] {
        &self.tables
    }

    /// Dimension tables in definition order
    pub fn dimensions(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.iter().filter(|t| t.kind == TableKind::Dimension)
    }

    /// Fact tables in definition order
    pub fn facts(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.iter().filter(|t| t.kind == TableKind::Fact)
    }

    /// Primary key column of a table
    pub fn primary_key(&self, table: &str) -> LoadResult<&str> {
        Ok(&self.table(table)?.primary_key)
    }

    /// Business key columns of a dimension
    pub fn business_keys(&self, table: &str) -> LoadResult<&[String]> {
        let def = self.table(table)?;
        match def.kind {
            TableKind::Dimension => Ok(&def.business_keys),
            TableKind::Fact => Err(LoadError::Configuration(format!(
                "'{}' is a fact table and has no business keys",
                def.name
            ))),
        }
    }

    /// Unique columns of a fact table
    pub fn unique_columns(&self, table: &str) -> LoadResult<&[String]> {
        let def = self.table(table)?;
        match def.kind {
            TableKind::Fact => Ok(&def.unique_columns),
            TableKind::Dimension => Err(LoadError::Configuration(format!(
                "'{}' is a dimension table and has no unique columns",
                def.name
            ))),
        }
    }

    /// DDL creating a table if it does not exist
    pub fn create_table_sql(&self, table: &str) -> LoadResult<String> {
        Ok(ddl::create_table_sql(self.table(table)?))
    }

    /// Create a table if the store does not have it yet
    ///
    /// After creating, waits `settle_delay` and polls until the table is
    /// visible, failing with [`LoadError::TransientStore`] if it never shows up.
    pub fn ensure_table_exists(
        &self,
        store: &dyn WarehouseStore,
        table: &str,
        settle_delay: Duration,
    ) -> LoadResult<()> {
        let def = self.table(table)?;
        if self.is_confirmed(&def.name) {
            return Ok(());
        }

        if !store.table_exists(&def.name)? {
            info!("Creating table {}", def.name);
            store.execute_ddl(&ddl::create_table_sql(def))?;
            wait_until_visible(store, &def.name, settle_delay)?;
        }

        if let Ok(mut confirmed) = self.confirmed.lock() {
            confirmed.insert(def.name.to_lowercase());
        }
        Ok(())
    }

    fn is_confirmed(&self, table: &str) -> bool {
        self.confirmed
            .lock()
            .map(|confirmed| confirmed.contains(&table.to_lowercase()))
            .unwrap_or(false)
    }
}

/// Wait for a freshly created table to become visible
pub(crate) fn wait_until_visible(
    store: &dyn WarehouseStore,
    table: &str,
    settle_delay: Duration,
) -> LoadResult<()> {
    for attempt in 1..=VISIBILITY_ATTEMPTS {
        std::thread::sleep(settle_delay);
        if store.table_exists(table)? {
            debug!("Table {} visible after {} check(s)", table, attempt);
            return Ok(());
        }
    }

    Err(LoadError::TransientStore(format!(
        "Table '{}' not visible after {} checks",
        table, VISIBILITY_ATTEMPTS
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COURIER_SCHEMA: &str = r#"
[[tables]]
name = "dim_courier"
kind = "dimension"
primary_key = "dk_courier"
business_keys = ["id_courier_bdo"]
columns = [
    { name = "id_courier_bdo", type = "text", nullable = false },
    { name = "name", type = "text" },
    { name = "salary", type = "double" },
]

[[tables]]
name = "fact_delivery"
kind = "fact"
primary_key = "sk_delivery"
unique_columns = ["id_delivery_bdo"]
columns = [
    { name = "id_delivery_bdo", type = "bigint", nullable = false },
]

[[tables.key_mappings]]
table = "dim_courier"
source_column = "id_courier_bdo"
business_key = "id_courier_bdo"
surrogate_key = "dk_courier"
target_column = "dk_courier"
"#;

    #[test]
    fn test_parse_and_complete_columns() {
        let registry = SchemaRegistry::from_toml_str(COURIER_SCHEMA).unwrap();
        let dim = registry.table("dim_courier").unwrap();

        assert_eq!(dim.columns[0].name, "dk_courier");
        assert!(dim.has_column("valid_from"));
        assert!(dim.has_column("Is_Current"));
        assert!(dim.has_column("updated_at"));

        let fact = registry.table("FACT_DELIVERY").unwrap();
        assert!(fact.has_column("dk_courier"));
        assert!(fact.has_column("created_at"));
        assert!(!fact.has_column("valid_to"));
    }

    #[test]
    fn test_key_lookups() {
        let registry = SchemaRegistry::from_toml_str(COURIER_SCHEMA).unwrap();
        assert_eq!(registry.primary_key("dim_courier").unwrap(), "dk_courier");
        assert_eq!(
            registry.business_keys("dim_courier").unwrap(),
            &["id_courier_bdo".to_string()]
        );
        assert_eq!(
            registry.unique_columns("fact_delivery").unwrap(),
            &["id_delivery_bdo".to_string()]
        );
        assert!(registry.business_keys("fact_delivery").is_err());
        assert!(matches!(
            registry.primary_key("dim_unknown"),
            Err(LoadError::Configuration(_))
        ));
        assert_eq!(registry.dimensions().count(), 1);
        assert_eq!(registry.facts().count(), 1);
    }

    #[test]
    fn test_rejects_invalid_identifier() {
        let schema = COURIER_SCHEMA.replace("{ name = \"name\"", "{ name = \"name; DROP\"");
        let err = SchemaRegistry::from_toml_str(&schema).unwrap_err();
        assert!(err.to_string().contains("Invalid column name"));
    }

    #[test]
    fn test_rejects_canonical_collision() {
        let schema = COURIER_SCHEMA.replace(
            "{ name = \"salary\", type = \"double\" },",
            "{ name = \"salary\", type = \"double\" },\n    { name = \"SALARY\", type = \"double\" },",
        );
        assert!(SchemaRegistry::from_toml_str(&schema).is_err());
    }

    #[test]
    fn test_rejects_unknown_mapping_table() {
        let schema = COURIER_SCHEMA.replace("table = \"dim_courier\"", "table = \"dim_missing\"");
        let err = SchemaRegistry::from_toml_str(&schema).unwrap_err();
        assert!(err.to_string().contains("dim_missing"));
    }

    #[test]
    fn test_dimension_requires_business_keys() {
        let schema = COURIER_SCHEMA.replace("business_keys = [\"id_courier_bdo\"]", "");
        assert!(SchemaRegistry::from_toml_str(&schema).is_err());
    }

    #[test]
    fn test_custom_audit_names() {
        let schema = format!(
            "[audit]\nis_current = \"flag_registro_actual\"\n{}",
            COURIER_SCHEMA
        );
        let registry = SchemaRegistry::from_toml_str(&schema).unwrap();
        let dim = registry.table("dim_courier").unwrap();
        assert!(dim.has_column("flag_registro_actual"));
        assert!(!dim.has_column("is_current"));
        assert!(registry.audit().contains("Flag_Registro_Actual"));
    }

    #[test]
    fn test_coerce_values() {
        assert_eq!(
            ColumnType::BigInt.coerce(&Value::Text(" 42 ".into())),
            Ok(Value::Int(42))
        );
        assert_eq!(ColumnType::BigInt.coerce(&Value::Float(7.0)), Ok(Value::Int(7)));
        assert!(ColumnType::BigInt.coerce(&Value::Float(7.5)).is_err());
        assert!(ColumnType::Integer.coerce(&Value::Int(i64::MAX)).is_err());
        assert_eq!(ColumnType::Double.coerce(&Value::Int(10)), Ok(Value::Float(10.0)));
        assert_eq!(ColumnType::Text.coerce(&Value::Int(7)), Ok(Value::Text("7".into())));
        assert_eq!(
            ColumnType::Boolean.coerce(&Value::Text("Yes".into())),
            Ok(Value::Bool(true))
        );
        assert!(ColumnType::Boolean.coerce(&Value::Text("maybe".into())).is_err());
        assert_eq!(ColumnType::Double.coerce(&Value::Null), Ok(Value::Null));
    }

    #[test]
    fn test_coerce_timestamps() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        for input in ["2024-03-01 08:30:00", "2024-03-01T08:30:00", "2024-03-01T08:30:00Z"] {
            assert_eq!(
                ColumnType::Timestamp.coerce(&Value::Text(input.into())),
                Ok(Value::Timestamp(expected)),
                "{}",
                input
            );
        }
        assert!(ColumnType::Timestamp.coerce(&Value::Text("yesterday".into())).is_err());
    }

    #[test]
    fn test_sample_schema_is_valid() {
        let registry = SchemaRegistry::sample().unwrap();
        assert_eq!(registry.dimensions().count(), 12);
        assert_eq!(registry.facts().count(), 3);
    }

    #[cfg(feature = "duckdb-backend")]
    #[test]
    fn test_ensure_table_exists_creates_once() {
        let store = crate::store::DuckDbStore::in_memory().unwrap();
        let registry = SchemaRegistry::from_toml_str(COURIER_SCHEMA).unwrap();

        assert!(!store.table_exists("dim_courier").unwrap());
        registry
            .ensure_table_exists(&store, "dim_courier", Duration::ZERO)
            .unwrap();
        assert!(store.table_exists("dim_courier").unwrap());
        assert!(registry.is_confirmed("DIM_COURIER"));

        registry
            .ensure_table_exists(&store, "DIM_COURIER", Duration::ZERO)
            .unwrap();
        assert!(
            registry
                .ensure_table_exists(&store, "dim_unknown", Duration::ZERO)
                .is_err()
        );
    }
}
