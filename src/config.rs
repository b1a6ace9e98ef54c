//! Loader configuration file support
//!
//! Handles parsing of `.warehouse-loader.toml` configuration files and
//! environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::load::{LoadSettings, MissingKeyPolicy};
use crate::schema::ddl::DEFAULT_AUDIT_TABLE;
use crate::error::{LoadError, LoadResult};
use crate::store::StoreBackendType;

/// Default database filename for DuckDB
pub const DEFAULT_DUCKDB_FILENAME: &str = ".warehouse.duckdb";

/// Default configuration filename
pub const CONFIG_FILENAME: &str = ".warehouse-loader.toml";

/// Environment variable for the DuckDB path
pub const ENV_DB_PATH: &str = "WAREHOUSE_DB_PATH";

/// Environment variable for the schema file path
pub const ENV_SCHEMA_PATH: &str = "WAREHOUSE_SCHEMA_PATH";

/// Environment variable for the audit table name
pub const ENV_AUDIT_TABLE: &str = "WAREHOUSE_AUDIT_TABLE";

/// Environment variable for the table settle delay
pub const ENV_SETTLE_DELAY_MS: &str = "WAREHOUSE_SETTLE_DELAY_MS";

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Warehouse backend type
    #[serde(default)]
    pub backend: StoreBackendType,

    /// Path to DuckDB database file (relative to workspace)
    #[serde(default = "default_duckdb_path")]
    pub path: String,
}

fn default_duckdb_path() -> String {
    DEFAULT_DUCKDB_FILENAME.to_string()
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            backend: StoreBackendType::default(),
            path: default_duckdb_path(),
        }
    }
}

/// Schema configuration section
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchemaSection {
    /// Table definitions file; the bundled sample schema when unset
    #[serde(default)]
    pub path: Option<String>,
}

/// Load configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadSection {
    /// Wait after creating a table, in milliseconds
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Handling of dimension rows without business key values
    #[serde(default)]
    pub missing_business_key: MissingKeyPolicy,

    /// Run audit table
    #[serde(default = "default_audit_table")]
    pub audit_table: String,
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_audit_table() -> String {
    DEFAULT_AUDIT_TABLE.to_string()
}

impl Default for LoadSection {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            missing_business_key: MissingKeyPolicy::default(),
            audit_table: default_audit_table(),
        }
    }
}

/// Main configuration structure
///
/// Represents the `.warehouse-loader.toml` configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoaderConfig {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseSection,

    /// Schema configuration
    #[serde(default)]
    pub schema: SchemaSection,

    /// Load configuration
    #[serde(default)]
    pub load: LoadSection,
}

impl LoaderConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a DuckDB configuration
    pub fn duckdb(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseSection {
                backend: StoreBackendType::DuckDB,
                path: path.into(),
            },
            ..Default::default()
        }
    }

    /// Load configuration from a workspace directory
    ///
    /// Looks for `.warehouse-loader.toml` in the workspace directory.
    /// Falls back to defaults if not found.
    pub fn load(workspace_path: &Path) -> LoadResult<Self> {
        let config_path = workspace_path.join(CONFIG_FILENAME);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| LoadError::Configuration(format!("Failed to read config: {}", e)))?;

            Self::parse(&content)?
        } else {
            Self::default()
        };

        // Apply environment variable overrides
        config.apply_env_overrides();

        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> LoadResult<Self> {
        toml::from_str(content)
            .map_err(|e| LoadError::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to a workspace directory
    pub fn save(&self, workspace_path: &Path) -> LoadResult<()> {
        let config_path = workspace_path.join(CONFIG_FILENAME);
        let content = self.to_toml()?;

        std::fs::write(&config_path, content)
            .map_err(|e| LoadError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> LoadResult<String> {
        toml::to_string_pretty(self).map_err(|e| {
            LoadError::Configuration(format!("Failed to serialize config: {}", e))
        })
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.database.path = path;
        }

        if let Some(path) = lookup(ENV_SCHEMA_PATH) {
            self.schema.path = Some(path);
        }

        if let Some(table) = lookup(ENV_AUDIT_TABLE) {
            self.load.audit_table = table;
        }

        // Unparseable values keep the configured delay
        if let Some(delay) = lookup(ENV_SETTLE_DELAY_MS)
            && let Ok(delay) = delay.parse()
        {
            self.load.settle_delay_ms = delay;
        }
    }

    /// Get the DuckDB database path for a workspace
    pub fn get_duckdb_path(&self, workspace_path: &Path) -> PathBuf {
        resolve_path(workspace_path, &self.database.path, DEFAULT_DUCKDB_FILENAME)
    }

    /// Get the schema file path for a workspace, if one is configured
    pub fn get_schema_path(&self, workspace_path: &Path) -> Option<PathBuf> {
        self.schema
            .path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| resolve_path(workspace_path, p, p))
    }

    /// Load settings described by this configuration
    pub fn load_settings(&self) -> LoadSettings {
        LoadSettings {
            settle_delay: Duration::from_millis(self.load.settle_delay_ms),
            missing_key_policy: self.load.missing_business_key,
            audit_table: self.load.audit_table.clone(),
        }
    }

    /// Check if configuration exists in a workspace
    pub fn exists(workspace_path: &Path) -> bool {
        workspace_path.join(CONFIG_FILENAME).exists()
    }
}

fn resolve_path(workspace_path: &Path, path: &str, fallback: &str) -> PathBuf {
    if path.is_empty() {
        workspace_path.join(fallback)
    } else if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        workspace_path.join(path)
    }
}

/// Generate a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# Warehouse Loader Configuration
# This file configures the warehouse and load behaviour.

[database]
# Warehouse backend: "duckdb"
backend = "duckdb"

# Path to DuckDB database file (relative to workspace, or absolute)
path = ".warehouse.duckdb"

[schema]
# Table definitions (TOML). Uses the bundled messaging-services schema when unset.
# path = "warehouse-schema.toml"

[load]
# Wait after creating a table before writing to it, in milliseconds
settle_delay_ms = 500

# Dimension rows without business key values: "reject", "fail" or "insert_as_new"
missing_business_key = "reject"

# Table receiving one audit row per run
audit_table = "etl_tracking"
"#
}
