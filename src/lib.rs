//! Warehouse Loader - star-schema loads with SCD Type 2 history
//!
//! Provides:
//! - Typed tabular batches and the canonical column naming
//! - A schema registry of dimension and fact definitions
//! - SCD Type 2 dimension loads, fact key resolution and deduplicated fact loads
//! - A load orchestrator with an append-only audit log
//! - A warehouse store abstraction with a DuckDB backend

pub mod batch;
pub mod config;
pub mod error;
pub mod load;
pub mod schema;
pub mod store;

// Re-export commonly used types
pub use batch::{Batch, Value, normalize_column_name};
pub use config::{LoaderConfig, sample_config};
pub use error::{LoadError, LoadResult};
pub use load::{
    Clock, DimensionLoader, FactKeyResolver, FactLoader, FixedClock, LoadContext, LoadFailure,
    LoadOrchestrator, LoadPlan, LoadSettings, LoadSummary, MissingKeyPolicy, RowIssue,
    SystemClock, TableBatch, TableLoadResult, TableStrategy,
};
pub use schema::{
    AuditColumns, ColumnDefinition, ColumnType, KeyMapping, SchemaRegistry, TableDefinition,
    TableKind,
};
#[cfg(feature = "duckdb-backend")]
pub use store::DuckDbStore;
pub use store::{QueryResult, StoreError, StoreResult, StoreTransaction, WarehouseStore};
