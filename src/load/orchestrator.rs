//! Load orchestration
//!
//! A run resolves every input batch to a [`TableStrategy`] up front, loads all
//! dimensions before any fact, and appends one row to the audit table. Each
//! table commits on its own; a failure stops the run and reports how far it
//! got.

use std::time::Instant;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{DimensionLoader, FactKeyResolver, FactLoader, LoadContext, TableLoadResult};
use crate::batch::{Batch, Value};
use crate::error::{LoadError, LoadResult};
use crate::schema::ddl::{create_audit_table_sql, insert_audit_row_sql};
use crate::schema::{TableKind, is_valid_identifier, wait_until_visible};

/// Audit status of a completed run
pub const STATUS_SUCCESS: &str = "Success";

/// Audit status of a failed run
pub const STATUS_FAILED: &str = "Failed";

/// How a table's batch is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStrategy {
    /// SCD Type 2 upsert
    Dimension,
    /// Key resolution, then deduplicated insert
    Fact,
}

impl From<TableKind> for TableStrategy {
    fn from(kind: TableKind) -> Self {
        match kind {
            TableKind::Dimension => TableStrategy::Dimension,
            TableKind::Fact => TableStrategy::Fact,
        }
    }
}

/// A batch destined for a table
#[derive(Debug, Clone)]
pub struct TableBatch {
    /// Target table
    pub table: String,
    /// Rows to load
    pub batch: Batch,
}

impl TableBatch {
    /// Pair a batch with its table
    pub fn new(table: impl Into<String>, batch: Batch) -> Self {
        Self {
            table: table.into(),
            batch,
        }
    }
}

/// One planned table load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLoad {
    /// Registry name of the table
    pub table: String,
    /// Load strategy
    pub strategy: TableStrategy,
    /// Position of the batch in the run input
    pub input: usize,
}

/// Ordered table loads for a run
#[derive(Debug, Clone, Default)]
pub struct LoadPlan {
    steps: Vec<PlannedLoad>,
}

impl LoadPlan {
    /// Plan a run: dimensions first, then facts, each in input order
    ///
    /// Fails on a table the registry does not know. Empty batches are left
    /// out.
    pub fn build(ctx: &LoadContext<'_>, batches: &[TableBatch]) -> LoadResult<Self> {
        let mut dimensions = Vec::new();
        let mut facts = Vec::new();

        for (input, item) in batches.iter().enumerate() {
            let def = ctx.registry.table(&item.table)?;
            if item.batch.is_empty() {
                info!("Skipping empty batch for {}", def.name);
                continue;
            }
            let step = PlannedLoad {
                table: def.name.clone(),
                strategy: def.kind.into(),
                input,
            };
            match step.strategy {
                TableStrategy::Dimension => dimensions.push(step),
                TableStrategy::Fact => facts.push(step),
            }
        }

        dimensions.extend(facts);
        Ok(Self { steps: dimensions })
    }

    /// Planned loads in execution order
    pub fn steps(&self) -> &[PlannedLoad] {
        &self.steps
    }

    /// Number of planned loads
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if nothing is planned
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Statistics of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    /// Run identifier, also the audit row id
    pub run_id: Uuid,
    /// Tables committed
    pub tables_loaded: usize,
    /// Rows inserted
    pub rows_loaded: usize,
    /// Dimension rows versioned
    pub rows_updated: usize,
    /// Rows unchanged, duplicated or rejected
    pub rows_skipped: usize,
    /// Per-table results, in load order
    pub tables: Vec<TableLoadResult>,
    /// Wall time of the run
    pub duration_ms: u64,
}

impl LoadSummary {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            tables_loaded: 0,
            rows_loaded: 0,
            rows_updated: 0,
            rows_skipped: 0,
            tables: Vec::new(),
            duration_ms: 0,
        }
    }

    fn record(&mut self, table: TableLoadResult) {
        self.tables_loaded += 1;
        self.rows_loaded += table.rows_loaded;
        self.rows_updated += table.rows_updated;
        self.rows_skipped += table.rows_skipped;
        self.tables.push(table);
    }

    /// Names of committed tables, in load order
    pub fn completed_tables(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.table.as_str()).collect()
    }

    /// Free-text audit details
    pub fn details(&self) -> String {
        format!(
            "Loaded {} tables: {} rows loaded, {} updated, {} skipped",
            self.tables_loaded, self.rows_loaded, self.rows_updated, self.rows_skipped
        )
    }
}

/// A run that stopped before completing
///
/// Tables in `summary` were committed; `table` is the load that failed, or
/// `None` when the run failed while planning.
#[derive(Debug, thiserror::Error)]
#[error("Load failed at '{}': {error}", .table.as_deref().unwrap_or("plan"))]
pub struct LoadFailure {
    /// Progress up to the failure
    pub summary: LoadSummary,
    /// Table being loaded when the run failed
    pub table: Option<String>,
    /// The error that stopped the run
    #[source]
    pub error: LoadError,
}

/// Runs dimension and fact loads for a set of batches
pub struct LoadOrchestrator<'a> {
    ctx: &'a LoadContext<'a>,
}

impl<'a> LoadOrchestrator<'a> {
    /// Create an orchestrator over a context
    pub fn new(ctx: &'a LoadContext<'a>) -> Self {
        Self { ctx }
    }

    /// Load a set of batches
    ///
    /// Nothing is written when planning fails. Otherwise the audit table gets
    /// one row, whether the run succeeds or not.
    pub fn run(&self, batches: &[TableBatch]) -> Result<LoadSummary, LoadFailure> {
        let started = Instant::now();
        let execution_time = self.ctx.now();
        let mut summary = LoadSummary::new(Uuid::new_v4());

        let plan = match self.plan(batches) {
            Ok(plan) => plan,
            Err(error) => {
                error!("Load planning failed: {}", error);
                return Err(LoadFailure {
                    summary,
                    table: None,
                    error,
                });
            }
        };

        info!("Run {} starting with {} table loads", summary.run_id, plan.len());

        for step in plan.steps() {
            let batch = &batches[step.input].batch;
            match self.load_table(step, batch) {
                Ok(result) => summary.record(result),
                Err(error) => {
                    summary.duration_ms = started.elapsed().as_millis() as u64;
                    error!("Loading {} failed: {}", step.table, error);

                    let details = format!(
                        "{}; failed at {}: {}",
                        summary.details(),
                        step.table,
                        error
                    );
                    if let Err(audit_error) =
                        self.write_audit(&summary, execution_time, STATUS_FAILED, &details)
                    {
                        warn!("Could not record failed run: {}", audit_error);
                    }

                    return Err(LoadFailure {
                        summary,
                        table: Some(step.table.clone()),
                        error,
                    });
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        if let Err(error) =
            self.write_audit(&summary, execution_time, STATUS_SUCCESS, &summary.details())
        {
            return Err(LoadFailure {
                table: Some(self.ctx.settings.audit_table.clone()),
                summary,
                error,
            });
        }

        info!(
            "Run {} finished in {} ms: {}",
            summary.run_id,
            summary.duration_ms,
            summary.details()
        );
        Ok(summary)
    }

    fn plan(&self, batches: &[TableBatch]) -> LoadResult<LoadPlan> {
        if !is_valid_identifier(&self.ctx.settings.audit_table) {
            return Err(LoadError::Configuration(format!(
                "Invalid audit table name '{}'",
                self.ctx.settings.audit_table
            )));
        }
        LoadPlan::build(self.ctx, batches)
    }

    fn load_table(&self, step: &PlannedLoad, batch: &Batch) -> LoadResult<TableLoadResult> {
        self.ctx.registry.ensure_table_exists(
            self.ctx.store,
            &step.table,
            self.ctx.settings.settle_delay,
        )?;

        match step.strategy {
            TableStrategy::Dimension => DimensionLoader::new(self.ctx).load(&step.table, batch),
            TableStrategy::Fact => {
                let resolved = FactKeyResolver::new(self.ctx).resolve(&step.table, batch)?;
                FactLoader::new(self.ctx).load(&step.table, &resolved)
            }
        }
    }

    /// Append the run's row to the audit table, creating it if needed
    fn write_audit(
        &self,
        summary: &LoadSummary,
        execution_time: NaiveDateTime,
        status: &str,
        details: &str,
    ) -> LoadResult<()> {
        let table = &self.ctx.settings.audit_table;
        let store = self.ctx.store;

        if !store.table_exists(table)? {
            info!("Creating audit table {}", table);
            store.execute_ddl(&create_audit_table_sql(table))?;
            wait_until_visible(store, table, self.ctx.settings.settle_delay)?;
        }

        let mut tx = store.begin()?;
        tx.execute(
            &insert_audit_row_sql(table),
            &[
                Value::Text(summary.run_id.to_string()),
                Value::Timestamp(execution_time),
                Value::Int(summary.tables_loaded as i64),
                Value::Int(summary.rows_loaded as i64),
                Value::Text(status.to_string()),
                Value::Text(details.to_string()),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }
}
