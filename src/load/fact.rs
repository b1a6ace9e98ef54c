//! Append-only fact loader
//!
//! Facts are deduplicated on the table's unique columns and never updated.
//! Existing unique tuples are read once per batch; new tuples are added to the
//! same set so duplicates within a batch are skipped too.

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use super::{
    LoadContext, PreparedBatch, TableLoadResult, definition_row, insert_sql, next_surrogate_key,
};
use crate::batch::{Batch, Value, normalize_column_name};
use crate::error::LoadResult;
use crate::schema::{TableDefinition, TableKind};
use crate::store::{StoreTransaction, quote_ident};

/// Loads resolved fact batches
pub struct FactLoader<'a> {
    ctx: &'a LoadContext<'a>,
}

impl<'a> FactLoader<'a> {
    /// Create a loader over a context
    pub fn new(ctx: &'a LoadContext<'a>) -> Self {
        Self { ctx }
    }

    /// Insert the rows of a resolved batch that are not already present
    ///
    /// The batch must carry surrogate keys, not business keys; see
    /// [`FactKeyResolver`](super::FactKeyResolver). The table must already
    /// exist. Any error rolls back the whole batch.
    pub fn load(&self, table: &str, batch: &Batch) -> LoadResult<TableLoadResult> {
        let def = self.ctx.table_of_kind(table, TableKind::Fact)?;
        let mut result = TableLoadResult::new(&def.name, TableKind::Fact);
        if batch.is_empty() {
            return Ok(result);
        }

        let prepared = PreparedBatch::prepare(def, self.ctx.registry, batch, &mut result)?;
        let audit = self.ctx.registry.audit();
        let created = normalize_column_name(&audit.created);
        let modified = normalize_column_name(&audit.modified);
        let primary_key = def.physical_primary_key();
        let now = self.ctx.now();

        let unique_positions: Vec<Option<usize>> = def
            .unique_columns
            .iter()
            .map(|c| prepared.position(&normalize_column_name(c)))
            .collect();

        let mut tx = self.ctx.store.begin()?;
        let mut existing = existing_tuples(tx.as_mut(), def)?;
        let mut next_key = next_surrogate_key(tx.as_mut(), def)?;
        let insert = insert_sql(def);

        for row in &prepared.rows {
            let tuple = prepared.key_of(row, &unique_positions);
            let dedupable = tuple.iter().any(Option::is_some);

            if !dedupable {
                warn!(
                    "Row {} of {} has no unique column values, inserting without deduplication",
                    row.index, def.name
                );
            } else if existing.contains(&tuple) {
                result.rows_skipped += 1;
                continue;
            }

            let mut named: HashMap<String, Value> = prepared
                .columns
                .iter()
                .cloned()
                .zip(row.values.iter().cloned())
                .collect();
            named.insert(primary_key.clone(), Value::Int(next_key));
            named.insert(modified.clone(), Value::Timestamp(now));
            if named.get(&created).is_none_or(Value::is_null) {
                named.insert(created.clone(), Value::Timestamp(now));
            }

            tx.execute(&insert, &definition_row(def, &named))?;
            next_key += 1;
            result.rows_loaded += 1;
            if dedupable {
                existing.insert(tuple);
            }
        }

        tx.commit()?;

        info!(
            "Loaded fact {}: {} inserted, {} skipped",
            def.name, result.rows_loaded, result.rows_skipped
        );
        Ok(result)
    }
}

/// Unique-column tuples already stored in a fact table
fn existing_tuples(
    tx: &mut dyn StoreTransaction,
    def: &TableDefinition,
) -> LoadResult<HashSet<Vec<Option<String>>>> {
    let columns: Vec<String> = def
        .unique_columns
        .iter()
        .map(|c| quote_ident(&normalize_column_name(c)))
        .collect();
    let sql = format!(
        "SELECT DISTINCT {} FROM {}",
        columns.join(", "),
        quote_ident(&def.name)
    );

    Ok(tx
        .query(&sql, &[])?
        .rows
        .iter()
        .map(|values| values.iter().map(Value::join_key).collect())
        .filter(|tuple: &Vec<Option<String>>| tuple.iter().any(Option::is_some))
        .collect())
}
