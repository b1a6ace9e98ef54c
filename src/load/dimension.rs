//! SCD Type 2 dimension loader
//!
//! Each batch is applied inside one transaction. The current version of every
//! business key is read once into an in-memory index; rows then either insert
//! a new entity, version an existing one (expire + insert), or are skipped
//! when nothing changed.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use super::{
    LoadContext, MAX_VALID_TO, MissingKeyPolicy, PreparedBatch, PreparedRow, TableLoadResult,
    definition_positions, definition_row, insert_sql, next_surrogate_key, select_columns_sql,
    stored_key,
};
use crate::batch::{Batch, Value, normalize_column_name};
use crate::error::{LoadError, LoadResult};
use crate::schema::{TableDefinition, TableKind};
use crate::store::{StoreTransaction, quote_ident};

/// Current version of a dimension entity, aligned with the table's columns
struct CurrentVersion {
    surrogate_key: i64,
    values: Vec<Value>,
}

/// Physical names of the columns the loader maintains
struct DimensionColumns {
    primary_key: String,
    valid_from: String,
    valid_to: String,
    is_current: String,
    created: String,
    modified: String,
}

impl DimensionColumns {
    fn new(ctx: &LoadContext<'_>, table: &TableDefinition) -> Self {
        let audit = ctx.registry.audit();
        Self {
            primary_key: table.physical_primary_key(),
            valid_from: normalize_column_name(&audit.valid_from),
            valid_to: normalize_column_name(&audit.valid_to),
            is_current: normalize_column_name(&audit.is_current),
            created: normalize_column_name(&audit.created),
            modified: normalize_column_name(&audit.modified),
        }
    }

    fn is_maintained(&self, physical: &str) -> bool {
        [
            &self.primary_key,
            &self.valid_from,
            &self.valid_to,
            &self.is_current,
            &self.created,
            &self.modified,
        ]
        .iter()
        .any(|c| c.as_str() == physical)
    }
}

/// Loads dimension batches with SCD Type 2 history
pub struct DimensionLoader<'a> {
    ctx: &'a LoadContext<'a>,
}

impl<'a> DimensionLoader<'a> {
    /// Create a loader over a context
    pub fn new(ctx: &'a LoadContext<'a>) -> Self {
        Self { ctx }
    }

    /// Upsert a batch into a dimension table
    ///
    /// The table must already exist. Any error rolls back the whole batch.
    pub fn load(&self, table: &str, batch: &Batch) -> LoadResult<TableLoadResult> {
        let def = self.ctx.table_of_kind(table, TableKind::Dimension)?;
        let mut result = TableLoadResult::new(&def.name, TableKind::Dimension);
        if batch.is_empty() {
            return Ok(result);
        }

        let prepared = PreparedBatch::prepare(def, self.ctx.registry, batch, &mut result)?;
        let columns = DimensionColumns::new(self.ctx, def);
        let now = self.ctx.now();

        let key_positions: Vec<Option<usize>> = def
            .business_keys
            .iter()
            .map(|k| prepared.position(&normalize_column_name(k)))
            .collect();
        let stored_positions = definition_positions(def, &def.business_keys)?;
        let required_keys: Vec<bool> = def
            .business_keys
            .iter()
            .map(|k| def.column(k).is_some_and(|c| !c.nullable))
            .collect();

        let mut tx = self.ctx.store.begin()?;
        let mut index = self.current_versions(tx.as_mut(), def, &columns, &stored_positions)?;
        let mut next_key = next_surrogate_key(tx.as_mut(), def)?;

        for row in &prepared.rows {
            let key = prepared.key_of(row, &key_positions);

            if key.iter().all(Option::is_none) {
                match self.ctx.settings.missing_key_policy {
                    MissingKeyPolicy::Reject => {
                        result.reject(
                            row.index,
                            LoadError::UnresolvedBusinessKey {
                                table: def.name.clone(),
                                row: row.index,
                                keys: def.business_keys.join(", "),
                            }
                            .to_string(),
                        );
                        continue;
                    }
                    MissingKeyPolicy::Fail => {
                        return Err(LoadError::UnresolvedBusinessKey {
                            table: def.name.clone(),
                            row: row.index,
                            keys: def.business_keys.join(", "),
                        });
                    }
                    MissingKeyPolicy::InsertAsNew => {
                        if let Some(required) = required_keys.iter().position(|r| *r) {
                            return Err(LoadError::Configuration(format!(
                                "Row {} of '{}' has no business key, but '{}' is NOT NULL",
                                row.index, def.name, def.business_keys[required]
                            )));
                        }
                        warn!(
                            "Row {} of {} has no business key, inserting as a new entity",
                            row.index, def.name
                        );
                        let values = new_version(def, &columns, &prepared, row, None, next_key, now);
                        tx.execute(&insert_sql(def), &values)?;
                        next_key += 1;
                        result.rows_loaded += 1;
                        continue;
                    }
                }
            }

            if let Some(missing) = key
                .iter()
                .zip(&required_keys)
                .position(|(value, required)| value.is_none() && *required)
            {
                result.reject(
                    row.index,
                    format!("business key {} must not be null", def.business_keys[missing]),
                );
                continue;
            }

            match index.get(&key) {
                None => {
                    let values = new_version(def, &columns, &prepared, row, None, next_key, now);
                    tx.execute(&insert_sql(def), &values)?;
                    index.insert(
                        key,
                        CurrentVersion {
                            surrogate_key: next_key,
                            values,
                        },
                    );
                    next_key += 1;
                    result.rows_loaded += 1;
                }
                Some(current) if has_changes(def, &columns, &prepared, row, current) => {
                    self.expire(tx.as_mut(), def, &columns, current.surrogate_key, now)?;
                    let values =
                        new_version(def, &columns, &prepared, row, Some(current), next_key, now);
                    tx.execute(&insert_sql(def), &values)?;
                    debug!(
                        "Versioned {} key {:?}: {} -> {}",
                        def.name, key, current.surrogate_key, next_key
                    );
                    index.insert(
                        key,
                        CurrentVersion {
                            surrogate_key: next_key,
                            values,
                        },
                    );
                    next_key += 1;
                    result.rows_updated += 1;
                }
                Some(_) => {
                    result.rows_skipped += 1;
                }
            }
        }

        tx.commit()?;

        info!(
            "Loaded dimension {}: {} inserted, {} updated, {} skipped",
            def.name, result.rows_loaded, result.rows_updated, result.rows_skipped
        );
        Ok(result)
    }

    /// Index of current versions by business key
    fn current_versions(
        &self,
        tx: &mut dyn StoreTransaction,
        def: &TableDefinition,
        columns: &DimensionColumns,
        key_positions: &[usize],
    ) -> LoadResult<HashMap<Vec<Option<String>>, CurrentVersion>> {
        let filter = format!("{} = TRUE", quote_ident(&columns.is_current));
        let rows = tx.query(&select_columns_sql(def, Some(&filter)), &[])?.rows;
        let pk_position = definition_positions(def, std::slice::from_ref(&def.primary_key))?[0];

        let mut index = HashMap::with_capacity(rows.len());
        for values in rows {
            let key = stored_key(&values, key_positions);
            if key.iter().all(Option::is_none) {
                continue;
            }
            let surrogate_key = match values[pk_position] {
                Value::Int(k) => k,
                ref other => {
                    return Err(LoadError::IntegrityViolation(format!(
                        "Surrogate key {:?} in '{}' is not an integer",
                        other, def.name
                    )));
                }
            };
            if let Some(existing) = index.insert(
                key.clone(),
                CurrentVersion {
                    surrogate_key,
                    values,
                },
            ) {
                return Err(LoadError::IntegrityViolation(format!(
                    "'{}' has two current rows ({} and {}) for business key {:?}",
                    def.name, existing.surrogate_key, surrogate_key, key
                )));
            }
        }

        debug!("Indexed {} current versions of {}", index.len(), def.name);
        Ok(index)
    }

    /// Close the validity of the current version
    fn expire(
        &self,
        tx: &mut dyn StoreTransaction,
        def: &TableDefinition,
        columns: &DimensionColumns,
        surrogate_key: i64,
        now: NaiveDateTime,
    ) -> LoadResult<()> {
        let sql = format!(
            "UPDATE {} SET {} = ?, {} = FALSE, {} = ? WHERE {} = ? AND {} = TRUE",
            quote_ident(&def.name),
            quote_ident(&columns.valid_to),
            quote_ident(&columns.is_current),
            quote_ident(&columns.modified),
            quote_ident(&columns.primary_key),
            quote_ident(&columns.is_current),
        );
        let updated = tx.execute(
            &sql,
            &[
                Value::Timestamp(now),
                Value::Timestamp(now),
                Value::Int(surrogate_key),
            ],
        )?;

        if updated != 1 {
            return Err(LoadError::IntegrityViolation(format!(
                "Expiring {} row {} touched {} rows",
                def.name, surrogate_key, updated
            )));
        }
        Ok(())
    }
}

/// Whether any supplied attribute differs from the current version
fn has_changes(
    def: &TableDefinition,
    columns: &DimensionColumns,
    prepared: &PreparedBatch,
    row: &PreparedRow,
    current: &CurrentVersion,
) -> bool {
    let keys: Vec<String> = def
        .business_keys
        .iter()
        .map(|k| normalize_column_name(k))
        .collect();

    prepared
        .columns
        .iter()
        .zip(&row.values)
        .filter(|(name, _)| !keys.contains(*name) && !columns.is_maintained(name))
        .any(|(name, value)| {
            let stored = def
                .columns
                .iter()
                .position(|c| c.physical_name() == *name)
                .map(|p| &current.values[p])
                .unwrap_or(&Value::Null);
            !value.same_as(stored)
        })
}

/// Row values for a new version
///
/// Attributes the row does not supply are carried forward from `previous`.
fn new_version(
    def: &TableDefinition,
    columns: &DimensionColumns,
    prepared: &PreparedBatch,
    row: &PreparedRow,
    previous: Option<&CurrentVersion>,
    surrogate_key: i64,
    now: NaiveDateTime,
) -> Vec<Value> {
    let mut named: HashMap<String, Value> = match previous {
        Some(prev) => def
            .columns
            .iter()
            .zip(&prev.values)
            .map(|(c, v)| (c.physical_name(), v.clone()))
            .collect(),
        None => HashMap::new(),
    };

    for (name, value) in prepared.columns.iter().zip(&row.values) {
        if *name == columns.created && value.is_null() {
            continue;
        }
        named.insert(name.clone(), value.clone());
    }

    named.insert(columns.primary_key.clone(), Value::Int(surrogate_key));
    named.insert(columns.valid_from.clone(), Value::Timestamp(now));
    named.insert(columns.valid_to.clone(), Value::Timestamp(*MAX_VALID_TO));
    named.insert(columns.is_current.clone(), Value::Bool(true));
    named.insert(columns.modified.clone(), Value::Timestamp(now));
    if named.get(&columns.created).is_none_or(Value::is_null) {
        named.insert(columns.created.clone(), Value::Timestamp(now));
    }

    definition_row(def, &named)
}
