//! Fact key resolution
//!
//! Replaces business keys in a fact batch with surrogate keys from referenced
//! tables. Each referenced projection (business key -> surrogate key) is read
//! once per batch and shared by every mapping that uses it, which is how
//! role-playing joins (three courier roles, origin and destination address)
//! resolve against a single dimension.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use super::LoadContext;
use crate::batch::{Batch, Value, normalize_column_name};
use crate::error::{LoadError, LoadResult};
use crate::schema::{KeyMapping, TableDefinition, TableKind};
use crate::store::quote_ident;

/// Business key join string -> surrogate key
type Projection = HashMap<String, i64>;

/// (table, business key, surrogate key), all canonical
type ProjectionId = (String, String, String);

/// Resolves fact business keys to surrogate keys
pub struct FactKeyResolver<'a> {
    ctx: &'a LoadContext<'a>,
}

impl<'a> FactKeyResolver<'a> {
    /// Create a resolver over a context
    pub fn new(ctx: &'a LoadContext<'a>) -> Self {
        Self { ctx }
    }

    /// Resolve the key mappings of `table` against `batch`
    ///
    /// Mappings whose source column is absent are skipped. Source columns are
    /// removed and target columns appended; unmatched or missing business keys
    /// resolve to [`Value::Null`].
    pub fn resolve(&self, table: &str, batch: &Batch) -> LoadResult<Batch> {
        let def = self.ctx.table_of_kind(table, TableKind::Fact)?;

        let mappings: Vec<(&KeyMapping, usize)> = def
            .key_mappings
            .iter()
            .filter_map(|m| batch.column_index(&m.source_column).map(|idx| (m, idx)))
            .collect();
        if mappings.is_empty() {
            return Ok(batch.clone());
        }

        let mut projections: HashMap<ProjectionId, Projection> = HashMap::new();
        for (mapping, _) in &mappings {
            let id = projection_id(mapping);
            if !projections.contains_key(&id) {
                let projection = self.projection(def, mapping)?;
                projections.insert(id, projection);
            }
        }

        let mut resolved_columns = Vec::with_capacity(mappings.len());
        for (mapping, idx) in &mappings {
            let projection = &projections[&projection_id(mapping)];
            let mut unmatched = 0usize;
            let values: Vec<Value> = batch
                .rows()
                .iter()
                .map(|row| {
                    let Some(key) = row[*idx].join_key() else {
                        return Value::Null;
                    };
                    let key = match &mapping.role_prefix {
                        Some(prefix) => format!("{}{}", prefix, key),
                        None => key,
                    };
                    match projection.get(&key) {
                        Some(surrogate) => Value::Int(*surrogate),
                        None => {
                            unmatched += 1;
                            Value::Null
                        }
                    }
                })
                .collect();

            if unmatched > 0 {
                debug!(
                    "{} of {} rows of {} did not resolve {} through {}",
                    unmatched,
                    batch.len(),
                    def.name,
                    mapping.source_column,
                    mapping.table
                );
            }
            resolved_columns.push((mapping.target_column.clone(), values));
        }

        let mut output = batch.clone();
        let sources: HashSet<String> = mappings
            .iter()
            .map(|(_, idx)| batch.columns()[*idx].clone())
            .collect();
        for source in &sources {
            output.drop_column(source);
        }
        for (target, values) in resolved_columns {
            if let Some(idx) = output.column_index(&target) {
                let existing = output.columns()[idx].clone();
                output.drop_column(&existing);
            }
            output.push_column(target, values)?;
        }

        Ok(output)
    }

    /// Read the business key -> surrogate key projection of a referenced table
    ///
    /// Dimensions contribute their current versions only; facts every row.
    fn projection(&self, def: &TableDefinition, mapping: &KeyMapping) -> LoadResult<Projection> {
        let referenced = self.ctx.registry.table(&mapping.table)?;
        if !self.ctx.store.table_exists(&referenced.name)? {
            return Err(LoadError::MissingDimension {
                table: referenced.name.clone(),
                referenced_by: def.name.clone(),
            });
        }

        let business_key = normalize_column_name(&mapping.business_key);
        let surrogate_key = normalize_column_name(&mapping.surrogate_key);
        let mut sql = format!(
            "SELECT {}, {} FROM {}",
            quote_ident(&business_key),
            quote_ident(&surrogate_key),
            quote_ident(&referenced.name)
        );
        if referenced.kind == TableKind::Dimension {
            let is_current = normalize_column_name(&self.ctx.registry.audit().is_current);
            sql.push_str(&format!(" WHERE {} = TRUE", quote_ident(&is_current)));
        }

        let result = self.ctx.store.query(&sql, &[])?;
        let mut projection = Projection::with_capacity(result.row_count());
        let mut duplicates = 0usize;
        for row in &result.rows {
            let (Some(key), Value::Int(surrogate)) = (row[0].join_key(), &row[1]) else {
                continue;
            };
            match projection.get(&key) {
                Some(existing) if *existing >= *surrogate => duplicates += 1,
                Some(_) => {
                    duplicates += 1;
                    projection.insert(key, *surrogate);
                }
                None => {
                    projection.insert(key, *surrogate);
                }
            }
        }

        if duplicates > 0 {
            warn!(
                "{} duplicate business keys in {}.{}, using the highest surrogate key",
                duplicates, referenced.name, business_key
            );
        }
        debug!(
            "Loaded {} keys from {} for {}",
            projection.len(),
            referenced.name,
            def.name
        );
        Ok(projection)
    }
}

fn projection_id(mapping: &KeyMapping) -> ProjectionId {
    (
        mapping.table.to_lowercase(),
        normalize_column_name(&mapping.business_key),
        normalize_column_name(&mapping.surrogate_key),
    )
}
