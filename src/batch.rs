//! Typed tabular batches handed to the loaders
//!
//! A [`Batch`] is a rectangular set of rows with named columns. Cells are
//! [`Value`]s, with [`Value::Null`] as the explicit missing-value marker.
//! Column names are compared through [`normalize_column_name`], the warehouse's
//! physical naming convention.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::{LoadError, LoadResult};

/// Timestamp rendering used for join keys and text coercion
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Two numbers closer than this are considered equal
pub const FLOAT_EPSILON: f64 = 1e-10;

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing value
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Check if this is the missing-value marker
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value (integers and floats only)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String form used to join business keys across tables
    ///
    /// Integral floats render without a fractional part so that `7.0` joins
    /// with `7` and `"7"`. Returns `None` for [`Value::Null`].
    pub fn join_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    Some((*f as i64).to_string())
                } else {
                    Some(f.to_string())
                }
            }
            Value::Text(s) => Some(s.clone()),
            Value::Timestamp(ts) => Some(ts.format(TIMESTAMP_FORMAT).to_string()),
        }
    }

    /// Compare two values for change detection
    ///
    /// Integers compare exactly. Other numbers are equal within
    /// [`FLOAT_EPSILON`], widened by the rounding error of the operands'
    /// magnitude. `Null` only equals `Null`.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Int(x), Value::Int(y)) => x == y,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => {
                    (x - y).abs() <= FLOAT_EPSILON + f64::EPSILON * x.abs().max(y.abs())
                }
                _ => a == b || a.join_key() == b.join_key(),
            },
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    match n.as_f64() {
                        Some(f) if f.is_finite() => Value::Float(f),
                        _ => Value::Null,
                    }
                }
            }
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Text(other.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        if value.is_finite() {
            Value::Float(value)
        } else {
            Value::Null
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Convert a logical column name to the warehouse's physical convention
///
/// Every underscore-delimited segment is capitalized: `id_cliente_bdo`
/// becomes `Id_Cliente_Bdo`. Empty segments are preserved.
pub fn normalize_column_name(name: &str) -> String {
    name.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("_")
}

/// A rectangular batch of typed rows
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Batch {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Batch {
    /// Create an empty batch with the given columns
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Create a batch from columns and rows, rejecting ragged rows
    pub fn from_rows<I, S>(columns: I, rows: Vec<Vec<Value>>) -> LoadResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut batch = Self::new(columns);
        for row in rows {
            batch.push_row(row)?;
        }
        Ok(batch)
    }

    /// Build a batch from JSON objects
    ///
    /// Columns appear in order of first appearance; keys a row lacks become
    /// [`Value::Null`].
    pub fn from_json_rows(rows: &[serde_json::Value]) -> LoadResult<Self> {
        let mut columns: Vec<String> = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            let obj = row.as_object().ok_or_else(|| {
                LoadError::Configuration(format!("Batch row {} is not a JSON object", i))
            })?;
            for key in obj.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let mut batch = Self::new(columns.clone());
        for row in rows {
            let values = columns
                .iter()
                .map(|col| row.get(col).cloned().map(Value::from).unwrap_or(Value::Null))
                .collect();
            batch.rows.push(values);
        }
        Ok(batch)
    }

    /// Append a row; its length must match the column count
    pub fn push_row(&mut self, row: Vec<Value>) -> LoadResult<()> {
        if row.len() != self.columns.len() {
            return Err(LoadError::Configuration(format!(
                "Row {} has {} values, expected {}",
                self.rows.len(),
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Column names in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All rows
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the batch has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, matched exactly or by canonical name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name).or_else(|| {
            let canonical = normalize_column_name(name);
            self.columns
                .iter()
                .position(|c| normalize_column_name(c) == canonical)
        })
    }

    /// Value at a row for a named column
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Rename columns to the canonical convention, keeping the first of any
    /// columns that collide
    ///
    /// Returns the normalized batch and the original names that were dropped.
    pub fn normalized(&self) -> (Batch, Vec<String>) {
        let mut keep = Vec::with_capacity(self.columns.len());
        let mut names: Vec<String> = Vec::with_capacity(self.columns.len());
        let mut dropped = Vec::new();

        for (i, col) in self.columns.iter().enumerate() {
            let canonical = normalize_column_name(col);
            if names.contains(&canonical) {
                dropped.push(col.clone());
            } else {
                names.push(canonical);
                keep.push(i);
            }
        }

        let rows = self
            .rows
            .iter()
            .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
            .collect();

        (Batch { columns: names, rows }, dropped)
    }

    /// Remove a column by exact name; returns whether it existed
    pub fn drop_column(&mut self, name: &str) -> bool {
        match self.columns.iter().position(|c| c == name) {
            Some(idx) => {
                self.columns.remove(idx);
                for row in &mut self.rows {
                    row.remove(idx);
                }
                true
            }
            None => false,
        }
    }

    /// Append a column; `values` must have one entry per row
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> LoadResult<()> {
        let name = name.into();
        if values.len() != self.rows.len() {
            return Err(LoadError::Configuration(format!(
                "Column {} has {} values, expected {}",
                name,
                values.len(),
                self.rows.len()
            )));
        }
        if let Some(idx) = self.columns.iter().position(|c| *c == name) {
            for (row, value) in self.rows.iter_mut().zip(values) {
                row[idx] = value;
            }
        } else {
            self.columns.push(name);
            for (row, value) in self.rows.iter_mut().zip(values) {
                row.push(value);
            }
        }
        Ok(())
    }

    /// Render rows as JSON objects keyed by column name
    pub fn to_json_rows(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let map = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(c, v)| (c.clone(), serde_json::to_value(v).unwrap_or_default()))
                    .collect::<serde_json::Map<String, serde_json::Value>>();
                serde_json::Value::Object(map)
            })
            .collect()
    }
}
