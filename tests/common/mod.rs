//! Shared fixtures for the warehouse integration tests

#![allow(dead_code)]

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use warehouse_loader::{
    Batch, DuckDbStore, LoadSettings, QueryResult, SchemaRegistry, Value, WarehouseStore,
};

pub const COURIER_SCHEMA: &str = r#"
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
name = "dim_city"
kind = "dimension"
primary_key = "dk_city"
business_keys = ["id_city_bdo"]
columns = [
    { name = "id_city_bdo", type = "text", nullable = false },
    { name = "city_name", type = "text" },
]

[[tables]]
name = "fact_delivery"
kind = "fact"
primary_key = "sk_delivery"
unique_columns = ["id_delivery_bdo"]
columns = [
    { name = "id_delivery_bdo", type = "bigint", nullable = false },
    { name = "status", type = "text" },
]

[[tables.key_mappings]]
table = "dim_courier"
source_column = "id_courier_bdo"
business_key = "id_courier_bdo"
surrogate_key = "dk_courier"
target_column = "dk_courier"

[[tables.key_mappings]]
table = "dim_city"
source_column = "id_city_bdo"
business_key = "id_city_bdo"
surrogate_key = "dk_city"
target_column = "dk_city"
"#;

pub fn courier_registry() -> SchemaRegistry {
    SchemaRegistry::from_toml_str(COURIER_SCHEMA).unwrap()
}

pub fn store() -> DuckDbStore {
    DuckDbStore::in_memory().unwrap()
}

/// Settings without the post-DDL wait
pub fn fast_settings() -> LoadSettings {
    LoadSettings {
        settle_delay: Duration::ZERO,
        ..Default::default()
    }
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

pub fn create_tables(store: &DuckDbStore, registry: &SchemaRegistry, tables: &[&str]) {
    for table in tables {
        registry
            .ensure_table_exists(store, table, Duration::ZERO)
            .unwrap();
    }
}

pub fn couriers(rows: &[(&str, &str, f64)]) -> Batch {
    Batch::from_rows(
        ["id_courier_bdo", "name", "salary"],
        rows.iter()
            .map(|(id, name, salary)| vec![(*id).into(), (*name).into(), (*salary).into()])
            .collect(),
    )
    .unwrap()
}

pub fn query(store: &DuckDbStore, sql: &str) -> QueryResult {
    store.query(sql, &[]).unwrap()
}

pub fn count(store: &DuckDbStore, sql: &str) -> i64 {
    match query(store, sql).scalar() {
        Some(Value::Int(n)) => *n,
        other => panic!("expected a count, got {:?}", other),
    }
}
