//! SCD Type 2 dimension loads against an in-memory DuckDB warehouse

#![cfg(feature = "duckdb-backend")]

mod common;

use chrono::Duration as ChronoDuration;
use common::*;
use warehouse_loader::load::MAX_VALID_TO;
use warehouse_loader::{
    Batch, DimensionLoader, FixedClock, LoadContext, LoadError, LoadSettings, MissingKeyPolicy,
    SchemaRegistry, Value,
};

const HISTORY_SQL: &str = r#"SELECT "Dk_Courier", "Name", "Salary", "Valid_From", "Valid_To", "Is_Current", "Created_At"
    FROM dim_courier ORDER BY "Dk_Courier""#;

#[test]
fn test_first_load_inserts_current_versions() {
    let store = store();
    let registry = courier_registry();
    create_tables(&store, &registry, &["dim_courier"]);
    let clock = FixedClock::new(at(2024, 3, 1, 8));
    let ctx = LoadContext::new(&store, &registry)
        .with_settings(fast_settings())
        .with_clock(&clock);

    let result = DimensionLoader::new(&ctx)
        .load("dim_courier", &couriers(&[("C1", "Ana", 1000.0), ("C2", "Luis", 1200.0)]))
        .unwrap();

    assert_eq!(result.rows_loaded, 2);
    assert_eq!(result.rows_updated, 0);
    assert_eq!(result.rows_skipped, 0);

    let rows = query(&store, HISTORY_SQL);
    assert_eq!(rows.row_count(), 2);
    assert_eq!(rows.get(0, "Dk_Courier"), Some(&Value::Int(1)));
    assert_eq!(rows.get(1, "Dk_Courier"), Some(&Value::Int(2)));
    assert_eq!(rows.get(0, "Valid_From"), Some(&Value::Timestamp(at(2024, 3, 1, 8))));
    assert_eq!(rows.get(0, "Valid_To"), Some(&Value::Timestamp(*MAX_VALID_TO)));
    assert_eq!(rows.get(0, "Is_Current"), Some(&Value::Bool(true)));
    assert_eq!(rows.get(0, "Created_At"), Some(&Value::Timestamp(at(2024, 3, 1, 8))));
}

#[test]
fn test_reloading_the_same_batch_changes_nothing() {
    let store = store();
    let registry = courier_registry();
    create_tables(&store, &registry, &["dim_courier"]);
    let clock = FixedClock::new(at(2024, 3, 1, 8));
    let ctx = LoadContext::new(&store, &registry)
        .with_settings(fast_settings())
        .with_clock(&clock);
    let loader = DimensionLoader::new(&ctx);
    let batch = couriers(&[("C1", "Ana", 1000.0), ("C2", "Luis", 1200.0)]);

    loader.load("dim_courier", &batch).unwrap();
    clock.advance(ChronoDuration::days(1));
    let second = loader.load("dim_courier", &batch).unwrap();

    assert_eq!(second.rows_loaded, 0);
    assert_eq!(second.rows_updated, 0);
    assert_eq!(second.rows_skipped, 2);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM dim_courier"), 2);
}

#[test]
fn test_changed_attribute_creates_new_version() {
    let store = store();
    let registry = courier_registry();
    create_tables(&store, &registry, &["dim_courier"]);
    let clock = FixedClock::new(at(2024, 3, 1, 8));
    let ctx = LoadContext::new(&store, &registry)
        .with_settings(fast_settings())
        .with_clock(&clock);
    let loader = DimensionLoader::new(&ctx);

    loader
        .load("dim_courier", &couriers(&[("C1", "Ana", 1000.0)]))
        .unwrap();
    clock.set(at(2024, 3, 5, 17));
    let result = loader
        .load("dim_courier", &couriers(&[("C1", "Ana Maria", 1000.0)]))
        .unwrap();

    assert_eq!(result.rows_updated, 1);
    assert_eq!(result.rows_loaded, 0);

    let rows = query(&store, HISTORY_SQL);
    assert_eq!(rows.row_count(), 2);

    // expired version
    assert_eq!(rows.get(0, "Name"), Some(&Value::Text("Ana".into())));
    assert_eq!(rows.get(0, "Is_Current"), Some(&Value::Bool(false)));
    assert_eq!(rows.get(0, "Valid_To"), Some(&Value::Timestamp(at(2024, 3, 5, 17))));

    // successor starts exactly where its predecessor ends
    assert_eq!(rows.get(1, "Dk_Courier"), Some(&Value::Int(2)));
    assert_eq!(rows.get(1, "Name"), Some(&Value::Text("Ana Maria".into())));
    assert_eq!(rows.get(1, "Is_Current"), Some(&Value::Bool(true)));
    assert_eq!(rows.get(1, "Valid_From"), rows.get(0, "Valid_To"));
    assert_eq!(rows.get(1, "Valid_To"), Some(&Value::Timestamp(*MAX_VALID_TO)));
    assert_eq!(rows.get(1, "Created_At"), Some(&Value::Timestamp(at(2024, 3, 1, 8))));

    assert_eq!(
        count(
            &store,
            r#"SELECT COUNT(*) FROM dim_courier WHERE "Id_Courier_Bdo" = 'C1' AND "Is_Current""#
        ),
        1
    );
}

#[test]
fn test_float_noise_is_not_a_change() {
    let store = store();
    let registry = courier_registry();
    create_tables(&store, &registry, &["dim_courier"]);
    let clock = FixedClock::new(at(2024, 3, 1, 8));
    let ctx = LoadContext::new(&store, &registry)
        .with_settings(fast_settings())
        .with_clock(&clock);
    let loader = DimensionLoader::new(&ctx);

    loader
        .load("dim_courier", &couriers(&[("C1", "Ana", 10.0000000001)]))
        .unwrap();

    clock.advance(ChronoDuration::hours(1));
    let noise = loader
        .load("dim_courier", &couriers(&[("C1", "Ana", 10.0000000002)]))
        .unwrap();
    assert_eq!(noise.rows_skipped, 1);
    assert_eq!(noise.rows_updated, 0);

    clock.advance(ChronoDuration::hours(1));
    loader
        .load("dim_courier", &couriers(&[("C2", "Luis", 10.0)]))
        .unwrap();
    let raise = loader
        .load("dim_courier", &couriers(&[("C2", "Luis", 10.01)]))
        .unwrap();
    assert_eq!(raise.rows_updated, 1);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM dim_courier"), 3);
}

#[test]
fn test_attributes_not_supplied_are_carried_forward() {
    let store = store();
    let registry = courier_registry();
    create_tables(&store, &registry, &["dim_courier"]);
    let clock = FixedClock::new(at(2024, 3, 1, 8));
    let ctx = LoadContext::new(&store, &registry)
        .with_settings(fast_settings())
        .with_clock(&clock);
    let loader = DimensionLoader::new(&ctx);

    loader
        .load("dim_courier", &couriers(&[("C1", "Ana", 1500.0)]))
        .unwrap();
    clock.advance(ChronoDuration::days(2));
    let rename = Batch::from_rows(
        ["id_courier_bdo", "name"],
        vec![vec!["C1".into(), "Ana Maria".into()]],
    )
    .unwrap();
    loader.load("dim_courier", &rename).unwrap();

    let rows = query(&store, HISTORY_SQL);
    assert_eq!(rows.get(1, "Name"), Some(&Value::Text("Ana Maria".into())));
    assert_eq!(rows.get(1, "Salary"), Some(&Value::Float(1500.0)));
}

#[test]
fn test_same_key_twice_in_one_batch() {
    let store = store();
    let registry = courier_registry();
    create_tables(&store, &registry, &["dim_courier"]);
    let clock = FixedClock::new(at(2024, 3, 1, 8));
    let ctx = LoadContext::new(&store, &registry)
        .with_settings(fast_settings())
        .with_clock(&clock);

    let result = DimensionLoader::new(&ctx)
        .load(
            "dim_courier",
            &couriers(&[("C1", "Ana", 1000.0), ("C1", "Ana Maria", 1000.0)]),
        )
        .unwrap();

    assert_eq!(result.rows_loaded, 1);
    assert_eq!(result.rows_updated, 1);
    assert_eq!(
        count(&store, r#"SELECT COUNT(*) FROM dim_courier WHERE "Is_Current""#),
        1
    );
    let current = query(
        &store,
        r#"SELECT "Name" FROM dim_courier WHERE "Is_Current""#,
    );
    assert_eq!(current.scalar(), Some(&Value::Text("Ana Maria".into())));
}

#[test]
fn test_colliding_columns_keep_the_first() {
    let store = store();
    let registry = courier_registry();
    create_tables(&store, &registry, &["dim_courier"]);
    let clock = FixedClock::new(at(2024, 3, 1, 8));
    let ctx = LoadContext::new(&store, &registry)
        .with_settings(fast_settings())
        .with_clock(&clock);

    let batch = Batch::from_rows(
        ["ID_COURIER_BDO", "name", "Name"],
        vec![vec!["C1".into(), "Ana".into(), "Other".into()]],
    )
    .unwrap();
    DimensionLoader::new(&ctx).load("dim_courier", &batch).unwrap();

    let rows = query(&store, HISTORY_SQL);
    assert_eq!(rows.get(0, "Name"), Some(&Value::Text("Ana".into())));
}

#[test]
fn test_missing_business_key_is_rejected_by_default() {
    let store = store();
    let registry = courier_registry();
    create_tables(&store, &registry, &["dim_courier"]);
    let clock = FixedClock::new(at(2024, 3, 1, 8));
    let ctx = LoadContext::new(&store, &registry)
        .with_settings(fast_settings())
        .with_clock(&clock);

    let batch = Batch::from_rows(
        ["id_courier_bdo", "name"],
        vec![
            vec!["C1".into(), "Ana".into()],
            vec![Value::Null, "Nobody".into()],
        ],
    )
    .unwrap();
    let result = DimensionLoader::new(&ctx).load("dim_courier", &batch).unwrap();

    assert_eq!(result.rows_loaded, 1);
    assert_eq!(result.rows_skipped, 1);
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].row, 1);
    assert!(result.issues[0].message.contains("no business key"));
    assert_eq!(count(&store, "SELECT COUNT(*) FROM dim_courier"), 1);
}

#[test]
fn test_missing_business_key_can_fail_the_load() {
    let store = store();
    let registry = courier_registry();
    create_tables(&store, &registry, &["dim_courier"]);
    let clock = FixedClock::new(at(2024, 3, 1, 8));
    let ctx = LoadContext::new(&store, &registry)
        .with_settings(LoadSettings {
            missing_key_policy: MissingKeyPolicy::Fail,
            ..fast_settings()
        })
        .with_clock(&clock);

    let batch = Batch::from_rows(
        ["id_courier_bdo", "name"],
        vec![
            vec!["C1".into(), "Ana".into()],
            vec![Value::Null, "Nobody".into()],
        ],
    )
    .unwrap();
    let err = DimensionLoader::new(&ctx)
        .load("dim_courier", &batch)
        .unwrap_err();

    assert!(matches!(err, LoadError::UnresolvedBusinessKey { row: 1, .. }));
    // the whole batch rolled back
    assert_eq!(count(&store, "SELECT COUNT(*) FROM dim_courier"), 0);
}

#[test]
fn test_missing_business_key_inserted_as_new_entities() {
    let registry = SchemaRegistry::from_toml_str(
        r#"
[[tables]]
name = "dim_tag"
kind = "dimension"
primary_key = "dk_tag"
business_keys = ["tag_code"]
columns = [
    { name = "tag_code", type = "text" },
    { name = "label", type = "text" },
]
"#,
    )
    .unwrap();
    let store = store();
    create_tables(&store, &registry, &["dim_tag"]);
    let clock = FixedClock::new(at(2024, 3, 1, 8));
    let ctx = LoadContext::new(&store, &registry)
        .with_settings(LoadSettings {
            missing_key_policy: MissingKeyPolicy::InsertAsNew,
            ..fast_settings()
        })
        .with_clock(&clock);

    let batch = Batch::from_rows(
        ["tag_code", "label"],
        vec![
            vec![Value::Null, "untagged".into()],
            vec![Value::Null, "untagged".into()],
        ],
    )
    .unwrap();
    let result = DimensionLoader::new(&ctx).load("dim_tag", &batch).unwrap();

    assert_eq!(result.rows_loaded, 2);
    assert_eq!(count(&store, "SELECT COUNT(DISTINCT \"Dk_Tag\") FROM dim_tag"), 2);
}

#[test]
fn test_insert_as_new_needs_nullable_business_keys() {
    let store = store();
    let registry = courier_registry();
    create_tables(&store, &registry, &["dim_courier"]);
    let clock = FixedClock::new(at(2024, 3, 1, 8));
    let ctx = LoadContext::new(&store, &registry)
        .with_settings(LoadSettings {
            missing_key_policy: MissingKeyPolicy::InsertAsNew,
            ..fast_settings()
        })
        .with_clock(&clock);

    let batch = Batch::from_rows(["id_courier_bdo", "name"], vec![vec![Value::Null, "Nobody".into()]])
        .unwrap();
    let err = DimensionLoader::new(&ctx)
        .load("dim_courier", &batch)
        .unwrap_err();
    assert!(matches!(err, LoadError::Configuration(_)));
}

#[test]
fn test_dimension_loader_refuses_fact_tables() {
    let store = store();
    let registry = courier_registry();
    let ctx = LoadContext::new(&store, &registry).with_settings(fast_settings());

    let batch = Batch::from_rows(["id_delivery_bdo"], vec![vec![Value::Int(1)]]).unwrap();
    let err = DimensionLoader::new(&ctx)
        .load("fact_delivery", &batch)
        .unwrap_err();
    assert!(matches!(err, LoadError::Configuration(_)));
}

#[test]
fn test_partly_null_composite_key_is_rejected() {
    let registry = SchemaRegistry::from_toml_str(
        r#"
[[tables]]
name = "dim_route"
kind = "dimension"
primary_key = "dk_route"
business_keys = ["origin", "dest"]
columns = [
    { name = "origin", type = "text", nullable = false },
    { name = "dest", type = "text", nullable = false },
    { name = "distance_km", type = "double" },
]
"#,
    )
    .unwrap();
    let store = store();
    create_tables(&store, &registry, &["dim_route"]);
    let ctx = LoadContext::new(&store, &registry).with_settings(fast_settings());

    let batch = Batch::from_rows(
        ["origin", "dest", "distance_km"],
        vec![
            vec!["A".into(), "B".into(), Value::Float(12.5)],
            vec!["A".into(), Value::Null, Value::Float(3.0)],
        ],
    )
    .unwrap();
    let result = DimensionLoader::new(&ctx).load("dim_route", &batch).unwrap();

    assert_eq!(result.rows_loaded, 1);
    assert_eq!(result.rows_skipped, 1);
    assert_eq!(result.issues[0].row, 1);
    assert!(result.issues[0].message.contains("dest"));
    assert_eq!(count(&store, "SELECT COUNT(*) FROM dim_route"), 1);
}

#[test]
fn test_large_integer_change_creates_new_version() {
    let registry = SchemaRegistry::from_toml_str(
        r#"
[[tables]]
name = "dim_account"
kind = "dimension"
primary_key = "dk_account"
business_keys = ["id_account_bdo"]
columns = [
    { name = "id_account_bdo", type = "text", nullable = false },
    { name = "balance_cents", type = "bigint" },
]
"#,
    )
    .unwrap();
    let store = store();
    create_tables(&store, &registry, &["dim_account"]);
    let clock = FixedClock::new(at(2024, 3, 1, 8));
    let ctx = LoadContext::new(&store, &registry)
        .with_settings(fast_settings())
        .with_clock(&clock);
    let loader = DimensionLoader::new(&ctx);
    let account = |cents: i64| {
        Batch::from_rows(
            ["id_account_bdo", "balance_cents"],
            vec![vec!["AC1".into(), Value::Int(cents)]],
        )
        .unwrap()
    };

    loader.load("dim_account", &account(9_000_000_000_000_001)).unwrap();
    clock.advance(ChronoDuration::hours(1));
    let result = loader.load("dim_account", &account(9_000_000_000_000_000)).unwrap();

    assert_eq!(result.rows_updated, 1);
    let current = query(
        &store,
        r#"SELECT "Balance_Cents" FROM dim_account WHERE "Is_Current""#,
    );
    assert_eq!(current.scalar(), Some(&Value::Int(9_000_000_000_000_000)));
}
