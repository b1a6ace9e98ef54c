//! Deduplicated fact loads

#![cfg(feature = "duckdb-backend")]

mod common;

use chrono::Duration as ChronoDuration;
use common::*;
use warehouse_loader::{Batch, FactLoader, FixedClock, LoadContext, LoadError, Value};

fn deliveries(rows: &[(i64, &str)]) -> Batch {
    Batch::from_rows(
        ["id_delivery_bdo", "status"],
        rows.iter()
            .map(|(id, status)| vec![Value::Int(*id), (*status).into()])
            .collect(),
    )
    .unwrap()
}

#[test]
fn test_fact_rows_get_surrogate_keys_and_timestamps() {
    let store = store();
    let registry = courier_registry();
    create_tables(&store, &registry, &["fact_delivery"]);
    let clock = FixedClock::new(at(2024, 6, 1, 10));
    let ctx = LoadContext::new(&store, &registry)
        .with_settings(fast_settings())
        .with_clock(&clock);

    let result = FactLoader::new(&ctx)
        .load("fact_delivery", &deliveries(&[(10, "DELIVERED"), (11, "PENDING")]))
        .unwrap();
    assert_eq!(result.rows_loaded, 2);

    let rows = query(
        &store,
        r#"SELECT "Sk_Delivery", "Id_Delivery_Bdo", "Dk_Courier", "Created_At", "Updated_At"
           FROM fact_delivery ORDER BY "Sk_Delivery""#,
    );
    assert_eq!(rows.get(0, "Sk_Delivery"), Some(&Value::Int(1)));
    assert_eq!(rows.get(1, "Sk_Delivery"), Some(&Value::Int(2)));
    assert_eq!(rows.get(1, "Id_Delivery_Bdo"), Some(&Value::Int(11)));
    assert_eq!(rows.get(0, "Dk_Courier"), Some(&Value::Null));
    assert_eq!(rows.get(0, "Created_At"), Some(&Value::Timestamp(at(2024, 6, 1, 10))));
    assert_eq!(rows.get(0, "Updated_At"), Some(&Value::Timestamp(at(2024, 6, 1, 10))));
}

#[test]
fn test_reloading_facts_is_idempotent() {
    let store = store();
    let registry = courier_registry();
    create_tables(&store, &registry, &["fact_delivery"]);
    let clock = FixedClock::new(at(2024, 6, 1, 10));
    let ctx = LoadContext::new(&store, &registry)
        .with_settings(fast_settings())
        .with_clock(&clock);
    let loader = FactLoader::new(&ctx);

    loader
        .load("fact_delivery", &deliveries(&[(10, "DELIVERED"), (11, "PENDING")]))
        .unwrap();
    clock.advance(ChronoDuration::hours(3));
    // a changed status is still the same fact
    let second = loader
        .load(
            "fact_delivery",
            &deliveries(&[(10, "DELIVERED"), (11, "DELIVERED"), (12, "PENDING")]),
        )
        .unwrap();

    assert_eq!(second.rows_loaded, 1);
    assert_eq!(second.rows_skipped, 2);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM fact_delivery"), 3);
    assert_eq!(
        count(&store, r#"SELECT MAX("Sk_Delivery") FROM fact_delivery"#),
        3
    );
}

#[test]
fn test_duplicates_within_a_batch_insert_once() {
    let store = store();
    let registry = courier_registry();
    create_tables(&store, &registry, &["fact_delivery"]);
    let ctx = LoadContext::new(&store, &registry).with_settings(fast_settings());

    let result = FactLoader::new(&ctx)
        .load(
            "fact_delivery",
            &deliveries(&[(10, "PENDING"), (10, "DELIVERED"), (11, "PENDING")]),
        )
        .unwrap();

    assert_eq!(result.rows_loaded, 2);
    assert_eq!(result.rows_skipped, 1);
    let status = query(
        &store,
        r#"SELECT "Status" FROM fact_delivery WHERE "Id_Delivery_Bdo" = 10"#,
    );
    assert_eq!(status.scalar(), Some(&Value::Text("PENDING".into())));
}

#[test]
fn test_fact_rows_failing_coercion_are_rejected() {
    let store = store();
    let registry = courier_registry();
    create_tables(&store, &registry, &["fact_delivery"]);
    let ctx = LoadContext::new(&store, &registry).with_settings(fast_settings());

    let batch = Batch::from_rows(
        ["id_delivery_bdo", "status"],
        vec![
            vec!["12".into(), "PENDING".into()],
            vec!["twelve".into(), "PENDING".into()],
            vec![Value::Null, "PENDING".into()],
        ],
    )
    .unwrap();
    let result = FactLoader::new(&ctx).load("fact_delivery", &batch).unwrap();

    assert_eq!(result.rows_loaded, 1);
    assert_eq!(result.rows_skipped, 2);
    assert_eq!(result.issues.iter().map(|i| i.row).collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn test_unresolved_business_key_columns_are_rejected() {
    let store = store();
    let registry = courier_registry();
    create_tables(&store, &registry, &["fact_delivery"]);
    let ctx = LoadContext::new(&store, &registry).with_settings(fast_settings());

    // business keys must go through the resolver first
    let batch = Batch::from_rows(
        ["id_delivery_bdo", "id_courier_bdo"],
        vec![vec![Value::Int(10), "C1".into()]],
    )
    .unwrap();
    let err = FactLoader::new(&ctx).load("fact_delivery", &batch).unwrap_err();
    assert!(matches!(err, LoadError::Configuration(_)));
    assert_eq!(count(&store, "SELECT COUNT(*) FROM fact_delivery"), 0);
}
