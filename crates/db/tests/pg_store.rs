//! PgStore against a live database. Run with
//! `DATABASE_URL=postgres://... cargo test -p warehouse-db -- --ignored`.

use std::sync::Arc;

use serde_json::json;
use sqlx::PgPool;
use warehouse_core::domain::Domain;
use warehouse_core::schema::Row;
use warehouse_db::{PgStore, Warehouse};

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap()
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn create_insert_select_round_trip(pool: PgPool) {
    let wh = Warehouse::new(Arc::new(PgStore::new(pool)));
    let schema = Domain::Sales.source_schema();
    wh.create_or_replace_table(&schema).await.unwrap();

    assert_eq!(wh.schema("sales_raw").await.unwrap(), schema);

    wh.insert("sales_raw", &[Domain::Sales.seed_row()])
        .await
        .unwrap();
    let rows = wh.select("sales_raw").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], 1);
    assert_eq!(rows[0]["amount"].as_f64(), Some(1000.0));
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn replace_table_drops_rows(pool: PgPool) {
    let wh = Warehouse::new(Arc::new(PgStore::new(pool)));
    let schema = Domain::Inventory.source_schema();
    wh.create_or_replace_table(&schema).await.unwrap();
    wh.insert("inventory_raw", &[Domain::Inventory.seed_row()])
        .await
        .unwrap();
    wh.create_or_replace_table(&schema).await.unwrap();
    assert_eq!(wh.count("inventory_raw").await.unwrap(), 0);
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn merge_updates_and_inserts(pool: PgPool) {
    let wh = Warehouse::new(Arc::new(PgStore::new(pool)));
    wh.create_or_replace_table(&Domain::Customers.source_schema())
        .await
        .unwrap();
    wh.insert("customers_raw", &[Domain::Customers.seed_row()])
        .await
        .unwrap();

    let outcome = wh
        .merge(
            "customers_raw",
            "id",
            &[
                row(json!({"id": 1, "name": "Acme Inc", "email": "ops@acme.example"})),
                row(json!({"id": 2, "name": "Globex", "email": "it@globex.example"})),
            ],
        )
        .await
        .unwrap();

    assert_eq!((outcome.updated, outcome.inserted), (1, 1));
    let rows = wh.select("customers_raw").await.unwrap();
    assert_eq!(rows[0]["name"], "Acme Inc");
    assert_eq!(rows[1]["name"], "Globex");
}
