//! Simulated per-domain transformation worker.

use std::time::Duration;

use warehouse_core::domain::{processed_record, Domain};
use warehouse_core::schema::Row;
use warehouse_db::{EngineError, Warehouse};

use crate::error::DemoError;

/// Sleep for `latency`, then append one processed row derived from the
/// domain's first source row. Returns the appended row.
pub async fn simulate_worker(
    warehouse: &Warehouse,
    domain: Domain,
    latency: Duration,
) -> Result<Row, DemoError> {
    tracing::debug!(%domain, latency_ms = latency.as_millis() as u64, "Worker started");
    tokio::time::sleep(latency).await;

    let source_table = domain.source_table();
    let source = warehouse.first_row(&source_table).await?.ok_or_else(|| {
        EngineError::rejected("insert", format!("'{source_table}' has no source row"))
    })?;

    let record = processed_record(&source, chrono::Utc::now());
    warehouse
        .insert(&domain.processed_table(), std::slice::from_ref(&record))
        .await?;

    tracing::info!(%domain, table = %domain.processed_table(), "Worker finished");
    Ok(record)
}
