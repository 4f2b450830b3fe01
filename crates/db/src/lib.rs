//! Statement submission layer for the warehouse demo.
//!
//! - [`Store`]: the engine seam: create tables, insert, select, merge.
//! - [`MemoryStore`]: in-process engine used by tests and the default demo.
//! - [`PgStore`]: PostgreSQL engine over a [`DbPool`].
//! - [`Warehouse`]: the cloneable store handle every orchestrator
//!   operation receives; validates rows and runs write hooks.

use sqlx::postgres::PgPoolOptions;

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod warehouse;

pub use error::EngineError;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{MergeOutcome, Store, WriteEvent, WriteHook, WriteKind};
pub use warehouse::{TableSnapshot, Warehouse};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify the pool is usable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
