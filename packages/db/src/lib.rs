//! SurrealDB integration for the image generation job service.
//!
//! This crate provides the job status registry: a durable mapping from
//! job id to state and result, with monotonic state writes.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod schema;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, connect};
pub use schema::init_schema;

/// Connect and initialize the schema.
///
/// This should be called once at application startup.
pub async fn init(config: &DbConfig) -> Result<Database, DbError> {
    let db = connect(config).await?;
    init_schema(&db).await?;
    Ok(db)
}
