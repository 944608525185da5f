use db::{Database, DbConfig, DbError};
use imagegen_core::JobId;

/// Fresh in-memory database with the schema applied.
pub async fn setup_db() -> Result<Database, DbError> {
    let mut config = DbConfig::memory();
    config.database = format!("test_{}", JobId::new().0.simple());
    db::init(&config).await
}
