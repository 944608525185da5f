//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// This creates all necessary tables, fields, and indexes.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(JOB_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job table schema.
///
/// Timestamps are RFC 3339 strings written by the application.
const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS job_id ON job TYPE string;
DEFINE FIELD IF NOT EXISTS prompt ON job TYPE string;
DEFINE FIELD IF NOT EXISTS model ON job TYPE string;
DEFINE FIELD IF NOT EXISTS state ON job TYPE string
    ASSERT $value IN ["PENDING", "RUNNING", "SUCCEEDED", "FAILED"];
DEFINE FIELD IF NOT EXISTS image_ref ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS error ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS created_at ON job TYPE string;
DEFINE FIELD IF NOT EXISTS updated_at ON job TYPE string;

DEFINE INDEX IF NOT EXISTS job_state ON job FIELDS state;
DEFINE INDEX IF NOT EXISTS job_created ON job FIELDS created_at;
"#;
