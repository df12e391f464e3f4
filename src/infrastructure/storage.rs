use crate::infrastructure::error::InfraError;
use rusqlite::Connection;
use std::path::Path;
use tracing::debug;

const KV_STORE_SCHEMA: &str = include_str!("../../sql/schema.sql");

/// Creates the key-value table backing the selection snapshot. Safe to run on every start.
pub fn initialize_database(db_path: &Path) -> Result<(), InfraError> {
    Connection::open(db_path)?.execute_batch(KV_STORE_SCHEMA)?;
    debug!(path = %db_path.display(), "kv_store schema applied");
    Ok(())
}
