use crate::domain::models::SelectionSnapshot;
use crate::infrastructure::error::InfraError;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SNAPSHOT_KEY: &str = "config";

pub trait SnapshotRepository: Send + Sync {
    fn load(&self) -> Result<Option<SelectionSnapshot>, InfraError>;
    fn save(&self, snapshot: &SelectionSnapshot) -> Result<(), InfraError>;
}

/// Stores the snapshot as JSON under a single key of the `kv_store` table.
#[derive(Debug, Clone)]
pub struct SqliteSnapshotRepository {
    db_path: PathBuf,
}

impl SqliteSnapshotRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl SnapshotRepository for SqliteSnapshotRepository {
    fn load(&self) -> Result<Option<SelectionSnapshot>, InfraError> {
        let connection = self.connect()?;
        let raw: Option<String> = connection
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![SNAPSHOT_KEY],
                |row| row.get(0),
            )
            .optional()?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        let snapshot = serde_json::from_str(&raw).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid stored selection snapshot: {error}"))
        })?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &SelectionSnapshot) -> Result<(), InfraError> {
        let connection = self.connect()?;
        let value = serde_json::to_string(snapshot)?;
        connection.execute(
            "INSERT INTO kv_store (key, value)
             VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![SNAPSHOT_KEY, value],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySnapshotRepository {
    snapshot: Mutex<Option<SelectionSnapshot>>,
}

impl SnapshotRepository for InMemorySnapshotRepository {
    fn load(&self) -> Result<Option<SelectionSnapshot>, InfraError> {
        let snapshot = self
            .snapshot
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("snapshot lock poisoned: {error}")))?;
        Ok(snapshot.clone())
    }

    fn save(&self, snapshot: &SelectionSnapshot) -> Result<(), InfraError> {
        let mut stored = self
            .snapshot
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("snapshot lock poisoned: {error}")))?;
        *stored = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{RangeKind, WeekStart};
    use crate::infrastructure::storage::initialize_database;
    use chrono::{DateTime, Utc};
    use tempfile::tempdir;

    fn sample_snapshot() -> SelectionSnapshot {
        SelectionSnapshot {
            last_selected_range_index: Some(RangeKind::Custom),
            last_selected_calendar_cid: Some("primary".to_string()),
            week_start: Some(WeekStart::Sunday),
            custom_start: Some(
                DateTime::parse_from_rfc3339("2026-02-01T00:00:00Z")
                    .expect("valid datetime")
                    .with_timezone(&Utc),
            ),
            custom_end: Some(
                DateTime::parse_from_rfc3339("2026-02-14T00:00:00Z")
                    .expect("valid datetime")
                    .with_timezone(&Utc),
            ),
        }
    }

    #[test]
    fn sqlite_repository_overwrites_previous_snapshot() {
        let dir = tempdir().expect("temp dir");
        let db_path = dir.path().join("hours.sqlite");
        initialize_database(&db_path).expect("init db");
        let repository = SqliteSnapshotRepository::new(&db_path);

        assert!(repository.load().expect("load empty").is_none());

        repository.save(&SelectionSnapshot::default()).expect("save default");
        repository.save(&sample_snapshot()).expect("save sample");

        let loaded = repository.load().expect("load").expect("snapshot exists");
        assert_eq!(loaded, sample_snapshot());
    }

    #[test]
    fn sqlite_repository_rejects_corrupt_value() {
        let dir = tempdir().expect("temp dir");
        let db_path = dir.path().join("hours.sqlite");
        initialize_database(&db_path).expect("init db");
        let connection = Connection::open(&db_path).expect("open db");
        connection
            .execute(
                "INSERT INTO kv_store (key, value) VALUES (?1, ?2)",
                params![SNAPSHOT_KEY, r#"{"lastSelectedRangeIndex": 42}"#],
            )
            .expect("seed corrupt row");

        let repository = SqliteSnapshotRepository::new(&db_path);
        assert!(matches!(repository.load(), Err(InfraError::InvalidConfig(_))));
    }

    #[test]
    fn in_memory_repository_round_trips() {
        let repository = InMemorySnapshotRepository::default();
        repository.save(&sample_snapshot()).expect("save");
        assert_eq!(repository.load().expect("load"), Some(sample_snapshot()));
    }
}
