use crate::errors::{AppError, AppResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");

// Durable client-side storage. One row per user holding the last active list
// id; absence means "no prior selection". Nothing else survives a reload.
#[derive(Debug)]
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Storage(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn last_selection(&self, user_id: &str) -> AppResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT list_id FROM last_selection WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_last_selection(&self, user_id: &str, list_id: Option<&str>) -> AppResult<()> {
        let conn = self.lock()?;
        match list_id {
            Some(list_id) => {
                conn.execute(
                    "INSERT INTO last_selection (user_id, list_id, updated_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(user_id) DO UPDATE SET list_id = ?2, updated_at = ?3",
                    params![user_id, list_id, Utc::now().to_rfc3339()],
                )?;
            }
            None => {
                conn.execute("DELETE FROM last_selection WHERE user_id = ?1", [user_id])?;
            }
        }
        Ok(())
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("storage mutex poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::Storage;

    #[test]
    fn selection_round_trips_per_user() {
        let storage = Storage::open_in_memory().expect("open");
        storage.set_last_selection("u1", Some("l1")).expect("set");
        storage.set_last_selection("u2", Some("l2")).expect("set");

        assert_eq!(storage.last_selection("u1").expect("get"), Some("l1".to_string()));
        assert_eq!(storage.last_selection("u2").expect("get"), Some("l2".to_string()));
        assert_eq!(storage.last_selection("u3").expect("get"), None);
    }

    #[test]
    fn clearing_removes_the_row() {
        let storage = Storage::open_in_memory().expect("open");
        storage.set_last_selection("u1", Some("l1")).expect("set");
        storage.set_last_selection("u1", None).expect("clear");
        assert_eq!(storage.last_selection("u1").expect("get"), None);
    }

    #[test]
    fn reopening_a_file_keeps_the_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("client.sqlite");
        {
            let storage = Storage::open(&path).expect("open");
            storage.set_last_selection("u1", Some("l9")).expect("set");
        }
        let storage = Storage::open(&path).expect("reopen");
        assert_eq!(storage.last_selection("u1").expect("get"), Some("l9".to_string()));
    }
}
