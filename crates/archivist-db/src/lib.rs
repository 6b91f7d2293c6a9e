pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod scope;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

pub use error::{ArchiveError, Result};
pub use scope::{ArchiveScope, ScopeSummary};

/// The archive store. A single connection behind a mutex serializes every
/// write, so a live edit and a backfill upsert of the same row never interleave.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ArchiveError::LockPoisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archivist_types::{Author, Message};

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.db");

        {
            let db = Database::open(&path).unwrap();
            db.put(&Message {
                id: 1,
                author: Author { id: 2, display_name: "carol".into() },
                content: "persisted".into(),
                attachments: vec![],
            })
            .unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.get(1).unwrap().content, "persisted");
        assert_eq!(db.count_messages().unwrap(), 1);
    }
}
