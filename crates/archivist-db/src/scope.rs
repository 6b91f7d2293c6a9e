use std::sync::MutexGuard;

use archivist_types::Message;
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::Database;
use crate::error::Result;
use crate::queries::upsert_message;

/// Counts reported when a scope commits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeSummary {
    pub written: usize,
    pub skipped: usize,
}

/// A batch of upserts committed atomically.
///
/// Holds the store's connection for its whole lifetime: every other store
/// call waits until the scope commits or rolls back. Dropping a scope without
/// calling `commit` rolls every write back.
pub struct ArchiveScope<'a> {
    conn: MutexGuard<'a, Connection>,
    open: bool,
    summary: ScopeSummary,
}

impl Database {
    pub fn begin_scope(&self) -> Result<ArchiveScope<'_>> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        debug!("Archive scope opened");

        Ok(ArchiveScope {
            conn,
            open: true,
            summary: ScopeSummary::default(),
        })
    }
}

impl ArchiveScope<'_> {
    /// Upserts one message inside the scope. A failing row is rolled back to
    /// its savepoint and counted as skipped; the scope itself stays usable.
    pub fn upsert(&mut self, message: &Message) -> Result<()> {
        let result = self.upsert_row(message);
        match &result {
            Ok(()) => self.summary.written += 1,
            Err(_) => self.summary.skipped += 1,
        }
        result
    }

    fn upsert_row(&mut self, message: &Message) -> Result<()> {
        self.conn.execute_batch("SAVEPOINT scope_row")?;

        match upsert_message(&self.conn, message) {
            Ok(()) => {
                self.conn.execute_batch("RELEASE scope_row")?;
                Ok(())
            }
            Err(e) => {
                self.conn
                    .execute_batch("ROLLBACK TO scope_row; RELEASE scope_row")?;
                Err(e.into())
            }
        }
    }

    pub fn summary(&self) -> ScopeSummary {
        self.summary
    }

    pub fn commit(mut self) -> Result<ScopeSummary> {
        self.conn.execute_batch("COMMIT")?;
        self.open = false;
        debug!(written = self.summary.written, skipped = self.summary.skipped, "Archive scope committed");
        Ok(self.summary)
    }
}

impl Drop for ArchiveScope<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }

        match self.conn.execute_batch("ROLLBACK") {
            Ok(()) => debug!(discarded = self.summary.written, "Archive scope rolled back"),
            Err(e) => warn!(error = %e, "Archive scope rollback failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archivist_types::{Attachment, Author};

    fn message(id: u64) -> Message {
        Message {
            id,
            author: Author { id: 1, display_name: "erin".into() },
            content: format!("message {}", id),
            attachments: vec![],
        }
    }

    #[test]
    fn test_commit_persists_all_rows() {
        let db = Database::open_in_memory().unwrap();

        let mut scope = db.begin_scope().unwrap();
        for id in 1..=3 {
            scope.upsert(&message(id)).unwrap();
        }
        let summary = scope.commit().unwrap();

        assert_eq!(summary, ScopeSummary { written: 3, skipped: 0 });
        assert_eq!(db.count_messages().unwrap(), 3);
    }

    #[test]
    fn test_drop_without_commit_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        db.put(&message(1)).unwrap();

        {
            let mut scope = db.begin_scope().unwrap();
            scope.upsert(&message(2)).unwrap();
            let mut changed = message(1);
            changed.content = "changed".into();
            scope.upsert(&changed).unwrap();
        }

        assert_eq!(db.count_messages().unwrap(), 1);
        assert_eq!(db.get(1).unwrap().content, "message 1");
    }

    #[test]
    fn test_failing_row_does_not_abort_scope() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON attachments
                 WHEN NEW.filename = 'poison'
                 BEGIN SELECT RAISE(ABORT, 'poisoned row'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let mut bad = message(2);
        bad.attachments.push(Attachment {
            id: 20,
            message_id: 2,
            filename: "poison".into(),
            url: "u".into(),
        });

        let mut scope = db.begin_scope().unwrap();
        scope.upsert(&message(1)).unwrap();
        assert!(scope.upsert(&bad).is_err());
        scope.upsert(&message(3)).unwrap();
        let summary = scope.commit().unwrap();

        assert_eq!(summary, ScopeSummary { written: 2, skipped: 1 });
        assert_eq!(db.count_messages().unwrap(), 2);
        // The message row of the failed upsert was rolled back with its attachment
        assert!(db.get(2).is_err());
    }

    #[test]
    fn test_store_usable_after_scope_ends() {
        let db = Database::open_in_memory().unwrap();
        {
            let _scope = db.begin_scope().unwrap();
        }
        db.put(&message(8)).unwrap();
        assert_eq!(db.get(8).unwrap().id, 8);
    }

    #[test]
    fn test_summary_counts_every_attempt() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_even BEFORE INSERT ON messages
                 WHEN NEW.message_id % 2 = 0
                 BEGIN SELECT RAISE(ABORT, 'even id'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let mut scope = db.begin_scope().unwrap();
        let failed = (1..=5).filter(|id| scope.upsert(&message(*id)).is_err()).count();
        assert_eq!(failed, 2);
        assert_eq!(scope.summary(), ScopeSummary { written: 3, skipped: 2 });

        let summary = scope.commit().unwrap();
        assert_eq!(summary.written + summary.skipped, 5);
        assert_eq!(db.count_messages().unwrap(), 3);
    }
}
