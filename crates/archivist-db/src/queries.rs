use archivist_types::{Attachment, Message};
use rusqlite::{Connection, ErrorCode, params};
use tracing::warn;

use crate::Database;
use crate::error::{ArchiveError, Result};
use crate::models::{AttachmentRow, MessageRow};

const UPSERT_MESSAGE: &str = "
    INSERT INTO messages (message_id, user_id, username, content)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(message_id) DO UPDATE SET
        user_id = excluded.user_id,
        username = excluded.username,
        content = excluded.content";

const UPSERT_ATTACHMENT: &str = "
    INSERT INTO attachments (attachment_id, message_id, filename, url, position)
    VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT(attachment_id) DO UPDATE SET
        message_id = excluded.message_id,
        filename = excluded.filename,
        url = excluded.url,
        position = excluded.position";

impl Database {
    // -- Messages --

    /// Strict insert of a message and its attachments. Fails with
    /// `Conflict` when the id is already archived; the store is left unchanged.
    pub fn put(&self, message: &Message) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            tx.execute(
                "INSERT INTO messages (message_id, user_id, username, content) VALUES (?1, ?2, ?3, ?4)",
                params![
                    message.id,
                    message.author.id,
                    message.author.display_name,
                    message.content
                ],
            )
            .map_err(|e| conflict_or_storage(e, message.id))?;

            for (position, attachment) in message.attachments.iter().enumerate() {
                tx.execute(
                    "INSERT INTO attachments (attachment_id, message_id, filename, url, position) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![attachment.id, message.id, attachment.filename, attachment.url, position],
                )
                .map_err(|e| conflict_or_storage(e, message.id))?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    /// Insert-or-replace by id, in its own transaction.
    pub fn upsert(&self, message: &Message) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            upsert_message(&tx, message)?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get(&self, id: u64) -> Result<Message> {
        self.with_conn(|conn| {
            let row = query_message(conn, id)?.ok_or(ArchiveError::NotFound(id))?;
            let attachments = query_attachments(conn, id)?;
            Ok(row.into_message(attachments))
        })
    }

    // -- Attachments --

    pub fn get_attachments(&self, message_id: u64) -> Result<Vec<Attachment>> {
        self.with_conn(|conn| query_attachments(conn, message_id))
    }

    // -- Diagnostics --

    pub fn count_messages(&self) -> Result<u64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?)
        })
    }

    pub fn count_attachments(&self) -> Result<u64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM attachments", [], |r| r.get(0))?)
        })
    }
}

/// Writes one message row and replaces its attachment set. Callers own the
/// surrounding transaction or savepoint.
pub(crate) fn upsert_message(conn: &Connection, message: &Message) -> rusqlite::Result<()> {
    conn.execute(
        UPSERT_MESSAGE,
        params![
            message.id,
            message.author.id,
            message.author.display_name,
            message.content
        ],
    )?;

    if message.attachments.is_empty() {
        conn.execute("DELETE FROM attachments WHERE message_id = ?1", [message.id])?;
    } else {
        // Drop attachments that are no longer part of the set
        let placeholders: Vec<String> = (2..=message.attachments.len() + 1)
            .map(|i| format!("?{}", i))
            .collect();
        let sql = format!(
            "DELETE FROM attachments WHERE message_id = ?1 AND attachment_id NOT IN ({})",
            placeholders.join(", ")
        );

        let mut ids: Vec<&dyn rusqlite::types::ToSql> = Vec::with_capacity(message.attachments.len() + 1);
        ids.push(&message.id);
        ids.extend(
            message
                .attachments
                .iter()
                .map(|a| &a.id as &dyn rusqlite::types::ToSql),
        );
        conn.execute(&sql, ids.as_slice())?;
    }

    let mut stmt = conn.prepare_cached(UPSERT_ATTACHMENT)?;
    for (position, attachment) in message.attachments.iter().enumerate() {
        stmt.execute(params![
            attachment.id,
            message.id,
            attachment.filename,
            attachment.url,
            position
        ])?;
    }

    Ok(())
}

fn query_message(conn: &Connection, id: u64) -> Result<Option<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT message_id, user_id, username, content FROM messages WHERE message_id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(MessageRow {
                message_id: row.get(0)?,
                user_id: row.get(1)?,
                username: row.get(2)?,
                content: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Loads a message's attachments in stored order. Rows that fail to decode
/// are logged and skipped so one bad row never hides the message.
fn query_attachments(conn: &Connection, message_id: u64) -> Result<Vec<Attachment>> {
    let mut stmt = conn.prepare(
        "SELECT attachment_id, message_id, filename, url
         FROM attachments
         WHERE message_id = ?1
         ORDER BY position, attachment_id",
    )?;

    let rows = stmt.query_map([message_id], |row| {
        Ok(AttachmentRow {
            attachment_id: row.get(0)?,
            message_id: row.get(1)?,
            filename: row.get(2)?,
            url: row.get(3)?,
        })
    })?;

    let mut attachments = Vec::new();
    for row in rows {
        match row {
            Ok(row) => attachments.push(row.into()),
            Err(e) => warn!(message_id, error = %e, "Skipping unreadable attachment row"),
        }
    }

    Ok(attachments)
}

fn conflict_or_storage(err: rusqlite::Error, id: u64) -> ArchiveError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            ArchiveError::Conflict(id)
        }
        other => ArchiveError::Storage(other),
    }
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
