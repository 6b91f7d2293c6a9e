use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Archive DB: running migration v1 (messages + attachments)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS messages (
                message_id  INTEGER NOT NULL PRIMARY KEY,
                user_id     INTEGER NOT NULL,
                username    TEXT NOT NULL DEFAULT '',
                content     TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS attachments (
                attachment_id   INTEGER NOT NULL PRIMARY KEY,
                message_id      INTEGER NOT NULL REFERENCES messages(message_id),
                filename        TEXT NOT NULL DEFAULT '',
                url             TEXT NOT NULL DEFAULT '',
                position        INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_attachments_message
                ON attachments(message_id, position);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
