/// Database row types. These map directly to SQLite rows and stay distinct
/// from the archivist-types model so the storage layout can evolve on its own.
use archivist_types::{Attachment, Author, Message};

pub struct MessageRow {
    pub message_id: u64,
    pub user_id: u64,
    pub username: String,
    pub content: String,
}

pub struct AttachmentRow {
    pub attachment_id: u64,
    pub message_id: u64,
    pub filename: String,
    pub url: String,
}

impl MessageRow {
    pub fn into_message(self, attachments: Vec<Attachment>) -> Message {
        Message {
            id: self.message_id,
            author: Author {
                id: self.user_id,
                display_name: self.username,
            },
            content: self.content,
            attachments,
        }
    }
}

impl From<AttachmentRow> for Attachment {
    fn from(row: AttachmentRow) -> Self {
        Self {
            id: row.attachment_id,
            message_id: row.message_id,
            filename: row.filename,
            url: row.url,
        }
    }
}
