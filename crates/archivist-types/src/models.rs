/// Snapshot of a message author at the time the message was archived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: u64,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: u64,
    /// Owning message. Always equal to the parent `Message::id` once stored.
    pub message_id: u64,
    pub filename: String,
    pub url: String,
}

/// An archived message. `content` is the latest known version, never a history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u64,
    pub author: Author,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Copy of this message with new content and author display name.
    /// The author id is immutable and always retained.
    pub fn edited(&self, content: &str, display_name: Option<&str>) -> Self {
        Self {
            id: self.id,
            author: Author {
                id: self.author.id,
                display_name: display_name
                    .map(str::to_string)
                    .unwrap_or_else(|| self.author.display_name.clone()),
            },
            content: content.to_string(),
            attachments: self.attachments.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Announcement,
    Voice,
    Category,
    Other(u8),
}

impl ChannelKind {
    /// Maps the platform's numeric channel type.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Text,
            2 => Self::Voice,
            4 => Self::Category,
            5 => Self::Announcement,
            other => Self::Other(other),
        }
    }

    /// Channels whose message history can be paged and archived.
    pub fn has_history(self) -> bool {
        matches!(self, Self::Text | Self::Announcement)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: u64,
    pub name: String,
    pub kind: ChannelKind,
}
