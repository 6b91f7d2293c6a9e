use crate::models::{Attachment, Author, Message};

/// Normalized projection of a platform message event.
///
/// Delete notifications carry no author or content, so those fields are
/// optional or empty depending on the event kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePayload {
    pub id: u64,
    pub channel_id: u64,
    pub guild_id: Option<u64>,
    pub author: Option<Author>,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

impl MessagePayload {
    /// Converts the payload into an archivable message. Returns `None` when
    /// the platform did not report an author.
    pub fn to_message(&self) -> Option<Message> {
        let author = self.author.clone()?;
        let attachments = self
            .attachments
            .iter()
            .map(|a| Attachment {
                message_id: self.id,
                ..a.clone()
            })
            .collect();

        Some(Message {
            id: self.id,
            author,
            content: self.content.clone(),
            attachments,
        })
    }
}

/// Message events consumed by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    Created(MessagePayload),
    Edited(MessagePayload),
    Deleted(MessagePayload),
}

impl PlatformEvent {
    pub fn payload(&self) -> &MessagePayload {
        match self {
            Self::Created(p) | Self::Edited(p) | Self::Deleted(p) => p,
        }
    }

    pub fn channel_id(&self) -> u64 {
        self.payload().channel_id
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Edited(_) => "edited",
            Self::Deleted(_) => "deleted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_message_rewrites_attachment_owner() {
        let payload = MessagePayload {
            id: 42,
            channel_id: 1,
            guild_id: Some(9),
            author: Some(Author { id: 3, display_name: "bob".into() }),
            content: "hi".into(),
            attachments: vec![Attachment {
                id: 43,
                message_id: 0,
                filename: "f.txt".into(),
                url: "u".into(),
            }],
        };

        let message = payload.to_message().unwrap();
        assert_eq!(message.id, 42);
        assert_eq!(message.attachments[0].message_id, 42);
    }

    #[test]
    fn test_to_message_requires_author() {
        let payload = MessagePayload {
            id: 1,
            channel_id: 2,
            guild_id: None,
            author: None,
            content: String::new(),
            attachments: vec![],
        };
        assert!(payload.to_message().is_none());
        assert_eq!(PlatformEvent::Deleted(payload).channel_id(), 2);
    }
}
