pub mod events;
pub mod models;

pub use events::{MessagePayload, PlatformEvent};
pub use models::{Attachment, Author, ChannelInfo, ChannelKind, Message};
