use async_trait::async_trait;

use archivist_types::{ChannelInfo, MessagePayload};

use crate::error::PlatformError;

/// The chat platform as seen by the engine: channel listing, history paging
/// and posting to a channel. Implementations own the network protocol.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn guild_channels(&self, guild_id: u64) -> Result<Vec<ChannelInfo>, PlatformError>;

    /// One page of history, newest first. `before` excludes that id and
    /// everything newer; `None` starts from the most recent message.
    async fn channel_messages(
        &self,
        channel_id: u64,
        limit: u32,
        before: Option<u64>,
    ) -> Result<Vec<MessagePayload>, PlatformError>;

    /// Posts a message with mentions suppressed. Returns the new message id.
    async fn send_message(&self, channel_id: u64, content: &str) -> Result<u64, PlatformError>;

    async fn edit_message(
        &self,
        channel_id: u64,
        message_id: u64,
        content: &str,
    ) -> Result<(), PlatformError>;
}
