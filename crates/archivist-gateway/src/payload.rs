//! Wire shapes of the platform's JSON payloads. Only the fields the archive
//! needs are decoded; snowflake ids arrive as strings.

use archivist_types::{Attachment, Author, ChannelInfo, ChannelKind, MessagePayload};
use serde::{Deserialize, Deserializer};

fn snowflake<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let raw = String::deserialize(d)?;
    raw.parse().map_err(serde::de::Error::custom)
}

fn opt_snowflake<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    match Option::<String>::deserialize(d)? {
        Some(raw) => raw.parse().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

#[derive(Debug, Deserialize)]
pub struct WireUser {
    #[serde(deserialize_with = "snowflake")]
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
}

impl WireUser {
    /// Display name falls back to the account name when no global name is set.
    pub fn into_author(self) -> Author {
        let display_name = self
            .global_name
            .filter(|name| !name.is_empty())
            .unwrap_or(self.username);

        Author {
            id: self.id,
            display_name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireAttachment {
    #[serde(deserialize_with = "snowflake")]
    pub id: u64,
    pub filename: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct WireMessage {
    #[serde(deserialize_with = "snowflake")]
    pub id: u64,
    #[serde(deserialize_with = "snowflake")]
    pub channel_id: u64,
    #[serde(default, deserialize_with = "opt_snowflake")]
    pub guild_id: Option<u64>,
    #[serde(default)]
    pub author: Option<WireUser>,
    /// Absent on partial updates.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub attachments: Vec<WireAttachment>,
}

impl WireMessage {
    pub fn into_payload(self) -> MessagePayload {
        let id = self.id;
        MessagePayload {
            id,
            channel_id: self.channel_id,
            guild_id: self.guild_id,
            author: self.author.map(WireUser::into_author),
            content: self.content.unwrap_or_default(),
            attachments: self
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    id: a.id,
                    message_id: id,
                    filename: a.filename,
                    url: a.url,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireChannel {
    #[serde(deserialize_with = "snowflake")]
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: u8,
}

impl From<WireChannel> for ChannelInfo {
    fn from(channel: WireChannel) -> Self {
        Self {
            id: channel.id,
            name: channel.name.unwrap_or_else(|| channel.id.to_string()),
            kind: ChannelKind::from_code(channel.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_decodes_and_normalizes() {
        let wire: WireMessage = serde_json::from_str(
            r#"{
                "id": "1100000000000000001",
                "channel_id": "20",
                "guild_id": "1",
                "author": {"id": "42", "username": "grace", "global_name": "Grace H"},
                "content": "hi",
                "attachments": [{"id": "1100000000000000002", "filename": "a.png", "url": "https://cdn/a.png", "size": 10}],
                "tts": false
            }"#,
        )
        .unwrap();

        let payload = wire.into_payload();
        assert_eq!(payload.id, 1_100_000_000_000_000_001);
        assert_eq!(payload.guild_id, Some(1));
        assert_eq!(payload.author.unwrap().display_name, "Grace H");
        assert_eq!(payload.attachments[0].message_id, 1_100_000_000_000_000_001);
    }

    #[test]
    fn test_display_name_falls_back_to_username() {
        let user: WireUser =
            serde_json::from_str(r#"{"id": "7", "username": "henry", "global_name": null}"#).unwrap();
        assert_eq!(user.into_author().display_name, "henry");

        let user: WireUser =
            serde_json::from_str(r#"{"id": "7", "username": "henry", "global_name": ""}"#).unwrap();
        assert_eq!(user.into_author().display_name, "henry");
    }

    #[test]
    fn test_delete_shape_has_no_author() {
        let wire: WireMessage =
            serde_json::from_str(r#"{"id": "5", "channel_id": "6", "guild_id": "1"}"#).unwrap();
        assert!(wire.content.is_none());

        let payload = wire.into_payload();
        assert!(payload.author.is_none());
        assert_eq!(payload.content, "");
    }

    #[test]
    fn test_bad_snowflake_is_rejected() {
        let result = serde_json::from_str::<WireMessage>(r#"{"id": "abc", "channel_id": "6"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_channel_conversion() {
        let channel: WireChannel =
            serde_json::from_str(r#"{"id": "30", "name": "random", "type": 0, "position": 2}"#).unwrap();
        let info = ChannelInfo::from(channel);
        assert_eq!(info.name, "random");
        assert!(info.kind.has_history());
    }
}
