use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{Value, json};
use tracing::{debug, warn};

use archivist_engine::{Platform, PlatformError};
use archivist_types::{ChannelInfo, MessagePayload};

use crate::payload::{WireChannel, WireMessage};

/// Attempts per request when the platform answers 429.
const MAX_ATTEMPTS: u32 = 3;

/// Longest message the platform accepts.
const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
struct RateLimited {
    retry_after: f64,
}

/// Bot-authenticated REST client for the platform API.
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, PlatformError> {
        let mut auth = HeaderValue::from_str(&format!("Bot {}", token))
            .map_err(|e| PlatformError::Transport(format!("invalid token: {}", e)))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("DiscordBot (archivist, ", env!("CARGO_PKG_VERSION"), ")")),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(transport)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, PlatformError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 1;

        loop {
            let mut req = self.http.request(method.clone(), &url);
            if let Some(body) = body {
                req = req.json(body);
            }

            let resp = req.send().await.map_err(transport)?;
            let status = resp.status();

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_ATTEMPTS {
                let wait = resp
                    .json::<RateLimited>()
                    .await
                    .map(|r| r.retry_after)
                    .unwrap_or(1.0);
                warn!(path, attempt, retry_after = wait, "Rate limited, retrying");
                tokio::time::sleep(Duration::from_secs_f64(wait.max(0.0))).await;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(PlatformError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            debug!(%method, path, status = status.as_u16(), "Platform request complete");
            return resp
                .json::<T>()
                .await
                .map_err(|e| PlatformError::Decode(e.to_string()));
        }
    }
}

#[async_trait]
impl Platform for RestClient {
    async fn guild_channels(&self, guild_id: u64) -> Result<Vec<ChannelInfo>, PlatformError> {
        let channels: Vec<WireChannel> = self
            .request(Method::GET, &format!("/guilds/{}/channels", guild_id), None)
            .await?;
        Ok(channels.into_iter().map(ChannelInfo::from).collect())
    }

    async fn channel_messages(
        &self,
        channel_id: u64,
        limit: u32,
        before: Option<u64>,
    ) -> Result<Vec<MessagePayload>, PlatformError> {
        let mut path = format!("/channels/{}/messages?limit={}", channel_id, limit);
        if let Some(before) = before {
            path.push_str(&format!("&before={}", before));
        }

        let messages: Vec<WireMessage> = self.request(Method::GET, &path, None).await?;
        Ok(messages.into_iter().map(WireMessage::into_payload).collect())
    }

    async fn send_message(&self, channel_id: u64, content: &str) -> Result<u64, PlatformError> {
        let body = message_body(content);
        let sent: WireMessage = self
            .request(
                Method::POST,
                &format!("/channels/{}/messages", channel_id),
                Some(&body),
            )
            .await?;
        Ok(sent.id)
    }

    async fn edit_message(
        &self,
        channel_id: u64,
        message_id: u64,
        content: &str,
    ) -> Result<(), PlatformError> {
        let body = message_body(content);
        let _: IgnoredAny = self
            .request(
                Method::PATCH,
                &format!("/channels/{}/messages/{}", channel_id, message_id),
                Some(&body),
            )
            .await?;
        Ok(())
    }
}

/// Outbound message body. Mentions are never resolved so quoted content
/// cannot ping anyone.
fn message_body(content: &str) -> Value {
    json!({
        "content": clip(content),
        "allowed_mentions": { "parse": [] },
    })
}

fn clip(content: &str) -> String {
    if content.chars().count() <= MAX_CONTENT_CHARS {
        return content.to_string();
    }

    let mut clipped: String = content.chars().take(MAX_CONTENT_CHARS - 3).collect();
    clipped.push_str("...");
    clipped
}

fn transport(err: reqwest::Error) -> PlatformError {
    PlatformError::Transport(err.to_string())
}
