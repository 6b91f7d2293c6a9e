use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::oneshot;

use archivist_db::Database;

use archivist_types::{Attachment, Author, ChannelInfo, ChannelKind, MessagePayload};

use crate::error::PlatformError;
use crate::platform::Platform;

pub const GUILD: u64 = 1;
pub const CONTROL: u64 = 10;
pub const BOT: u64 = 777;

/// One recorded history request: (channel, before, messages returned).
pub type Fetch = (u64, Option<u64>, usize);

/// In-memory platform that serves fixed channel histories and records every
/// outbound call.
#[derive(Default)]
pub struct MockPlatform {
    channels: Vec<ChannelInfo>,
    histories: HashMap<u64, Vec<MessagePayload>>,
    failing_history: HashSet<u64>,
    fail_channel_list: bool,
    sent: Mutex<Vec<(u64, String)>>,
    edits: Mutex<Vec<(u64, u64, String)>>,
    fetches: Mutex<Vec<Fetch>>,
    paged: Mutex<Option<oneshot::Sender<()>>>,
    next_id: AtomicU64,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(900_000),
            ..Self::default()
        }
    }

    pub fn with_channel(mut self, id: u64, name: &str, kind: ChannelKind, messages: usize) -> Self {
        self.channels.push(ChannelInfo { id, name: name.to_string(), kind });
        self.histories.insert(id, history(id, messages));
        self
    }

    pub fn with_failing_history(mut self, channel_id: u64) -> Self {
        self.failing_history.insert(channel_id);
        self
    }

    pub fn with_failing_channel_list(mut self) -> Self {
        self.fail_channel_list = true;
        self
    }

    /// Fires `signal` on the first history request that carries a cursor,
    /// then gives other tasks time to run before serving the page.
    pub fn with_page_signal(self, signal: oneshot::Sender<()>) -> Self {
        *self.paged.lock().unwrap() = Some(signal);
        self
    }

    pub fn sent(&self) -> Vec<(u64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn edits(&self) -> Vec<(u64, u64, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<Fetch> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fetches_for(&self, channel_id: u64) -> Vec<Fetch> {
        self.fetches()
            .into_iter()
            .filter(|(c, _, _)| *c == channel_id)
            .collect()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn guild_channels(&self, _guild_id: u64) -> Result<Vec<ChannelInfo>, PlatformError> {
        if self.fail_channel_list {
            return Err(PlatformError::Transport("connection reset".into()));
        }
        Ok(self.channels.clone())
    }

    async fn channel_messages(
        &self,
        channel_id: u64,
        limit: u32,
        before: Option<u64>,
    ) -> Result<Vec<MessagePayload>, PlatformError> {
        if self.failing_history.contains(&channel_id) {
            return Err(PlatformError::Status { status: 403, body: "Missing Access".into() });
        }

        if before.is_some() {
            let signal = self.paged.lock().unwrap().take();
            if let Some(signal) = signal {
                let _ = signal.send(());
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        }

        let page: Vec<MessagePayload> = self
            .histories
            .get(&channel_id)
            .map(|h| {
                h.iter()
                    .filter(|m| before.is_none_or(|b| m.id < b))
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        self.fetches.lock().unwrap().push((channel_id, before, page.len()));
        Ok(page)
    }

    async fn send_message(&self, channel_id: u64, content: &str) -> Result<u64, PlatformError> {
        self.sent.lock().unwrap().push((channel_id, content.to_string()));
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn edit_message(
        &self,
        channel_id: u64,
        message_id: u64,
        content: &str,
    ) -> Result<(), PlatformError> {
        self.edits
            .lock()
            .unwrap()
            .push((channel_id, message_id, content.to_string()));
        Ok(())
    }
}

/// Makes every later commit fail: each new message row adds a deferred
/// foreign key violation that is only checked at COMMIT.
pub fn break_commits(db: &Database) {
    db.with_conn(|conn| {
        conn.execute_batch(
            "CREATE TABLE commit_guard_parent (id INTEGER PRIMARY KEY);
             CREATE TABLE commit_guard (
                 parent_id INTEGER REFERENCES commit_guard_parent(id) DEFERRABLE INITIALLY DEFERRED
             );
             CREATE TRIGGER guard_messages AFTER INSERT ON messages
             BEGIN INSERT INTO commit_guard (parent_id) VALUES (NEW.message_id); END;",
        )?;
        Ok(())
    })
    .unwrap();
}

/// Removes the archive tables so every store call fails.
pub fn drop_tables(db: &Database) {
    db.with_conn(|conn| {
        conn.execute_batch("DROP TABLE attachments; DROP TABLE messages;")?;
        Ok(())
    })
    .unwrap();
}

/// Simulated history for a channel, newest first, with ids unique per channel.
pub fn history(channel_id: u64, count: usize) -> Vec<MessagePayload> {
    let base = channel_id * 100_000;
    (1..=count as u64)
        .rev()
        .map(|i| payload(base + i, channel_id, &format!("message {}", i)))
        .collect()
}

pub fn payload(id: u64, channel_id: u64, content: &str) -> MessagePayload {
    MessagePayload {
        id,
        channel_id,
        guild_id: Some(GUILD),
        author: Some(Author { id: 42, display_name: "grace".into() }),
        content: content.to_string(),
        attachments: vec![],
    }
}

pub fn attachment(id: u64, message_id: u64, filename: &str) -> Attachment {
    Attachment {
        id,
        message_id,
        filename: filename.to_string(),
        url: format!("https://cdn.example/{}", filename),
    }
}
