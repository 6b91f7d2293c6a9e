use std::sync::Arc;

use archivist_db::{ArchiveError, Database, ScopeSummary};
use archivist_types::{ChannelInfo, Message};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{EngineError, ErrorKind};
use crate::notify;
use crate::platform::Platform;

/// Pages buffered between the crawler and the scope writer.
const PAGE_QUEUE: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub channels: usize,
    pub messages: usize,
    pub skipped_rows: usize,
}

/// Pages every archivable channel's history into the store, one committed
/// scope per channel.
pub struct Crawler<P> {
    db: Arc<Database>,
    platform: Arc<P>,
    control_channel: u64,
    page_size: u32,
}

/// What paging one channel produced.
#[derive(Debug, Default)]
struct Fetched {
    count: usize,
    missing_author: usize,
    error: Option<EngineError>,
}

impl<P: Platform + 'static> Crawler<P> {
    pub fn new(db: Arc<Database>, platform: Arc<P>, control_channel: u64, page_size: u32) -> Self {
        Self {
            db,
            platform,
            control_channel,
            page_size,
        }
    }

    /// Crawls the whole guild. Only a failed channel listing or a failed
    /// commit ends the run early; everything else is logged and skipped.
    pub async fn run(&self, guild_id: u64) -> Result<BackfillSummary, EngineError> {
        let channels = self.platform.guild_channels(guild_id).await?;
        info!(guild_id, channels = channels.len(), "Backfill started");

        let mut summary = BackfillSummary::default();
        for channel in &channels {
            if channel.id == self.control_channel {
                debug!(channel_id = channel.id, "Skipping control channel");
                continue;
            }
            if !channel.kind.has_history() {
                debug!(channel_id = channel.id, kind = ?channel.kind, "Skipping channel without history");
                continue;
            }

            let loaded = self.crawl_channel(channel).await?;
            info!(
                channel_id = channel.id,
                channel = %channel.name,
                written = loaded.written,
                skipped = loaded.skipped,
                "Channel archived"
            );

            summary.channels += 1;
            summary.messages += loaded.written;
            summary.skipped_rows += loaded.skipped;
        }

        info!(
            guild_id,
            channels = summary.channels,
            messages = summary.messages,
            skipped = summary.skipped_rows,
            "Backfill complete"
        );
        Ok(summary)
    }

    /// Streams one channel's history into an open scope. While the scope is
    /// open the crawl only waits on history fetches; status traffic runs on
    /// its own task and failure reports go out after the commit.
    async fn crawl_channel(&self, channel: &ChannelInfo) -> Result<ScopeSummary, EngineError> {
        let status = StatusLine::post(
            self.platform.clone(),
            self.control_channel,
            notify::format_loading(&channel.name),
        );

        let writer = match ScopeWriter::open(self.db.clone(), channel.id).await {
            Ok(writer) => writer,
            Err(e) => {
                status.close().await;
                return Err(e);
            }
        };

        let fetched = self.fetch_history(channel, &status, &writer).await;
        status.update(notify::format_loading_done(&channel.name, fetched.count));

        let committed = writer.finish().await;
        status.close().await;

        if let Some(e) = &fetched.error {
            self.report(&notify::format_backfill_failed(e)).await;
        }

        let mut summary = committed?;
        summary.skipped += fetched.missing_author;
        Ok(summary)
    }

    /// Pages history newest to oldest until a short page, handing each page
    /// to the writer as it arrives. A failed fetch ends paging for this
    /// channel; what was already written stays in the scope.
    async fn fetch_history(&self, channel: &ChannelInfo, status: &StatusLine, writer: &ScopeWriter) -> Fetched {
        let mut fetched = Fetched::default();
        let mut cursor: Option<u64> = None;

        loop {
            status.update(notify::format_loading_progress(&channel.name, fetched.count));

            let page = match self
                .platform
                .channel_messages(channel.id, self.page_size, cursor)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    let e = EngineError::from(e);
                    warn!(
                        kind = %e.kind(),
                        channel_id = channel.id,
                        before = ?cursor,
                        error = %e,
                        "History fetch failed, moving to next channel"
                    );
                    fetched.error = Some(e);
                    break;
                }
            };

            let page_len = page.len();
            fetched.count += page_len;
            if let Some(last) = page.last() {
                cursor = Some(last.id);
            }

            let mut messages = Vec::with_capacity(page_len);
            for payload in page {
                match payload.to_message() {
                    Some(message) => messages.push(message),
                    None => {
                        warn!(message_id = payload.id, channel_id = channel.id, "History message without author, skipping");
                        fetched.missing_author += 1;
                    }
                }
            }

            if !messages.is_empty() && !writer.write(messages).await {
                warn!(channel_id = channel.id, "Archive scope closed early, stopping history fetch");
                break;
            }

            if page_len < self.page_size as usize {
                break;
            }
        }

        fetched
    }

    async fn report(&self, content: &str) {
        if let Err(e) = self.platform.send_message(self.control_channel, content).await {
            warn!(kind = %ErrorKind::NetworkIo, error = %e, "Failed to post report");
        }
    }
}

/// Owns a channel's archive scope on a blocking thread. Pages are upserted
/// as they arrive; the scope commits once the sender side is finished.
struct ScopeWriter {
    pages: mpsc::Sender<Vec<Message>>,
    task: JoinHandle<archivist_db::Result<ScopeSummary>>,
}

impl ScopeWriter {
    /// Returns once the scope holds the store, so every later live write
    /// queues behind the commit.
    async fn open(db: Arc<Database>, channel_id: u64) -> Result<Self, EngineError> {
        let (opened_tx, opened) = oneshot::channel();
        let (pages, mut queue) = mpsc::channel::<Vec<Message>>(PAGE_QUEUE);

        let task = tokio::task::spawn_blocking(move || {
            let mut scope = match db.begin_scope() {
                Ok(scope) => scope,
                Err(e) => {
                    let _ = opened_tx.send(Err(e));
                    return Ok(ScopeSummary::default());
                }
            };
            let _ = opened_tx.send(Ok(()));

            while let Some(page) = queue.blocking_recv() {
                for message in &page {
                    if let Err(e) = scope.upsert(message) {
                        warn!(
                            kind = %ErrorKind::of_archive(&e),
                            message_id = message.id,
                            channel_id,
                            error = %e,
                            "Skipping message during backfill"
                        );
                    }
                }
            }

            scope.commit()
        });

        match opened.await {
            Ok(Ok(())) => Ok(Self { pages, task }),
            Ok(Err(e)) => Err(e.into()),
            // Only a panic drops the signal unsent, and it poisons the store lock
            Err(_) => match task.await {
                Err(e) => Err(e.into()),
                Ok(_) => Err(ArchiveError::LockPoisoned.into()),
            },
        }
    }

    /// Queues a page. False when the writer has already stopped.
    async fn write(&self, page: Vec<Message>) -> bool {
        self.pages.send(page).await.is_ok()
    }

    async fn finish(self) -> Result<ScopeSummary, EngineError> {
        let Self { pages, task } = self;
        drop(pages);
        Ok(task.await??)
    }
}

/// The per-channel status message, posted and edited in order from its own
/// task.
struct StatusLine {
    updates: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl StatusLine {
    fn post<P: Platform + 'static>(platform: Arc<P>, channel_id: u64, initial: String) -> Self {
        let (updates, mut queue) = mpsc::unbounded_channel::<String>();

        let task = tokio::spawn(async move {
            let status_id = match platform.send_message(channel_id, &initial).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(kind = %ErrorKind::NetworkIo, error = %e, "Failed to post backfill status");
                    return;
                }
            };

            while let Some(content) = queue.recv().await {
                if let Err(e) = platform.edit_message(channel_id, status_id, &content).await {
                    debug!(kind = %ErrorKind::NetworkIo, error = %e, "Failed to update backfill progress");
                }
            }
        });

        Self { updates, task }
    }

    fn update(&self, content: String) {
        let _ = self.updates.send(content);
    }

    async fn close(self) {
        let Self { updates, task } = self;
        drop(updates);
        if let Err(e) = task.await {
            warn!(error = %e, "Backfill status task failed");
        }
    }
}
