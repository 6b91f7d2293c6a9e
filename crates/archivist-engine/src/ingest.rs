use std::sync::Arc;

use archivist_db::{ArchiveError, Database};
use archivist_types::{MessagePayload, PlatformEvent};
use tracing::{debug, error, info, trace, warn};

use crate::backfill::Crawler;
use crate::error::ErrorKind;
use crate::platform::Platform;
use crate::{EngineConfig, notify, with_store};

/// What handling a single event amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Self-authored or control-channel traffic.
    Ignored,
    /// First capture of a message.
    Archived,
    /// The message was already stored; the record was upserted instead.
    Converged,
    /// An edit or delete was reported to the control channel.
    Reported,
    /// Nothing to reconcile against, or the payload was unusable.
    Dropped,
    /// The backfill command ran (successfully or not).
    Backfilled,
    /// A store failure was reported to the control channel.
    Failed,
}

/// Turns platform events into store writes and audit reports.
///
/// Every event produces at most one store mutation and at most one report,
/// except the backfill command.
pub struct Pipeline<P> {
    db: Arc<Database>,
    platform: Arc<P>,
    config: Arc<EngineConfig>,
}

impl<P> Clone for Pipeline<P> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            platform: self.platform.clone(),
            config: self.config.clone(),
        }
    }
}

impl<P: Platform + 'static> Pipeline<P> {
    pub fn new(db: Arc<Database>, platform: Arc<P>, config: EngineConfig) -> Self {
        Self {
            db,
            platform,
            config: Arc::new(config),
        }
    }

    pub async fn handle(&self, event: PlatformEvent) -> Outcome {
        trace!(kind = event.kind(), channel_id = event.channel_id(), "Handling event");
        match event {
            PlatformEvent::Created(payload) => self.on_created(payload).await,
            PlatformEvent::Edited(payload) => self.on_edited(payload).await,
            PlatformEvent::Deleted(payload) => self.on_deleted(payload).await,
        }
    }

    async fn on_created(&self, payload: MessagePayload) -> Outcome {
        if payload
            .author
            .as_ref()
            .is_some_and(|a| a.id == self.config.self_id)
        {
            return Outcome::Ignored;
        }

        if payload.channel_id == self.config.control_channel {
            if payload.content.starts_with(&self.config.command_prefix) {
                return self.run_backfill(&payload).await;
            }
            return Outcome::Ignored;
        }

        let Some(message) = payload.to_message() else {
            warn!(message_id = payload.id, channel_id = payload.channel_id, "Created event without author, dropping");
            return Outcome::Dropped;
        };

        let result = with_store(&self.db, move |db| match db.put(&message) {
            Err(ArchiveError::Conflict(id)) => {
                debug!(message_id = id, "Message already archived, converging with upsert");
                db.upsert(&message).map(|()| Outcome::Converged)
            }
            other => other.map(|()| Outcome::Archived),
        })
        .await;

        match result {
            Ok(outcome) => {
                debug!(message_id = payload.id, channel_id = payload.channel_id, ?outcome, "Message archived");
                outcome
            }
            Err(e) => {
                error!(
                    kind = %e.kind(),
                    message_id = payload.id,
                    channel_id = payload.channel_id,
                    error = %e,
                    "Failed to archive message"
                );
                self.report(&notify::format_archive_failed(payload.id, payload.channel_id))
                    .await;
                Outcome::Failed
            }
        }
    }

    async fn on_edited(&self, payload: MessagePayload) -> Outcome {
        if payload.channel_id == self.config.control_channel {
            return Outcome::Ignored;
        }

        let id = payload.id;
        let stored = match with_store(&self.db, move |db| db.get(id)).await {
            Ok(stored) => stored,
            Err(e) if e.is_not_found() => {
                info!(message_id = id, channel_id = payload.channel_id, "Edit for unarchived message, nothing to compare");
                return Outcome::Dropped;
            }
            Err(e) => {
                error!(kind = %e.kind(), message_id = id, channel_id = payload.channel_id, error = %e, "Archive lookup failed for edit");
                self.report(&notify::format_lookup_failed("altered", id, payload.channel_id))
                    .await;
                return Outcome::Failed;
            }
        };

        let report = notify::format_edit(
            id,
            payload.channel_id,
            &stored.author,
            &stored.content,
            &payload.content,
        );
        self.report(&report).await;

        let updated = stored.edited(
            &payload.content,
            payload.author.as_ref().map(|a| a.display_name.as_str()),
        );
        // The edit report is already out; a failed write is logged, not reported twice
        if let Err(e) = with_store(&self.db, move |db| db.upsert(&updated)).await {
            error!(kind = %e.kind(), message_id = id, channel_id = payload.channel_id, error = %e, "Failed to store edited message");
        }

        Outcome::Reported
    }

    /// Reports a delete. The archived row is kept.
    async fn on_deleted(&self, payload: MessagePayload) -> Outcome {
        if payload.channel_id == self.config.control_channel {
            return Outcome::Ignored;
        }

        let id = payload.id;
        let report = match with_store(&self.db, move |db| db.get(id)).await {
            Ok(stored) => notify::format_delete(
                id,
                payload.channel_id,
                &stored.author,
                &stored.content,
                &stored.attachments,
            ),
            Err(e) if e.is_not_found() => {
                debug!(message_id = id, channel_id = payload.channel_id, "Deleted message was never archived");
                notify::format_delete_unknown(id, payload.channel_id)
            }
            Err(e) => {
                error!(kind = %e.kind(), message_id = id, channel_id = payload.channel_id, error = %e, "Archive lookup failed for delete");
                self.report(&notify::format_lookup_failed("deleted", id, payload.channel_id))
                    .await;
                return Outcome::Failed;
            }
        };

        self.report(&report).await;
        Outcome::Reported
    }

    async fn run_backfill(&self, command: &MessagePayload) -> Outcome {
        let Some(guild_id) = command.guild_id else {
            warn!(message_id = command.id, "Backfill command outside a guild, ignoring");
            self.report(&notify::format_backfill_failed(&"command was not posted in a guild"))
                .await;
            return Outcome::Backfilled;
        };

        info!(guild_id, "Backfill requested");
        self.report(notify::BACKFILL_STARTED).await;

        let crawler = Crawler::new(
            self.db.clone(),
            self.platform.clone(),
            self.config.control_channel,
            self.config.page_size,
        );

        match crawler.run(guild_id).await {
            Ok(_) => self.report(notify::BACKFILL_DONE).await,
            Err(e) => {
                error!(kind = %e.kind(), guild_id, error = %e, "Backfill aborted");
                self.report(&notify::format_backfill_failed(&e)).await;
            }
        }

        Outcome::Backfilled
    }

    async fn report(&self, content: &str) {
        if let Err(e) = self
            .platform
            .send_message(self.config.control_channel, content)
            .await
        {
            warn!(kind = %ErrorKind::NetworkIo, error = %e, "Failed to post report");
        }
    }
}
