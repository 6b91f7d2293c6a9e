//! Audit report rendering. Everything here is a pure function of its inputs.

use archivist_types::{Attachment, Author};

/// Rendered in place of empty content.
pub const EMPTY_PLACEHOLDER: &str = "<Empty>";

const FENCE: &str = "```";

/// Wraps content in a code fence. Backticks inside the content become `'`
/// so the fence cannot be closed early by the message itself.
pub fn escape_content(content: &str) -> String {
    if content.is_empty() {
        return EMPTY_PLACEHOLDER.to_string();
    }

    format!("{FENCE}{}{FENCE}", content.replace('`', "'"))
}

pub fn format_edit(
    id: u64,
    channel_id: u64,
    author: &Author,
    old_content: &str,
    new_content: &str,
) -> String {
    format!(
        "Message altered:\n\tID={}\n\tChannelID={}\n\tUser: {} <@{}>\n\tBefore:{}\n\tAfter:{}",
        id,
        channel_id,
        author.display_name,
        author.id,
        escape_content(old_content),
        escape_content(new_content),
    )
}

pub fn format_delete(
    id: u64,
    channel_id: u64,
    author: &Author,
    content: &str,
    attachments: &[Attachment],
) -> String {
    let mut report = format!(
        "Message deleted:\n\tID={}\n\tChannelID={}\n\tUser: {} <@{}>\n\tContent:{}",
        id,
        channel_id,
        author.display_name,
        author.id,
        escape_content(content),
    );

    if !attachments.is_empty() {
        report.push_str("\n\tAttachments:");
        for attachment in attachments {
            report.push_str(&format!(
                "\n\tID: {} [{}]({}):",
                attachment.id, attachment.filename, attachment.url
            ));
        }
    }

    report
}

/// Delete of a message the archive never saw. Only the raw ids are known.
pub fn format_delete_unknown(id: u64, channel_id: u64) -> String {
    format!(
        "Message deleted, but no data stored:\n\tID={}\n\tChannelID={}",
        id, channel_id
    )
}

/// The archive could not be read, so the prior state is unknown.
pub fn format_lookup_failed(action: &str, id: u64, channel_id: u64) -> String {
    format!(
        "Message {}, but the archive lookup failed:\n\tID={}\n\tChannelID={}",
        action, id, channel_id
    )
}

pub fn format_archive_failed(id: u64, channel_id: u64) -> String {
    format!(
        "Failed to archive message:\n\tID={}\n\tChannelID={}",
        id, channel_id
    )
}

// -- Backfill --

pub const BACKFILL_STARTED: &str = "Starting DB Init!";
pub const BACKFILL_DONE: &str = "DB Init Done!";

pub fn format_backfill_failed(err: &impl std::fmt::Display) -> String {
    format!("Failed to init db! Err: {}", err)
}

pub fn format_loading(channel_name: &str) -> String {
    format!("Loading {}!", channel_name)
}

pub fn format_loading_progress(channel_name: &str, count: usize) -> String {
    format!("Loading {} ({}+)!", channel_name, count)
}

pub fn format_loading_done(channel_name: &str, count: usize) -> String {
    format!("Loading {} ({})!", channel_name, count)
}
