pub mod backfill;
pub mod error;
pub mod ingest;
pub mod notify;
pub mod platform;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use archivist_db::Database;

pub use backfill::{BackfillSummary, Crawler};
pub use error::{EngineError, ErrorKind, PlatformError};
pub use ingest::{Outcome, Pipeline};
pub use platform::Platform;

/// History page size requested from the platform during backfill.
pub const HISTORY_PAGE_SIZE: u32 = 100;

pub const DEFAULT_COMMAND_PREFIX: &str = "/init_db";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Channel that receives commands and every report. Never archived.
    pub control_channel: u64,
    /// The engine's own user id; its messages are never archived.
    pub self_id: u64,
    pub command_prefix: String,
    pub page_size: u32,
}

impl EngineConfig {
    pub fn new(control_channel: u64, self_id: u64) -> Self {
        Self {
            control_channel,
            self_id,
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            page_size: HISTORY_PAGE_SIZE,
        }
    }
}

/// Runs a store operation off the async runtime.
pub(crate) async fn with_store<F, T>(db: &Arc<Database>, f: F) -> Result<T, EngineError>
where
    F: FnOnce(&Database) -> archivist_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    Ok(tokio::task::spawn_blocking(move || f(db.as_ref())).await??)
}
