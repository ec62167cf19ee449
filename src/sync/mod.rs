//! Sync Module - Mailbox Synchronization Engine
//!
//! Pulls recent messages from connected mailboxes, keeps the ones exchanged
//! with pipeline contacts and companies, and stores them against the CRM
//! entity they concern.
//!
//! Flow per run:
//! - Enumerate participating connections (user or scheduler trigger)
//! - Per connection: relevance set, token refresh, listing, dedup
//! - Per new message: fetch and parse, resolve entity, persist

pub mod enumerator;
pub mod manager;
pub mod models;
pub mod relevance;
pub mod resolver;
pub mod scheduler;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use enumerator::enumerate_connections;
pub use manager::{SyncManager, SyncManagerError};
pub use models::{
    CallerKind, ConnectionCategory, ConnectionOutcome, Direction, RunContext, SyncResult,
    LIST_PAGE_SIZE, LIST_WINDOW_DAYS, MAX_BODY_CHARS, MAX_MESSAGES_PER_RUN, REFRESH_MARGIN_SECS,
};
pub use relevance::{build_relevance_set, normalize_address, RelevanceSet};
pub use resolver::{counterpart, resolve, Resolution};
pub use scheduler::{BackgroundScheduler, SchedulerConfig, SchedulerError, SCHEDULER_SETTINGS_KEY};
