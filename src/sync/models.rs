//! Sync Data Models
//!
//! Run context, connection categories, message direction, run results and
//! the engine's fixed policy limits.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

// ============================================================================
// Policy limits
// ============================================================================

/// Recent window probed by the lister, in days
pub const LIST_WINDOW_DAYS: u32 = 7;

/// Page size of the listing probe
pub const LIST_PAGE_SIZE: u32 = 50;

/// New messages fetched per connection and run
pub const MAX_MESSAGES_PER_RUN: usize = 20;

/// Stored body size, in characters
pub const MAX_BODY_CHARS: usize = 50_000;

/// Tokens expiring within this many seconds are refreshed first
pub const REFRESH_MARGIN_SECS: i64 = 60;

// ============================================================================
// Run context
// ============================================================================

/// Who started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerKind {
    /// An authenticated end user
    User,
    /// The time-based scheduler (non-privileged credential)
    Scheduler,
}

/// Explicit run context, built once at entry and passed down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub caller_kind: CallerKind,
    pub workspace_id: Option<String>,
    pub user_id: Option<String>,
}

impl RunContext {
    pub fn scheduler() -> Self {
        Self {
            caller_kind: CallerKind::Scheduler,
            workspace_id: None,
            user_id: None,
        }
    }

    pub fn user(user_id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            caller_kind: CallerKind::User,
            workspace_id: Some(workspace_id.into()),
            user_id: Some(user_id.into()),
        }
    }
}

// ============================================================================
// Connection category
// ============================================================================

/// Which OAuth client identity a mailbox was linked with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionCategory {
    /// A user's own mailbox
    Personal,
    /// A mailbox shared by the whole workspace
    Workspace,
}

impl ConnectionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionCategory::Personal => "personal",
            ConnectionCategory::Workspace => "workspace",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "personal" => Some(ConnectionCategory::Personal),
            "workspace" => Some(ConnectionCategory::Workspace),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for ConnectionCategory {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ConnectionCategory {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()
            .and_then(|s| ConnectionCategory::parse(s).ok_or(FromSqlError::InvalidType))
    }
}

// ============================================================================
// Message direction
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// Inbound when the mailbox itself is the primary recipient
    pub fn derive(mailbox_address: &str, primary_to: Option<&str>) -> Self {
        match primary_to {
            Some(to) if to.eq_ignore_ascii_case(mailbox_address.trim()) => Direction::Inbound,
            _ => Direction::Outbound,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

impl ToSql for Direction {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Direction {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "inbound" => Ok(Direction::Inbound),
            "outbound" => Ok(Direction::Outbound),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of one run, as returned to the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub synced: usize,
    pub connections: usize,
    /// `"<mailbox address>: <message>"` entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Per-connection counters, logged at the end of each connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOutcome {
    pub listed: usize,
    pub fetched: usize,
    pub synced: usize,
    pub irrelevant: usize,
    pub duplicates: usize,
    pub fetch_failures: usize,
    pub insert_failures: usize,
    /// Skipped before any provider call because nothing is tracked
    pub no_tracked_addresses: bool,
}
