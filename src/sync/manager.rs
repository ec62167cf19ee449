//! Sync Manager - Orchestrates mailbox synchronization runs
//!
//! For every participating connection:
//! - Builds the workspace relevance set
//! - Refreshes the access token when it is about to expire
//! - Lists recent message ids and drops the ones already stored
//! - Fetches, resolves and stores the remaining messages
//! - Advances the sync cursor
//!
//! Failures are isolated per connection and per message; a run always
//! completes and reports what went wrong.

use super::enumerator::enumerate_connections;
use super::models::{
    ConnectionOutcome, Direction, RunContext, SyncResult, LIST_PAGE_SIZE, LIST_WINDOW_DAYS,
    MAX_BODY_CHARS, MAX_MESSAGES_PER_RUN,
};
use super::relevance::{build_relevance_set, RelevanceSet};
use super::resolver::{resolve, Resolution};
use crate::config::AppConfig;
use crate::db::{Database, DbError, MailboxConnection, NewSyncedMessage};
use crate::mail::{truncate_chars, GmailClient, MailError, ParsedMessage};
use crate::oauth::{needs_refresh, refresh_access_token, OAuthClients, OAuthError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Sync manager - main orchestrator
#[derive(Clone)]
pub struct SyncManager {
    db: Arc<Database>,
    gmail: GmailClient,
    oauth: Arc<OAuthClients>,
    scheduler_key: Arc<String>,
    provider_timeout: Duration,
    /// Serializes runs so a connection is never processed twice at once
    run_lock: Arc<Mutex<()>>,
}

impl SyncManager {
    pub fn new(db: Arc<Database>, config: &AppConfig) -> Result<Self, SyncManagerError> {
        let gmail = GmailClient::new(config.gmail_api_base.clone(), config.provider_timeout)
            .map_err(|e| SyncManagerError::Config(e.to_string()))?;

        Ok(Self {
            db,
            gmail,
            oauth: Arc::new(config.oauth.clone()),
            scheduler_key: Arc::new(config.scheduler_key.clone()),
            provider_timeout: config.provider_timeout,
            run_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    // ========================================================================
    // Caller resolution
    // ========================================================================

    /// Build the run context for a bearer credential
    ///
    /// The scheduler key yields a scheduler run; anything else must be a live
    /// user session whose user has an active workspace.
    pub fn context_for_credential(&self, credential: Option<&str>) -> Result<RunContext, SyncManagerError> {
        let token = credential
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(SyncManagerError::Unauthorized)?;

        if token == self.scheduler_key.as_str() {
            return Ok(RunContext::scheduler());
        }

        let user_id = self.db
            .get_session_user(token)
            .map_err(|e| SyncManagerError::Database(format!("Failed to resolve session: {}", e)))?
            .ok_or(SyncManagerError::Unauthorized)?;

        let workspace_id = self.db
            .get_active_workspace(&user_id)
            .map_err(|e| SyncManagerError::Database(format!("Failed to resolve workspace: {}", e)))?
            .ok_or(SyncManagerError::NoWorkspace)?;

        Ok(RunContext::user(user_id, workspace_id))
    }

    // ========================================================================
    // Sync Operations
    // ========================================================================

    /// Run one sync pass for every connection `ctx` covers
    pub async fn run(&self, ctx: &RunContext) -> Result<SyncResult, SyncManagerError> {
        let _guard = self.run_lock.lock().await;

        let connections = enumerate_connections(&self.db, ctx)
            .map_err(|e| SyncManagerError::Database(format!("Failed to load connections: {}", e)))?;

        log::info!(
            "Mail sync started ({:?}): {} connection(s)",
            ctx.caller_kind,
            connections.len()
        );

        let mut result = SyncResult {
            success: true,
            synced: 0,
            connections: connections.len(),
            errors: Vec::new(),
        };

        for connection in &connections {
            match self.sync_connection(connection).await {
                Ok(outcome) if outcome.no_tracked_addresses => {
                    log::info!("Skipped {}: no tracked addresses in workspace", connection.email);
                }
                Ok(outcome) => {
                    result.synced += outcome.synced;
                    log::info!(
                        "Synced {} ({}): listed={}, fetched={}, synced={}, irrelevant={}, duplicates={}, fetch_failures={}, failed={}",
                        connection.email,
                        connection.category,
                        outcome.listed,
                        outcome.fetched,
                        outcome.synced,
                        outcome.irrelevant,
                        outcome.duplicates,
                        outcome.fetch_failures,
                        outcome.insert_failures,
                    );
                }
                Err(e) => {
                    log::warn!("Mail sync failed for {}: {}", connection.email, e);
                    result.errors.push(format!("{}: {}", connection.email, e));
                }
            }
        }

        log::info!(
            "Mail sync finished: synced={}, connections={}, errors={}",
            result.synced,
            result.connections,
            result.errors.len()
        );

        Ok(result)
    }

    /// Process one connection
    async fn sync_connection(&self, connection: &MailboxConnection) -> Result<ConnectionOutcome, ConnectionError> {
        let mut outcome = ConnectionOutcome::default();
        let workspace_id = connection.workspace_id.as_str();

        let relevance = build_relevance_set(&self.db, workspace_id)?;
        if relevance.is_empty() {
            outcome.no_tracked_addresses = true;
            return Ok(outcome);
        }

        let Some(access_token) = self.ensure_access_token(connection).await? else {
            return Ok(outcome);
        };

        let listing = self.gmail
            .list_recent_messages(&access_token, LIST_WINDOW_DAYS, LIST_PAGE_SIZE)
            .await
            .map_err(ConnectionError::Listing)?;

        let listed = listing.ids();
        outcome.listed = listed.len();

        let existing = self.db.get_existing_message_ids(workspace_id, &listed)?;
        let candidates: Vec<String> = listed
            .into_iter()
            .filter(|id| !existing.contains(id))
            .take(MAX_MESSAGES_PER_RUN)
            .collect();
        outcome.duplicates = existing.len();

        let mut cursor = connection.sync_cursor.as_deref().and_then(|c| c.parse::<u64>().ok());
        let mut cursor_advanced = false;

        for message_id in &candidates {
            let message = match self.gmail.get_message(&access_token, message_id).await {
                Ok(message) => message,
                Err(e) => {
                    log::debug!("Skipping message {} of {}: {}", message_id, connection.email, e);
                    outcome.fetch_failures += 1;
                    continue;
                }
            };
            outcome.fetched += 1;

            let parsed = ParsedMessage::from_gmail(&message);
            if let Some(history_id) = parsed.history_id {
                if cursor.map_or(true, |current| history_id > current) {
                    cursor = Some(history_id);
                    cursor_advanced = true;
                }
            }

            match self.store_message(connection, &relevance, &parsed) {
                Ok(StoreOutcome::Stored) => outcome.synced += 1,
                Ok(StoreOutcome::Irrelevant) => outcome.irrelevant += 1,
                Ok(StoreOutcome::AlreadyStored) => outcome.duplicates += 1,
                Err(e) => {
                    log::warn!("Failed to store message {} of {}: {}", message_id, connection.email, e);
                    outcome.insert_failures += 1;
                }
            }
        }

        let new_cursor = cursor.filter(|_| cursor_advanced).map(|c| c.to_string());
        if let Err(e) = self.db.update_sync_cursor(&connection.id, new_cursor.as_deref()) {
            log::error!("Failed to update sync cursor for {}: {}", connection.email, e);
        }

        Ok(outcome)
    }

    /// Current access token, refreshed first when it is about to expire
    ///
    /// `None` means the connection's category has no OAuth client configured.
    async fn ensure_access_token(&self, connection: &MailboxConnection) -> Result<Option<String>, ConnectionError> {
        if !needs_refresh(connection.token_expires_at, Utc::now().timestamp()) {
            return Ok(Some(connection.access_token.clone()));
        }

        let client = match self.oauth.for_category(connection.category) {
            Ok(client) => client,
            Err(e) => {
                log::warn!("Skipping {}: {}", connection.email, e);
                return Ok(None);
            }
        };

        let refresh_token = connection
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(ConnectionError::Refresh(OAuthError::MissingRefreshToken))?;

        let refreshed = refresh_access_token(client, refresh_token, self.provider_timeout)
            .await
            .map_err(ConnectionError::Refresh)?;

        self.db.update_connection_tokens(
            &connection.id,
            &refreshed.access_token,
            refreshed.expires_at,
            refreshed.refresh_token.as_deref(),
        )?;

        log::info!("Refreshed access token for {}", connection.email);
        Ok(Some(refreshed.access_token))
    }

    /// Resolve and persist one fetched message
    fn store_message(
        &self,
        connection: &MailboxConnection,
        relevance: &RelevanceSet,
        parsed: &ParsedMessage,
    ) -> Result<StoreOutcome, DbError> {
        let direction = Direction::derive(&connection.email, parsed.primary_to());

        let association = match resolve(&self.db, &connection.workspace_id, relevance, parsed, direction)? {
            Resolution::Irrelevant => return Ok(StoreOutcome::Irrelevant),
            Resolution::Relevant(association) => association,
        };

        let timestamp = parsed.date.unwrap_or_else(Utc::now).to_rfc3339();
        let (sent_at, received_at) = match direction {
            Direction::Outbound => (Some(timestamp), None),
            Direction::Inbound => (None, Some(timestamp)),
        };

        let record = NewSyncedMessage {
            workspace_id: connection.workspace_id.clone(),
            connection_id: connection.id.clone(),
            connection_category: connection.category,
            provider_message_id: parsed.provider_id.clone(),
            thread_id: parsed.thread_id.clone(),
            from_address: parsed.from.clone().unwrap_or_default(),
            to_addresses: parsed.to.clone(),
            cc_addresses: parsed.cc.clone(),
            subject: parsed.subject.clone(),
            body: truncate_chars(&parsed.body, MAX_BODY_CHARS),
            direction,
            is_read: parsed.is_read,
            labels: parsed.labels.clone(),
            sent_at,
            received_at,
            contact_id: association.contact_id,
            company_id: association.company_id,
        };

        if self.db.insert_synced_message(&record)? {
            Ok(StoreOutcome::Stored)
        } else {
            Ok(StoreOutcome::AlreadyStored)
        }
    }
}

enum StoreOutcome {
    Stored,
    Irrelevant,
    AlreadyStored,
}

/// Failure that abandons a connection for the current run
#[derive(Debug, thiserror::Error)]
enum ConnectionError {
    #[error("token refresh failed: {0}")]
    Refresh(OAuthError),

    #[error("message listing failed: {0}")]
    Listing(MailError),

    #[error("database error: {0}")]
    Database(#[from] DbError),
}

/// Errors that prevent a run from starting
#[derive(Debug, thiserror::Error)]
pub enum SyncManagerError {
    #[error("Missing or unknown credential")]
    Unauthorized,

    #[error("No active workspace")]
    NoWorkspace,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ============================================================================
// Tests
// ============================================================================
