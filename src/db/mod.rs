//! Database module for Pipeline Mail Sync
//!
//! SQLite storage for mailbox connections (the credential store), synced
//! messages and settings, plus read access to the CRM collaborator tables
//! (workspaces, sessions, contacts, companies, pipeline entries).

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

// Connection pooling
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::sync::models::{ConnectionCategory, Direction};

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database manager for thread-safe SQLite access
#[derive(Clone)]
pub struct Database {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl Database {
    /// Create a new database connection pool backed by a file
    pub fn new(db_path: PathBuf) -> DbResult<Self> {
        // foreign_keys is per-connection, so every pooled connection enables it
        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));

        let pool = Pool::builder()
            .max_size(8)
            .min_idle(Some(2))
            .connection_timeout(std::time::Duration::from_secs(10))
            .test_on_check_out(false)
            .build(manager)?;

        let conn = pool.get()?;

        conn.execute_batch(r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        "#)?;

        let schema = include_str!("schema.sql");
        conn.execute_batch(schema)?;

        Self::run_migrations(&*conn)?;

        drop(conn);

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Create an in-memory database (for testing)
    ///
    /// Every pooled connection to `:memory:` is a separate database, so the
    /// pool is pinned to a single connection.
    pub fn in_memory() -> DbResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));

        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .build(manager)?;

        let conn = pool.get()?;

        let schema = include_str!("schema.sql");
        conn.execute_batch(schema)?;

        Self::run_migrations(&*conn)?;
        drop(conn);

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Get a connection from the pool
    #[inline]
    pub fn get_conn(&self) -> DbResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    // =========================================================================
    // MIGRATIONS
    // =========================================================================

    /// Run migrations for existing databases
    fn run_migrations(conn: &Connection) -> DbResult<()> {
        // Default scheduler settings
        let has_scheduler_config: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM settings WHERE key = 'mail_sync_scheduler'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !has_scheduler_config {
            log::info!("Running migration: Adding default mail sync scheduler settings");
            conn.execute(
                "INSERT INTO settings (key, value) VALUES ('mail_sync_scheduler', ?1)",
                [r#"{"enabled":true,"interval_minutes":15,"last_run":null}"#],
            )?;
        }

        Ok(())
    }

    // =========================================================================
    // WORKSPACES, USERS & SESSIONS
    // =========================================================================

    /// Add a workspace
    pub fn add_workspace(&self, name: &str) -> DbResult<String> {
        let conn = self.get_conn()?;
        let id = new_id();

        conn.execute(
            "INSERT INTO workspaces (id, name) VALUES (?1, ?2)",
            params![id, name],
        )?;

        Ok(id)
    }

    /// Add a user, optionally with an active workspace
    pub fn add_user(&self, email: &str, active_workspace_id: Option<&str>) -> DbResult<String> {
        let conn = self.get_conn()?;
        let id = new_id();

        conn.execute(
            "INSERT INTO users (id, email, active_workspace_id) VALUES (?1, ?2, ?3)",
            params![id, email, active_workspace_id],
        )?;

        Ok(id)
    }

    /// Switch the workspace a user is currently working in
    pub fn set_active_workspace(&self, user_id: &str, workspace_id: Option<&str>) -> DbResult<()> {
        let conn = self.get_conn()?;

        let updated = conn.execute(
            "UPDATE users SET active_workspace_id = ?1 WHERE id = ?2",
            params![workspace_id, user_id],
        )?;

        if updated == 0 {
            return Err(DbError::NotFound(format!("user {}", user_id)));
        }

        Ok(())
    }

    /// Create a session token for a user
    pub fn create_session(&self, user_id: &str, expires_at: Option<i64>) -> DbResult<String> {
        let conn = self.get_conn()?;
        let token = format!("{}{}", new_id(), new_id()).replace('-', "");

        conn.execute(
            "INSERT INTO user_sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![token, user_id, expires_at],
        )?;

        Ok(token)
    }

    /// Resolve a bearer token to the user it was issued for
    ///
    /// Expired sessions resolve to `None`.
    pub fn get_session_user(&self, token: &str) -> DbResult<Option<String>> {
        let conn = self.get_conn()?;
        let now = chrono::Utc::now().timestamp();

        let user_id = conn
            .query_row(
                r#"
                SELECT user_id FROM user_sessions
                WHERE token = ?1 AND (expires_at IS NULL OR expires_at > ?2)
                "#,
                params![token, now],
                |row| row.get(0),
            )
            .optional()?;

        Ok(user_id)
    }

    /// Get the workspace a user is currently working in
    pub fn get_active_workspace(&self, user_id: &str) -> DbResult<Option<String>> {
        let conn = self.get_conn()?;

        let workspace: Option<Option<String>> = conn
            .query_row(
                "SELECT active_workspace_id FROM users WHERE id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(workspace.flatten())
    }

    // =========================================================================
    // DIRECTORY (contacts & companies)
    // =========================================================================

    /// Add a company
    pub fn add_company(&self, company: &NewCompany) -> DbResult<String> {
        let conn = self.get_conn()?;
        let id = new_id();

        conn.execute(
            "INSERT INTO companies (id, workspace_id, name, email) VALUES (?1, ?2, ?3, ?4)",
            params![id, company.workspace_id, company.name, company.email],
        )?;

        Ok(id)
    }

    /// Add a contact
    pub fn add_contact(&self, contact: &NewContact) -> DbResult<String> {
        let conn = self.get_conn()?;
        let id = new_id();

        conn.execute(
            r#"
            INSERT INTO contacts (id, workspace_id, company_id, first_name, last_name, email)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                id,
                contact.workspace_id,
                contact.company_id,
                contact.first_name,
                contact.last_name,
                contact.email,
            ],
        )?;

        Ok(id)
    }

    /// Get e-mail addresses for a set of contacts
    pub fn get_contact_emails(&self, contact_ids: &[String]) -> DbResult<Vec<String>> {
        self.emails_by_ids("contacts", contact_ids)
    }

    /// Get e-mail addresses for a set of companies
    pub fn get_company_emails(&self, company_ids: &[String]) -> DbResult<Vec<String>> {
        self.emails_by_ids("companies", company_ids)
    }

    fn emails_by_ids(&self, table: &str, ids: &[String]) -> DbResult<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT email FROM {} WHERE email IS NOT NULL AND id IN ({})",
            table,
            placeholders(1, ids.len()),
        );

        let mut stmt = conn.prepare(&sql)?;
        let emails = stmt
            .query_map(params_from_iter(ids.iter()), |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(emails)
    }

    /// Find a contact of the workspace by address (case-insensitive)
    ///
    /// Addresses are folded in Rust: SQLite `lower()` only folds ASCII.
    pub fn find_contact_by_email(&self, workspace_id: &str, email: &str) -> DbResult<Option<ContactMatch>> {
        let conn = self.get_conn()?;
        let wanted = fold_address(email);

        let mut stmt = conn.prepare(
            r#"
            SELECT id, company_id, email FROM contacts
            WHERE workspace_id = ?1 AND email IS NOT NULL
            ORDER BY created_at ASC, rowid ASC
            "#,
        )?;
        let rows = stmt.query_map(params![workspace_id], |row| {
            Ok((
                ContactMatch {
                    contact_id: row.get(0)?,
                    company_id: row.get(1)?,
                },
                row.get::<_, String>(2)?,
            ))
        })?;

        for row in rows {
            let (contact, address) = row?;
            if fold_address(&address) == wanted {
                return Ok(Some(contact));
            }
        }

        Ok(None)
    }

    /// Find a company of the workspace by address (case-insensitive)
    pub fn find_company_by_email(&self, workspace_id: &str, email: &str) -> DbResult<Option<String>> {
        let conn = self.get_conn()?;
        let wanted = fold_address(email);

        let mut stmt = conn.prepare(
            r#"
            SELECT id, email FROM companies
            WHERE workspace_id = ?1 AND email IS NOT NULL
            ORDER BY created_at ASC, rowid ASC
            "#,
        )?;
        let rows = stmt.query_map(params![workspace_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (company_id, address) = row?;
            if fold_address(&address) == wanted {
                return Ok(Some(company_id));
            }
        }

        Ok(None)
    }

    // =========================================================================
    // PIPELINE
    // =========================================================================

    /// Put a contact and/or a company into the workspace's pipeline
    pub fn add_pipeline_entry(
        &self,
        workspace_id: &str,
        contact_id: Option<&str>,
        company_id: Option<&str>,
    ) -> DbResult<String> {
        let conn = self.get_conn()?;
        let id = new_id();

        conn.execute(
            "INSERT INTO pipeline_entries (id, workspace_id, contact_id, company_id) VALUES (?1, ?2, ?3, ?4)",
            params![id, workspace_id, contact_id, company_id],
        )?;

        Ok(id)
    }

    /// Remove a pipeline entry
    pub fn remove_pipeline_entry(&self, entry_id: &str) -> DbResult<()> {
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM pipeline_entries WHERE id = ?1", [entry_id])?;
        Ok(())
    }

    /// Contacts and companies currently referenced by the workspace's pipeline
    pub fn get_pipeline_members(&self, workspace_id: &str) -> DbResult<PipelineMembers> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT contact_id, company_id FROM pipeline_entries WHERE workspace_id = ?1",
        )?;

        let rows = stmt
            .query_map([workspace_id], |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut members = PipelineMembers::default();
        for (contact_id, company_id) in rows {
            if let Some(id) = contact_id {
                if !members.contact_ids.contains(&id) {
                    members.contact_ids.push(id);
                }
            }
            if let Some(id) = company_id {
                if !members.company_ids.contains(&id) {
                    members.company_ids.push(id);
                }
            }
        }

        Ok(members)
    }

    // =========================================================================
    // MAILBOX CONNECTIONS (credential store)
    // =========================================================================

    /// Add a mailbox connection
    pub fn add_connection(&self, connection: &NewConnection) -> DbResult<String> {
        let conn = self.get_conn()?;
        let id = new_id();

        conn.execute(
            r#"
            INSERT INTO mailbox_connections (
                id, workspace_id, user_id, email, category,
                access_token, refresh_token, token_expires_at, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                id,
                connection.workspace_id,
                connection.user_id,
                fold_address(&connection.email),
                connection.category,
                connection.access_token,
                connection.refresh_token,
                connection.token_expires_at,
                connection.is_active,
            ],
        )?;

        Ok(id)
    }

    /// Get a connection by ID
    pub fn get_connection(&self, id: &str) -> DbResult<MailboxConnection> {
        let conn = self.get_conn()?;

        let connection = conn
            .query_row(
                &format!("SELECT {} FROM mailbox_connections WHERE id = ?1", CONNECTION_COLUMNS),
                [id],
                MailboxConnection::from_row,
            )
            .optional()?;

        connection.ok_or_else(|| DbError::NotFound(format!("mailbox connection {}", id)))
    }

    /// Get the active personal connection of a user in a workspace
    pub fn get_personal_connection(
        &self,
        workspace_id: &str,
        user_id: &str,
    ) -> DbResult<Option<MailboxConnection>> {
        let conn = self.get_conn()?;

        let connection = conn
            .query_row(
                &format!(
                    r#"
                    SELECT {} FROM mailbox_connections
                    WHERE workspace_id = ?1 AND user_id = ?2
                      AND category = 'personal' AND is_active = 1
                    ORDER BY created_at ASC, rowid ASC
                    LIMIT 1
                    "#,
                    CONNECTION_COLUMNS
                ),
                params![workspace_id, user_id],
                MailboxConnection::from_row,
            )
            .optional()?;

        Ok(connection)
    }

    /// Get active workspace-shared connections, for one workspace or all of them
    pub fn get_workspace_connections(&self, workspace_id: Option<&str>) -> DbResult<Vec<MailboxConnection>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM mailbox_connections
            WHERE category = 'workspace' AND is_active = 1
              AND (?1 IS NULL OR workspace_id = ?1)
            ORDER BY created_at ASC, rowid ASC
            "#,
            CONNECTION_COLUMNS
        ))?;

        let connections = stmt
            .query_map([workspace_id], MailboxConnection::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(connections)
    }

    /// Store a refreshed access token
    ///
    /// The refresh token is only replaced when the provider rotated it.
    pub fn update_connection_tokens(
        &self,
        id: &str,
        access_token: &str,
        expires_at: i64,
        refresh_token: Option<&str>,
    ) -> DbResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            UPDATE mailbox_connections
            SET access_token = ?1,
                token_expires_at = ?2,
                refresh_token = COALESCE(?3, refresh_token),
                updated_at = datetime('now')
            WHERE id = ?4
            "#,
            params![access_token, expires_at, refresh_token, id],
        )?;

        Ok(())
    }

    /// Record the end of a sync pass, advancing the cursor when one was observed
    pub fn update_sync_cursor(&self, id: &str, cursor: Option<&str>) -> DbResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            UPDATE mailbox_connections
            SET sync_cursor = COALESCE(?1, sync_cursor),
                last_sync_at = datetime('now'),
                updated_at = datetime('now')
            WHERE id = ?2
            "#,
            params![cursor, id],
        )?;

        Ok(())
    }

    /// Enable or disable a connection without deleting it
    pub fn set_connection_active(&self, id: &str, active: bool) -> DbResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "UPDATE mailbox_connections SET is_active = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![active, id],
        )?;

        Ok(())
    }

    // =========================================================================
    // SYNCED MESSAGES
    // =========================================================================

    /// Provider ids from `ids` that are already stored for the workspace
    pub fn get_existing_message_ids(&self, workspace_id: &str, ids: &[String]) -> DbResult<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT provider_message_id FROM synced_messages WHERE workspace_id = ?1 AND provider_message_id IN ({})",
            placeholders(2, ids.len()),
        );

        let values = std::iter::once(workspace_id).chain(ids.iter().map(String::as_str));
        let mut stmt = conn.prepare(&sql)?;
        let existing = stmt
            .query_map(params_from_iter(values), |row| row.get(0))?
            .collect::<Result<HashSet<String>, _>>()?;

        Ok(existing)
    }

    /// Insert a synced message
    ///
    /// Returns `false` when the workspace already holds this provider message.
    pub fn insert_synced_message(&self, message: &NewSyncedMessage) -> DbResult<bool> {
        let conn = self.get_conn()?;
        let labels = serde_json::to_string(&message.labels)
            .map_err(|e| DbError::Serialization(e.to_string()))?;

        let inserted = conn.execute(
            r#"
            INSERT INTO synced_messages (
                id, workspace_id, connection_id, connection_category, provider_message_id,
                thread_id, from_address, to_addresses, cc_addresses, subject, body,
                direction, is_read, labels, sent_at, received_at, contact_id, company_id
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18
            )
            ON CONFLICT(workspace_id, provider_message_id) DO NOTHING
            "#,
            params![
                new_id(),
                message.workspace_id,
                message.connection_id,
                message.connection_category,
                message.provider_message_id,
                message.thread_id,
                message.from_address,
                message.to_addresses.join(", "),
                message.cc_addresses.join(", "),
                message.subject,
                message.body,
                message.direction,
                message.is_read,
                labels,
                message.sent_at,
                message.received_at,
                message.contact_id,
                message.company_id,
            ],
        )?;

        Ok(inserted > 0)
    }

    /// Association of the most recent outbound message of a thread
    ///
    /// Outbound messages with neither a contact nor a company are ignored.
    pub fn find_thread_outbound_association(
        &self,
        workspace_id: &str,
        thread_id: &str,
    ) -> DbResult<Option<EntityAssociation>> {
        let conn = self.get_conn()?;

        let association = conn
            .query_row(
                r#"
                SELECT contact_id, company_id FROM synced_messages
                WHERE workspace_id = ?1 AND thread_id = ?2 AND direction = 'outbound'
                  AND (contact_id IS NOT NULL OR company_id IS NOT NULL)
                ORDER BY sent_at DESC, created_at DESC, rowid DESC
                LIMIT 1
                "#,
                params![workspace_id, thread_id],
                |row| {
                    Ok(EntityAssociation {
                        contact_id: row.get(0)?,
                        company_id: row.get(1)?,
                    })
                },
            )
            .optional()?;

        Ok(association)
    }

    /// Messages of a workspace, newest first
    pub fn messages_for_workspace(&self, workspace_id: &str, limit: i64) -> DbResult<Vec<SyncedMessage>> {
        self.query_messages("workspace_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2", params![workspace_id, limit])
    }

    /// Messages of one conversation thread, oldest first
    pub fn messages_for_thread(&self, workspace_id: &str, thread_id: &str) -> DbResult<Vec<SyncedMessage>> {
        self.query_messages(
            "workspace_id = ?1 AND thread_id = ?2 ORDER BY COALESCE(sent_at, received_at) ASC, rowid ASC",
            params![workspace_id, thread_id],
        )
    }

    /// Messages associated with a contact, newest first
    pub fn messages_for_contact(&self, contact_id: &str) -> DbResult<Vec<SyncedMessage>> {
        self.query_messages(
            "contact_id = ?1 ORDER BY COALESCE(sent_at, received_at) DESC, rowid DESC",
            [contact_id],
        )
    }

    /// Messages associated with a company, newest first
    pub fn messages_for_company(&self, company_id: &str) -> DbResult<Vec<SyncedMessage>> {
        self.query_messages(
            "company_id = ?1 ORDER BY COALESCE(sent_at, received_at) DESC, rowid DESC",
            [company_id],
        )
    }

    /// Number of messages stored for a workspace
    pub fn count_messages(&self, workspace_id: &str) -> DbResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM synced_messages WHERE workspace_id = ?1",
            [workspace_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn query_messages<P>(&self, filter: &str, params: P) -> DbResult<Vec<SyncedMessage>>
    where
        P: rusqlite::Params,
    {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM synced_messages WHERE {}", MESSAGE_COLUMNS, filter);

        let mut stmt = conn.prepare(&sql)?;
        let messages = stmt
            .query_map(params, SyncedMessage::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    // =========================================================================
    // SETTINGS
    // =========================================================================

    /// Get a setting value
    pub fn get_setting<T: serde::de::DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        let conn = self.get_conn()?;
        let result: Result<String, _> = conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            [key],
            |row| row.get(0),
        );

        match result {
            Ok(json) => {
                let value: T = serde_json::from_str(&json)
                    .map_err(|e| DbError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a setting value
    pub fn set_setting<T: Serialize>(&self, key: &str, value: &T) -> DbResult<()> {
        let conn = self.get_conn()?;
        let json = serde_json::to_string(value)
            .map_err(|e| DbError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, json],
        )?;

        Ok(())
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn fold_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// `?n, ?n+1, ...` placeholder list for IN clauses
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// DATA STRUCTURES
// ============================================================================

const CONNECTION_COLUMNS: &str = "id, workspace_id, user_id, email, category, access_token, \
     refresh_token, token_expires_at, sync_cursor, is_active, last_sync_at, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, workspace_id, connection_id, connection_category, \
     provider_message_id, thread_id, from_address, to_addresses, cc_addresses, subject, body, \
     direction, is_read, labels, sent_at, received_at, contact_id, company_id, created_at";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCompany {
    pub workspace_id: String,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContact {
    pub workspace_id: String,
    pub company_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactMatch {
    pub contact_id: String,
    pub company_id: Option<String>,
}

/// Contact/company association of a synced message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAssociation {
    pub contact_id: Option<String>,
    pub company_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineMembers {
    pub contact_ids: Vec<String>,
    pub company_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConnection {
    pub workspace_id: String,
    pub user_id: Option<String>,
    pub email: String,
    pub category: ConnectionCategory,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<i64>,
    pub is_active: bool,
}

/// A connected mailbox and its credential
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxConnection {
    pub id: String,
    pub workspace_id: String,
    pub user_id: Option<String>,
    pub email: String,
    pub category: ConnectionCategory,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    /// Access-token expiry as unix seconds
    pub token_expires_at: Option<i64>,
    pub sync_cursor: Option<String>,
    pub is_active: bool,
    pub last_sync_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl MailboxConnection {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            user_id: row.get(2)?,
            email: row.get(3)?,
            category: row.get(4)?,
            access_token: row.get(5)?,
            refresh_token: row.get(6)?,
            token_expires_at: row.get(7)?,
            sync_cursor: row.get(8)?,
            is_active: row.get(9)?,
            last_sync_at: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSyncedMessage {
    pub workspace_id: String,
    pub connection_id: String,
    pub connection_category: ConnectionCategory,
    pub provider_message_id: String,
    pub thread_id: Option<String>,
    pub from_address: String,
    pub to_addresses: Vec<String>,
    pub cc_addresses: Vec<String>,
    pub subject: String,
    pub body: String,
    pub direction: Direction,
    pub is_read: bool,
    pub labels: Vec<String>,
    pub sent_at: Option<String>,
    pub received_at: Option<String>,
    pub contact_id: Option<String>,
    pub company_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedMessage {
    pub id: String,
    pub workspace_id: String,
    pub connection_id: String,
    pub connection_category: ConnectionCategory,
    pub provider_message_id: String,
    pub thread_id: Option<String>,
    pub from_address: String,
    pub to_addresses: Vec<String>,
    pub cc_addresses: Vec<String>,
    pub subject: String,
    pub body: String,
    pub direction: Direction,
    pub is_read: bool,
    pub labels: Vec<String>,
    pub sent_at: Option<String>,
    pub received_at: Option<String>,
    pub contact_id: Option<String>,
    pub company_id: Option<String>,
    pub created_at: String,
}

impl SyncedMessage {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let labels: String = row.get(13)?;

        Ok(Self {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            connection_id: row.get(2)?,
            connection_category: row.get(3)?,
            provider_message_id: row.get(4)?,
            thread_id: row.get(5)?,
            from_address: row.get(6)?,
            to_addresses: split_addresses(&row.get::<_, String>(7)?),
            cc_addresses: split_addresses(&row.get::<_, String>(8)?),
            subject: row.get(9)?,
            body: row.get(10)?,
            direction: row.get(11)?,
            is_read: row.get(12)?,
            labels: serde_json::from_str(&labels).unwrap_or_default(),
            sent_at: row.get(14)?,
            received_at: row.get(15)?,
            contact_id: row.get(16)?,
            company_id: row.get(17)?,
            created_at: row.get(18)?,
        })
    }
}

fn split_addresses(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
