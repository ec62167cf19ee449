//! Integration Tests for Sync Module
//!
//! End-to-end runs of the engine against mockito servers standing in for
//! the Gmail API and the OAuth token endpoint:
//! - Relevance filtering and entity resolution
//! - Idempotence and the per-run cap
//! - Token refresh around the expiry margin
//! - Failure isolation per connection and per message

#[cfg(test)]
mod integration_tests {
    use super::super::*;
    use crate::config::AppConfig;
    use crate::db::{Database, NewCompany, NewConnection, NewContact};
    use crate::oauth::{OAuthClientConfig, OAuthClients};
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use chrono::Utc;
    use mockito::{Matcher, Mock, Server, ServerGuard};
    use std::sync::Arc;
    use std::time::Duration;

    const MAILBOX: &str = "me@agency.fr";
    const SHARED_MAILBOX: &str = "team@agency.fr";

    struct Fixture {
        server: ServerGuard,
        db: Arc<Database>,
        manager: SyncManager,
        ws: String,
        user: String,
        alice: String,
        acme: String,
    }

    impl Fixture {
        async fn new() -> Self {
            Self::with_clients(true, true).await
        }

        /// Alice (a@x.com, at Acme) is in the workspace pipeline
        async fn with_clients(personal: bool, workspace: bool) -> Self {
            let server = Server::new_async().await;
            let db = Arc::new(Database::in_memory().unwrap());

            let token_url = format!("{}/token", server.url());
            let client = |id: &str| OAuthClientConfig::google(id, "secret").with_token_url(token_url.clone());

            let config = AppConfig {
                database_path: ":memory:".into(),
                listen_addr: "127.0.0.1:0".parse().unwrap(),
                scheduler_key: "anon-key".to_string(),
                gmail_api_base: server.url(),
                oauth: OAuthClients {
                    personal: personal.then(|| client("personal-client")),
                    workspace: workspace.then(|| client("workspace-client")),
                },
                provider_timeout: Duration::from_secs(5),
            };
            let manager = SyncManager::new(db.clone(), &config).unwrap();

            let ws = db.add_workspace("Agency").unwrap();
            let user = db.add_user(MAILBOX, Some(&ws)).unwrap();
            let acme = db
                .add_company(&NewCompany {
                    workspace_id: ws.clone(),
                    name: "Acme".to_string(),
                    email: Some("hello@acme.fr".to_string()),
                })
                .unwrap();
            let alice = add_contact(&db, &ws, "Alice", "a@x.com", Some(&acme));
            db.add_pipeline_entry(&ws, Some(&alice), None).unwrap();

            Self { server, db, manager, ws, user, alice, acme }
        }

        fn personal_connection(&self, access_token: &str, expires_in: Option<i64>) -> String {
            add_connection(&self.db, &self.ws, Some(&self.user), MAILBOX, ConnectionCategory::Personal, access_token, expires_in)
        }

        fn shared_connection(&self, email: &str, access_token: &str, expires_in: Option<i64>) -> String {
            add_connection(&self.db, &self.ws, None, email, ConnectionCategory::Workspace, access_token, expires_in)
        }

        fn user_context(&self) -> RunContext {
            RunContext::user(self.user.clone(), self.ws.clone())
        }

        /// Listing mock for one access token, not yet created
        fn listing(&mut self, access_token: &str, ids: &[&str]) -> Mock {
            let messages: Vec<_> = ids
                .iter()
                .map(|id| serde_json::json!({"id": id, "threadId": format!("thread-{}", id)}))
                .collect();
            let body = serde_json::json!({"messages": messages, "resultSizeEstimate": ids.len()});

            self.server
                .mock("GET", "/users/me/messages")
                .match_query(Matcher::AllOf(vec![
                    Matcher::UrlEncoded("q".into(), "newer_than:7d".into()),
                    Matcher::UrlEncoded("maxResults".into(), "50".into()),
                ]))
                .match_header("authorization", format!("Bearer {}", access_token).as_str())
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(body.to_string())
        }

        async fn mock_listing(&mut self, access_token: &str, ids: &[&str]) -> Mock {
            self.listing(access_token, ids).create_async().await
        }

        /// Message mock, not yet created
        fn message(&mut self, message: &TestMessage) -> Mock {
            self.server
                .mock("GET", format!("/users/me/messages/{}", message.id).as_str())
                .match_query(Matcher::UrlEncoded("format".into(), "full".into()))
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(message.to_json())
        }

        async fn mock_message(&mut self, message: &TestMessage) -> Mock {
            self.message(message).create_async().await
        }

        async fn mock_token(&mut self, body: &str, expected_calls: usize) -> Mock {
            self.server
                .mock("POST", "/token")
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(body)
                .expect(expected_calls)
                .create_async()
                .await
        }
    }

    fn add_contact(db: &Database, ws: &str, first_name: &str, email: &str, company_id: Option<&str>) -> String {
        db.add_contact(&NewContact {
            workspace_id: ws.to_string(),
            company_id: company_id.map(str::to_string),
            first_name: first_name.to_string(),
            last_name: "Test".to_string(),
            email: Some(email.to_string()),
        })
        .unwrap()
    }

    fn add_connection(
        db: &Database,
        ws: &str,
        user: Option<&str>,
        email: &str,
        category: ConnectionCategory,
        access_token: &str,
        expires_in: Option<i64>,
    ) -> String {
        db.add_connection(&NewConnection {
            workspace_id: ws.to_string(),
            user_id: user.map(str::to_string),
            email: email.to_string(),
            category,
            access_token: access_token.to_string(),
            refresh_token: Some("refresh-token".to_string()),
            token_expires_at: expires_in.map(|secs| Utc::now().timestamp() + secs),
            is_active: true,
        })
        .unwrap()
    }

    /// Provider message as served by the mock
    struct TestMessage {
        id: String,
        thread_id: String,
        from: String,
        to: String,
        subject: String,
        body: String,
        history_id: u64,
    }

    impl TestMessage {
        fn new(id: &str, from: &str, to: &str) -> Self {
            Self {
                id: id.to_string(),
                thread_id: format!("thread-{}", id),
                from: from.to_string(),
                to: to.to_string(),
                subject: "Devis".to_string(),
                body: "Bonjour, voici le devis.".to_string(),
                history_id: 100,
            }
        }

        fn thread(mut self, thread_id: &str) -> Self {
            self.thread_id = thread_id.to_string();
            self
        }

        fn history(mut self, history_id: u64) -> Self {
            self.history_id = history_id;
            self
        }

        fn body(mut self, body: String) -> Self {
            self.body = body;
            self
        }

        fn to_json(&self) -> String {
            serde_json::json!({
                "id": self.id,
                "threadId": self.thread_id,
                "labelIds": ["INBOX", "UNREAD"],
                "historyId": self.history_id.to_string(),
                "internalDate": "1760427000000",
                "payload": {
                    "mimeType": "text/plain",
                    "headers": [
                        {"name": "From", "value": self.from},
                        {"name": "To", "value": self.to},
                        {"name": "Subject", "value": self.subject},
                    ],
                    "body": {
                        "size": self.body.len(),
                        "data": URL_SAFE_NO_PAD.encode(&self.body),
                    }
                }
            })
            .to_string()
        }
    }

    const FRESH_TOKEN_RESPONSE: &str =
        r#"{"access_token":"fresh-token","expires_in":3600,"refresh_token":"rotated-refresh","token_type":"Bearer"}"#;

    // ========================================================================
    // Relevance & Resolution
    // ========================================================================

    #[tokio::test]
    async fn test_inbound_message_from_pipeline_contact() {
        let mut f = Fixture::new().await;
        let connection = f.personal_connection("valid-token", Some(3600));

        let _listing = f.mock_listing("valid-token", &["m1"]).await;
        let message = TestMessage::new("m1", "Alice <a@x.com>", MAILBOX);
        let _message = f.mock_message(&message).await;

        let result = f.manager.run(&f.user_context()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.synced, 1);
        assert_eq!(result.connections, 1);
        assert!(result.errors.is_empty());

        let stored = f.db.messages_for_workspace(&f.ws, 10).unwrap();
        assert_eq!(stored.len(), 1);
        let row = &stored[0];
        assert_eq!(row.provider_message_id, "m1");
        assert_eq!(row.direction, Direction::Inbound);
        assert_eq!(row.from_address, "a@x.com");
        assert_eq!(row.to_addresses, vec![MAILBOX.to_string()]);
        assert_eq!(row.subject, "Devis");
        assert_eq!(row.body, "Bonjour, voici le devis.");
        assert!(!row.is_read);
        assert_eq!(row.labels, vec!["INBOX".to_string(), "UNREAD".to_string()]);
        assert_eq!(row.contact_id.as_deref(), Some(f.alice.as_str()));
        assert_eq!(row.company_id.as_deref(), Some(f.acme.as_str()));
        assert_eq!(row.connection_id, connection);
        assert_eq!(row.connection_category, ConnectionCategory::Personal);
        assert_eq!(row.received_at.as_deref(), Some("2025-10-14T07:30:00+00:00"));
        assert!(row.sent_at.is_none());
    }

    #[tokio::test]
    async fn test_untracked_sender_is_not_stored() {
        let mut f = Fixture::new().await;
        f.personal_connection("valid-token", Some(3600));

        let _listing = f.mock_listing("valid-token", &["m1"]).await;
        let message = TestMessage::new("m1", "random@nowhere.com", MAILBOX);
        let fetched = f.message(&message).expect(1).create_async().await;

        let result = f.manager.run(&f.user_context()).await.unwrap();
        assert_eq!(result.synced, 0);
        assert!(result.errors.is_empty());
        assert_eq!(f.db.count_messages(&f.ws).unwrap(), 0);
        fetched.assert_async().await;
    }

    #[tokio::test]
    async fn test_outbound_direction_and_sent_timestamp() {
        let mut f = Fixture::new().await;
        f.personal_connection("valid-token", Some(3600));

        let _listing = f.mock_listing("valid-token", &["m1"]).await;
        let message = TestMessage::new("m1", MAILBOX, "Alice <a@x.com>, boss@agency.fr");
        let _message = f.mock_message(&message).await;

        let result = f.manager.run(&f.user_context()).await.unwrap();
        assert_eq!(result.synced, 1);

        let row = &f.db.messages_for_contact(&f.alice).unwrap()[0];
        assert_eq!(row.direction, Direction::Outbound);
        assert_eq!(row.to_addresses, vec!["a@x.com".to_string(), "boss@agency.fr".to_string()]);
        assert_eq!(row.sent_at.as_deref(), Some("2025-10-14T07:30:00+00:00"));
        assert!(row.received_at.is_none());
    }

    #[tokio::test]
    async fn test_reply_inherits_thread_association() {
        let mut f = Fixture::new().await;
        let bob = add_contact(&f.db, &f.ws, "Bob", "bob@y.com", None);
        f.db.add_pipeline_entry(&f.ws, Some(&bob), None).unwrap();
        f.personal_connection("valid-token", Some(3600));

        let _listing = f.mock_listing("valid-token", &["out-1", "in-1"]).await;
        let outbound = TestMessage::new("out-1", MAILBOX, "a@x.com").thread("T");
        let reply = TestMessage::new("in-1", "Bob <bob@y.com>", MAILBOX).thread("T");
        let _outbound = f.mock_message(&outbound).await;
        let _reply = f.mock_message(&reply).await;

        let result = f.manager.run(&f.user_context()).await.unwrap();
        assert_eq!(result.synced, 2);

        let thread = f.db.messages_for_thread(&f.ws, "T").unwrap();
        assert_eq!(thread.len(), 2);
        let inbound = thread.iter().find(|m| m.provider_message_id == "in-1").unwrap();
        assert_eq!(inbound.from_address, "bob@y.com");
        assert_eq!(inbound.contact_id.as_deref(), Some(f.alice.as_str()));
        assert_eq!(inbound.company_id.as_deref(), Some(f.acme.as_str()));
        assert!(f.db.messages_for_contact(&bob).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_company_address_resolves_to_company() {
        let mut f = Fixture::new().await;
        f.db.add_pipeline_entry(&f.ws, None, Some(&f.acme)).unwrap();
        f.personal_connection("valid-token", Some(3600));

        let _listing = f.mock_listing("valid-token", &["m1"]).await;
        let message = TestMessage::new("m1", "Acme <hello@acme.fr>", MAILBOX);
        let _message = f.mock_message(&message).await;

        f.manager.run(&f.user_context()).await.unwrap();

        let rows = f.db.messages_for_company(&f.acme).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].contact_id.is_none());
    }

    #[tokio::test]
    async fn test_long_body_is_truncated() {
        let mut f = Fixture::new().await;
        f.personal_connection("valid-token", Some(3600));

        let _listing = f.mock_listing("valid-token", &["m1"]).await;
        let message = TestMessage::new("m1", "a@x.com", MAILBOX).body("é".repeat(MAX_BODY_CHARS + 500));
        let _message = f.mock_message(&message).await;

        f.manager.run(&f.user_context()).await.unwrap();

        let row = &f.db.messages_for_workspace(&f.ws, 1).unwrap()[0];
        assert_eq!(row.body.chars().count(), MAX_BODY_CHARS);
    }

    // ========================================================================
    // Deduplication & Limits
    // ========================================================================

    #[tokio::test]
    async fn test_second_run_adds_nothing() {
        let mut f = Fixture::new().await;
        f.personal_connection("valid-token", Some(3600));

        let _listing = f.mock_listing("valid-token", &["m1"]).await;
        let message = TestMessage::new("m1", "a@x.com", MAILBOX);
        let fetched = f.message(&message).expect(1).create_async().await;

        let first = f.manager.run(&f.user_context()).await.unwrap();
        assert_eq!(first.synced, 1);

        let second = f.manager.run(&f.user_context()).await.unwrap();
        assert!(second.success);
        assert_eq!(second.synced, 0);
        assert!(second.errors.is_empty());
        assert_eq!(f.db.count_messages(&f.ws).unwrap(), 1);

        // Already-stored ids are never fetched again
        fetched.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetches_capped_per_run() {
        let mut f = Fixture::new().await;
        f.personal_connection("valid-token", Some(3600));

        let ids: Vec<String> = (0..80).map(|i| format!("m{}", i)).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let _listing = f.mock_listing("valid-token", &id_refs).await;

        // Only the first twenty listed ids may be requested
        let message = TestMessage::new("m0", "random@nowhere.com", MAILBOX);
        let first_twenty = f
            .server
            .mock("GET", Matcher::Regex(r"^/users/me/messages/m(1?[0-9])$".to_string()))
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(message.to_json())
            .expect(20)
            .create_async()
            .await;
        let the_rest = f
            .server
            .mock("GET", Matcher::Regex(r"^/users/me/messages/m([2-7][0-9])$".to_string()))
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(message.to_json())
            .expect(0)
            .create_async()
            .await;

        let result = f.manager.run(&f.user_context()).await.unwrap();
        assert!(result.errors.is_empty());

        first_twenty.assert_async().await;
        the_rest.assert_async().await;
    }

    #[tokio::test]
    async fn test_same_message_in_two_mailboxes_is_stored_once() {
        let mut f = Fixture::new().await;
        let personal = f.personal_connection("personal-token", Some(3600));
        f.shared_connection(SHARED_MAILBOX, "shared-token", Some(3600));

        let _personal_listing = f.mock_listing("personal-token", &["m1"]).await;
        let _shared_listing = f.mock_listing("shared-token", &["m1"]).await;
        let message = TestMessage::new("m1", "a@x.com", &format!("{}, {}", MAILBOX, SHARED_MAILBOX));
        let fetched = f.message(&message).expect(1).create_async().await;

        let result = f.manager.run(&f.user_context()).await.unwrap();
        assert_eq!(result.connections, 2);
        assert_eq!(result.synced, 1);

        let rows = f.db.messages_for_workspace(&f.ws, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].connection_id, personal);
        fetched.assert_async().await;
    }

    // ========================================================================
    // Token Refresh
    // ========================================================================

    #[tokio::test]
    async fn test_token_expiring_soon_is_refreshed_first() {
        let mut f = Fixture::new().await;
        let connection = f.personal_connection("stale-token", Some(30));

        let token = f.mock_token(FRESH_TOKEN_RESPONSE, 1).await;
        let listing = f.mock_listing("fresh-token", &[]).await;

        let before = Utc::now().timestamp();
        let result = f.manager.run(&f.user_context()).await.unwrap();
        assert!(result.errors.is_empty(), "{:?}", result.errors);

        token.assert_async().await;
        listing.assert_async().await;

        let stored = f.db.get_connection(&connection).unwrap();
        assert_eq!(stored.access_token, "fresh-token");
        assert_eq!(stored.refresh_token.as_deref(), Some("rotated-refresh"));
        assert!(stored.token_expires_at.unwrap() >= before + 3600);
    }

    #[tokio::test]
    async fn test_token_with_enough_margin_is_kept() {
        let mut f = Fixture::new().await;
        let connection = f.personal_connection("valid-token", Some(120));

        let token = f.mock_token(FRESH_TOKEN_RESPONSE, 0).await;
        let listing = f.mock_listing("valid-token", &[]).await;

        let result = f.manager.run(&f.user_context()).await.unwrap();
        assert!(result.errors.is_empty());

        token.assert_async().await;
        listing.assert_async().await;
        assert_eq!(f.db.get_connection(&connection).unwrap().access_token, "valid-token");
    }

    #[tokio::test]
    async fn test_missing_expiry_counts_as_expired() {
        let mut f = Fixture::new().await;
        f.personal_connection("stale-token", None);

        let token = f.mock_token(FRESH_TOKEN_RESPONSE, 1).await;
        let _listing = f.mock_listing("fresh-token", &[]).await;

        let result = f.manager.run(&f.user_context()).await.unwrap();
        assert!(result.errors.is_empty());
        token.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_failure_skips_connection_without_writes() {
        let mut f = Fixture::new().await;
        let connection = f.personal_connection("stale-token", Some(10));
        let expires_before = f.db.get_connection(&connection).unwrap().token_expires_at;

        let _token = f
            .server
            .mock("POST", "/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;
        let listing = f.listing("stale-token", &[]).expect(0).create_async().await;

        let result = f.manager.run(&f.user_context()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("me@agency.fr: token refresh failed"));

        listing.assert_async().await;
        let stored = f.db.get_connection(&connection).unwrap();
        assert_eq!(stored.access_token, "stale-token");
        assert_eq!(stored.token_expires_at, expires_before);
        assert!(stored.last_sync_at.is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_client_is_soft_skip() {
        let mut f = Fixture::with_clients(true, false).await;
        f.shared_connection(SHARED_MAILBOX, "stale-token", Some(10));

        let token = f.mock_token(FRESH_TOKEN_RESPONSE, 0).await;
        let listing = f.listing("stale-token", &[]).expect(0).create_async().await;

        let result = f.manager.run(&RunContext::scheduler()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.connections, 1);
        assert_eq!(result.synced, 0);
        assert!(result.errors.is_empty());

        token.assert_async().await;
        listing.assert_async().await;
    }

    // ========================================================================
    // Trigger Scope & Failure Isolation
    // ========================================================================

    #[tokio::test]
    async fn test_empty_pipeline_makes_no_provider_calls() {
        let mut f = Fixture::new().await;
        f.db.get_conn()
            .unwrap()
            .execute("DELETE FROM pipeline_entries", [])
            .unwrap();
        f.personal_connection("stale-token", Some(10));

        let token = f.mock_token(FRESH_TOKEN_RESPONSE, 0).await;
        let listing = f
            .server
            .mock("GET", Matcher::Any)
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let result = f.manager.run(&f.user_context()).await.unwrap();
        assert_eq!(result.synced, 0);
        assert!(result.errors.is_empty());

        token.assert_async().await;
        listing.assert_async().await;
    }

    #[tokio::test]
    async fn test_scheduler_run_skips_personal_mailboxes() {
        let mut f = Fixture::new().await;
        f.personal_connection("personal-token", Some(3600));
        f.shared_connection(SHARED_MAILBOX, "shared-token", Some(3600));

        let personal = f.listing("personal-token", &[]).expect(0).create_async().await;
        let shared = f.mock_listing("shared-token", &["m1"]).await;
        let message = TestMessage::new("m1", "a@x.com", SHARED_MAILBOX);
        let _message = f.mock_message(&message).await;

        let result = f.manager.run(&RunContext::scheduler()).await.unwrap();
        assert_eq!(result.connections, 1);
        assert_eq!(result.synced, 1);

        personal.assert_async().await;
        shared.assert_async().await;

        let row = &f.db.messages_for_workspace(&f.ws, 1).unwrap()[0];
        assert_eq!(row.connection_category, ConnectionCategory::Workspace);
    }

    #[tokio::test]
    async fn test_listing_failure_is_isolated() {
        let mut f = Fixture::new().await;
        f.shared_connection("broken@agency.fr", "broken-token", Some(3600));
        f.shared_connection(SHARED_MAILBOX, "shared-token", Some(3600));

        let _broken = f
            .server
            .mock("GET", "/users/me/messages")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer broken-token")
            .with_status(500)
            .with_body("backend error")
            .create_async()
            .await;
        let _shared = f.mock_listing("shared-token", &["m1"]).await;
        let message = TestMessage::new("m1", "a@x.com", SHARED_MAILBOX);
        let _message = f.mock_message(&message).await;

        let result = f.manager.run(&RunContext::scheduler()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.connections, 2);
        assert_eq!(result.synced, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("broken@agency.fr: message listing failed"));
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_only_that_message() {
        let mut f = Fixture::new().await;
        f.personal_connection("valid-token", Some(3600));

        let _listing = f.mock_listing("valid-token", &["gone", "m2"]).await;
        let _gone = f
            .server
            .mock("GET", "/users/me/messages/gone")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        let message = TestMessage::new("m2", "a@x.com", MAILBOX);
        let _message = f.mock_message(&message).await;

        let result = f.manager.run(&f.user_context()).await.unwrap();
        assert_eq!(result.synced, 1);
        assert!(result.errors.is_empty());
    }

    // ========================================================================
    // Cursor
    // ========================================================================

    #[tokio::test]
    async fn test_cursor_only_moves_forward() {
        let mut f = Fixture::new().await;
        let connection = f.personal_connection("valid-token", Some(3600));
        f.db.update_sync_cursor(&connection, Some("100")).unwrap();

        let _listing = f.mock_listing("valid-token", &["m1", "m2"]).await;
        let newer = TestMessage::new("m1", "a@x.com", MAILBOX).history(120);
        let older = TestMessage::new("m2", "random@nowhere.com", MAILBOX).history(95);
        let _newer = f.mock_message(&newer).await;
        let _older = f.mock_message(&older).await;

        f.manager.run(&f.user_context()).await.unwrap();

        let stored = f.db.get_connection(&connection).unwrap();
        assert_eq!(stored.sync_cursor.as_deref(), Some("120"));
        assert!(stored.last_sync_at.is_some());
    }

    #[tokio::test]
    async fn test_cursor_kept_when_nothing_newer() {
        let mut f = Fixture::new().await;
        let connection = f.personal_connection("valid-token", Some(3600));
        f.db.update_sync_cursor(&connection, Some("500")).unwrap();

        let _listing = f.mock_listing("valid-token", &["m1"]).await;
        let message = TestMessage::new("m1", "a@x.com", MAILBOX).history(120);
        let _message = f.mock_message(&message).await;

        f.manager.run(&f.user_context()).await.unwrap();

        assert_eq!(f.db.get_connection(&connection).unwrap().sync_cursor.as_deref(), Some("500"));
    }

    #[tokio::test]
    async fn test_insert_failure_skips_only_that_message() {
        let mut f = Fixture::new().await;
        let connection = f.personal_connection("valid-token", Some(3600));
        f.db.update_sync_cursor(&connection, Some("100")).unwrap();

        f.db.get_conn()
            .unwrap()
            .execute_batch(
                r#"
                CREATE TRIGGER reject_m1 BEFORE INSERT ON synced_messages
                WHEN NEW.provider_message_id = 'm1'
                BEGIN
                    SELECT RAISE(ABORT, 'disk full');
                END;
                "#,
            )
            .unwrap();

        let _listing = f.mock_listing("valid-token", &["m1", "m2"]).await;
        let rejected = TestMessage::new("m1", "a@x.com", MAILBOX).history(130);
        let accepted = TestMessage::new("m2", "a@x.com", MAILBOX).history(110);
        let _rejected = f.mock_message(&rejected).await;
        let _accepted = f.mock_message(&accepted).await;

        let result = f.manager.run(&f.user_context()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.synced, 1);
        assert!(result.errors.is_empty());

        let stored = f.db.messages_for_workspace(&f.ws, 10).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].provider_message_id, "m2");

        let connection = f.db.get_connection(&connection).unwrap();
        assert_eq!(connection.sync_cursor.as_deref(), Some("130"));
    }
}
