//! Gmail API Client
//!
//! Handles the REST calls made during a sync pass:
//! - Listing recent message ids
//! - Fetching full messages

use super::message::{GmailMessage, MessagesListResponse};
use super::{MailError, MailResult};
use reqwest::{Client, StatusCode};
use std::time::Duration;

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Client for the Gmail REST API
#[derive(Clone)]
pub struct GmailClient {
    client: Client,
    base_url: String,
}

impl GmailClient {
    /// Create a client against `base_url`; every call is bounded by `timeout`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> MailResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MailError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List message ids received or sent within the last `window_days`
    pub async fn list_recent_messages(
        &self,
        access_token: &str,
        window_days: u32,
        max_results: u32,
    ) -> MailResult<MessagesListResponse> {
        let params = [
            ("q", format!("newer_than:{}d", window_days)),
            ("maxResults", max_results.to_string()),
        ];

        let response = self.client
            .get(format!("{}/users/me/messages", self.base_url))
            .bearer_auth(access_token)
            .query(&params)
            .send()
            .await
            .map_err(MailError::transport)?;

        handle_response(response).await
    }

    /// Fetch a full message
    pub async fn get_message(&self, access_token: &str, message_id: &str) -> MailResult<GmailMessage> {
        let response = self.client
            .get(format!(
                "{}/users/me/messages/{}",
                self.base_url,
                urlencoding::encode(message_id)
            ))
            .bearer_auth(access_token)
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(MailError::transport)?;

        handle_response(response).await
    }
}

/// Handle successful JSON response
async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> MailResult<T> {
    let status = response.status();

    if status.is_success() {
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                MailError::Timeout
            } else {
                MailError::InvalidResponse(e.to_string())
            }
        })
    } else {
        Err(handle_error(response).await)
    }
}

/// Convert error response to MailError
async fn handle_error(response: reqwest::Response) -> MailError {
    let status = response.status();

    match status {
        StatusCode::UNAUTHORIZED => MailError::Unauthorized,
        _ => {
            let message = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            MailError::Provider {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            }
        }
    }
}
