//! # Pipeline Mail Sync - Mail Module
//!
//! Provider access (Gmail REST API) and message parsing.

pub mod gmail;
pub mod message;

// Re-export commonly used types
pub use gmail::GmailClient;
pub use message::{
    decode_body_data, decode_encoded_words, extract_address, extract_addresses, extract_body,
    truncate_chars,
    GmailMessage, MessagePart, MessagesListResponse, ParsedMessage,
};

/// Result type alias for mail operations
pub type MailResult<T> = Result<T, MailError>;

/// Unified error type for provider calls
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Provider request timed out")]
    Timeout,

    #[error("Unauthorized - access token rejected")]
    Unauthorized,

    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MailError {
    /// Classify a transport error, separating timeouts
    pub fn transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            MailError::Timeout
        } else {
            MailError::Request(error)
        }
    }
}
