//! Provider message payloads and parsing
//!
//! Typed shapes of the listing and message responses, header lookup,
//! address extraction and MIME body descent.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

/// Standard alphabet, padding optional (provider payloads omit it)
const BODY_DECODER: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// ============================================================================
// Response shapes
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagesListResponse {
    pub messages: Option<Vec<MessageRef>>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
    #[serde(rename = "resultSizeEstimate")]
    pub result_size_estimate: Option<u64>,
}

impl MessagesListResponse {
    /// Listed ids in provider order
    pub fn ids(&self) -> Vec<String> {
        self.messages
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|m| m.id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GmailMessage {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
    #[serde(rename = "labelIds")]
    pub label_ids: Option<Vec<String>>,
    pub snippet: Option<String>,
    #[serde(rename = "historyId")]
    pub history_id: Option<String>,
    /// Milliseconds since the epoch, as a string
    #[serde(rename = "internalDate")]
    pub internal_date: Option<String>,
    pub payload: Option<MessagePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "partId")]
    pub part_id: Option<String>,
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    pub headers: Option<Vec<Header>>,
    pub body: Option<MessagePartBody>,
    pub parts: Option<Vec<MessagePart>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePartBody {
    #[serde(rename = "attachmentId")]
    pub attachment_id: Option<String>,
    pub size: Option<u64>,
    pub data: Option<String>,
}

impl GmailMessage {
    /// Case-insensitive header lookup on the top-level payload
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .as_ref()?
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn labels(&self) -> &[String] {
        self.label_ids.as_deref().unwrap_or_default()
    }

    pub fn is_unread(&self) -> bool {
        self.labels().iter().any(|l| l == "UNREAD")
    }

    /// Provider timestamp, falling back to the Date header
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.internal_date
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .or_else(|| {
                self.header("Date")
                    .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
                    .map(|d| d.with_timezone(&Utc))
            })
    }

    /// Numeric history id, used as the sync cursor
    pub fn history_id_value(&self) -> Option<u64> {
        self.history_id.as_deref().and_then(|h| h.parse().ok())
    }
}

// ============================================================================
// Parsed message
// ============================================================================

/// Normalized view of a provider message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub provider_id: String,
    pub thread_id: Option<String>,
    pub from: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub labels: Vec<String>,
    pub is_read: bool,
    pub date: Option<DateTime<Utc>>,
    pub history_id: Option<u64>,
}

impl ParsedMessage {
    pub fn from_gmail(message: &GmailMessage) -> Self {
        let body = message
            .payload
            .as_ref()
            .map(extract_body)
            .unwrap_or_default();

        Self {
            provider_id: message.id.clone(),
            thread_id: message.thread_id.clone().filter(|t| !t.is_empty()),
            from: message.header("From").and_then(extract_address),
            to: message.header("To").map(extract_addresses).unwrap_or_default(),
            cc: message.header("Cc").map(extract_addresses).unwrap_or_default(),
            subject: decode_encoded_words(message.header("Subject").unwrap_or_default().trim()),
            body,
            labels: message.labels().to_vec(),
            is_read: !message.is_unread(),
            date: message.timestamp(),
            history_id: message.history_id_value(),
        }
    }

    /// Primary recipient
    pub fn primary_to(&self) -> Option<&str> {
        self.to.first().map(String::as_str)
    }
}

// ============================================================================
// Addresses
// ============================================================================

/// First address of a header value, lower-cased
///
/// Accepts `a@x.com` and `Display Name <a@x.com>` forms.
pub fn extract_address(value: &str) -> Option<String> {
    extract_addresses(value).into_iter().next()
}

/// Every address of a header value, lower-cased
pub fn extract_addresses(value: &str) -> Vec<String> {
    split_mailboxes(value)
        .into_iter()
        .filter_map(|mailbox| single_address(&mailbox))
        .collect()
}

fn single_address(mailbox: &str) -> Option<String> {
    let candidate = match (mailbox.rfind('<'), mailbox.rfind('>')) {
        (Some(start), Some(end)) if start < end => &mailbox[start + 1..end],
        _ => mailbox,
    };

    let address = candidate.trim().trim_matches('"').trim().to_lowercase();
    if address.contains('@') {
        Some(address)
    } else {
        None
    }
}

/// Split on commas that are outside quotes and angle brackets
fn split_mailboxes(value: &str) -> Vec<String> {
    let mut mailboxes = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;

    for ch in value.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '<' if !in_quotes => {
                in_angle = true;
                current.push(ch);
            }
            '>' if !in_quotes => {
                in_angle = false;
                current.push(ch);
            }
            ',' if !in_quotes && !in_angle => {
                mailboxes.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    mailboxes.push(current);

    mailboxes
        .into_iter()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect()
}

// ============================================================================
// Encoded words
// ============================================================================

/// Decode RFC 2047 encoded words (`=?charset?B|Q?text?=`)
///
/// Words that fail to decode are kept verbatim.
pub fn decode_encoded_words(input: &str) -> String {
    if !input.contains("=?") {
        return input.to_string();
    }

    let Ok(re) = regex_lite::Regex::new(r"=\?([^?]+)\?([BbQq])\?([^?]*)\?=") else {
        return input.to_string();
    };

    // Whitespace between adjacent encoded words is not part of the text
    let mut result = String::new();
    let mut last_end = 0;
    let mut previous_was_word = false;

    for caps in re.captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        let between = &input[last_end..whole.start()];
        if !(previous_was_word && between.trim().is_empty()) {
            result.push_str(between);
        }

        let encoding = caps.get(2).map(|m| m.as_str()).unwrap_or("B");
        let text = caps.get(3).map(|m| m.as_str()).unwrap_or("");
        let decoded = if encoding.eq_ignore_ascii_case("b") {
            BODY_DECODER
                .decode(text)
                .ok()
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        } else {
            Some(decode_q_encoding(text))
        };

        match decoded {
            Some(decoded) => result.push_str(&decoded),
            None => result.push_str(whole.as_str()),
        }

        last_end = whole.end();
        previous_was_word = true;
    }
    result.push_str(&input[last_end..]);

    result
}

fn decode_q_encoding(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' if i + 2 < bytes.len() => {
                match std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                {
                    Some(byte) => {
                        out.push(byte);
                        i += 2;
                    }
                    None => out.push(b'='),
                }
            }
            other => out.push(other),
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

// ============================================================================
// Body
// ============================================================================

/// Message body, HTML preferred over plain text
///
/// Missing bodies yield an empty string.
pub fn extract_body(payload: &MessagePart) -> String {
    find_body_data(payload)
        .and_then(decode_body_data)
        .unwrap_or_default()
}

fn find_body_data(part: &MessagePart) -> Option<&str> {
    let children = part.parts.as_deref().unwrap_or_default();

    // Single-part message: the payload carries the body itself
    if children.is_empty() {
        return part_data(part);
    }

    children
        .iter()
        .find(|p| is_mime(p, &mime::TEXT_HTML))
        .and_then(part_data)
        .or_else(|| {
            children
                .iter()
                .find(|p| is_mime(p, &mime::TEXT_PLAIN))
                .and_then(part_data)
        })
        .or_else(|| {
            children
                .iter()
                .filter(|p| is_multipart(p))
                .find_map(find_body_data)
        })
}

fn part_data(part: &MessagePart) -> Option<&str> {
    part.body
        .as_ref()?
        .data
        .as_deref()
        .filter(|d| !d.is_empty())
}

fn parsed_mime(part: &MessagePart) -> Option<mime::Mime> {
    part.mime_type.as_deref()?.parse().ok()
}

fn is_mime(part: &MessagePart, expected: &mime::Mime) -> bool {
    parsed_mime(part)
        .map(|m| m.essence_str() == expected.essence_str())
        .unwrap_or(false)
}

fn is_multipart(part: &MessagePart) -> bool {
    parsed_mime(part)
        .map(|m| m.type_() == mime::MULTIPART)
        .unwrap_or_else(|| part.parts.as_ref().is_some_and(|p| !p.is_empty()))
}

/// Decode URL-safe base64 body data as UTF-8
pub fn decode_body_data(data: &str) -> Option<String> {
    let standard: String = data
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    match BODY_DECODER.decode(standard.as_bytes()) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            log::debug!("Failed to decode message body: {}", e);
            None
        }
    }
}

/// Truncate to at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
