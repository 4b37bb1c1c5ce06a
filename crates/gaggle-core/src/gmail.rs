//! Gmail REST adapter
//!
//! Thin client over the Gmail v1 API for one authenticated account: list and
//! fetch messages, create drafts, send drafts, and send directly. Raw RFC
//! 2822 messages are assembled here and base64url-encoded the way the API
//! expects.

use std::sync::Arc;

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::AccountConfig;
use crate::error::{Error, Result};
use crate::models::{EmailDetail, EmailSummary, OutgoingEmail};
use crate::oauth::OAuthManager;
use crate::token_store::TokenStore;

const GMAIL_API: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Message {
    #[serde(default)]
    id: String,
    #[serde(default)]
    thread_id: String,
    #[serde(default)]
    snippet: String,
    /// Epoch milliseconds, as a string
    #[serde(default)]
    internal_date: Option<String>,
    payload: Option<MessagePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: PartBody,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct PartBody {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Draft {
    id: String,
}

impl MessagePart {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

// ============================================================================
// Client
// ============================================================================

/// Gmail client for one authenticated account
pub struct GmailClient {
    account: String,
    http: Client,
    access_token: String,
}

impl GmailClient {
    /// Authenticate and build a client for the account
    pub async fn connect(
        account: &str,
        config: &AccountConfig,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self> {
        let oauth = OAuthManager::new(account, config, tokens);
        let access_token = oauth.get_valid_token().await?;
        Ok(Self {
            account: account.to_string(),
            http: Client::new(),
            access_token,
        })
    }

    /// The account this client is bound to
    pub fn account(&self) -> &str {
        &self.account
    }

    async fn check(response: Response) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Error::Gmail(format!("{} - {}", status, body)))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// List messages matching a Gmail search query
    ///
    /// A message whose metadata fetch fails is skipped, not fatal.
    pub async fn list_messages(
        &self,
        query: Option<&str>,
        max_results: u32,
    ) -> Result<Vec<EmailSummary>> {
        let mut url = format!("{}/messages?maxResults={}", GMAIL_API, max_results);
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            url.push_str("&q=");
            url.push_str(&urlencoding::encode(q));
        }

        let list: MessageList = self.get_json(&url).await?;
        debug!(
            "Listing {} message(s) for {}",
            list.messages.len(),
            self.account
        );

        let mut summaries = Vec::with_capacity(list.messages.len());
        for msg in &list.messages {
            match self.message_summary(&msg.id).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => warn!("Skipping message {}: {}", msg.id, e),
            }
        }
        Ok(summaries)
    }

    async fn message_summary(&self, id: &str) -> Result<EmailSummary> {
        let url = format!(
            "{}/messages/{}?format=metadata&metadataHeaders=From&metadataHeaders=Subject&metadataHeaders=Date",
            GMAIL_API, id
        );
        let msg: Message = self.get_json(&url).await?;
        let payload = msg.payload.unwrap_or_default();

        Ok(EmailSummary {
            id: msg.id,
            account: Some(self.account.clone()),
            from: payload.header("From").unwrap_or_default().to_string(),
            subject: payload.header("Subject").unwrap_or_default().to_string(),
            date: parse_message_date(payload.header("Date"), msg.internal_date.as_deref()),
            snippet: msg.snippet,
            has_attachments: has_attachment(&payload),
        })
    }

    /// Fetch the full message
    pub async fn get_message(&self, id: &str) -> Result<EmailDetail> {
        let url = format!("{}/messages/{}?format=full", GMAIL_API, id);
        let msg: Message = self.get_json(&url).await?;
        let payload = msg.payload.unwrap_or_default();

        Ok(EmailDetail {
            id: msg.id,
            account: Some(self.account.clone()),
            thread_id: msg.thread_id,
            from: payload.header("From").unwrap_or_default().to_string(),
            to: parse_addresses(payload.header("To").unwrap_or_default()),
            cc: parse_addresses(payload.header("Cc").unwrap_or_default()),
            subject: payload.header("Subject").unwrap_or_default().to_string(),
            date: parse_message_date(payload.header("Date"), msg.internal_date.as_deref()),
            body: extract_body(&payload).unwrap_or_default(),
            attachments: attachment_names(&payload),
        })
    }

    /// Create a draft, returning its id
    pub async fn create_draft(&self, email: &OutgoingEmail) -> Result<String> {
        let raw = build_raw_message(email);
        let draft: Draft = self
            .post_json(
                &format!("{}/drafts", GMAIL_API),
                &serde_json::json!({ "message": { "raw": raw } }),
            )
            .await?;
        debug!("Created draft {} for {}", draft.id, self.account);
        Ok(draft.id)
    }

    /// Send an existing draft, returning the message id
    pub async fn send_draft(&self, draft_id: &str) -> Result<String> {
        let sent: Message = self
            .post_json(
                &format!("{}/drafts/send", GMAIL_API),
                &serde_json::json!({ "id": draft_id }),
            )
            .await?;
        Ok(sent.id)
    }

    /// Compose and send directly, without a draft
    pub async fn send_message(&self, email: &OutgoingEmail) -> Result<String> {
        let raw = build_raw_message(email);
        let sent: Message = self
            .post_json(
                &format!("{}/messages/send", GMAIL_API),
                &serde_json::json!({ "raw": raw }),
            )
            .await?;
        Ok(sent.id)
    }
}

// ============================================================================
// Message parsing
// ============================================================================

/// Parse the Date header, falling back to Gmail's internalDate
fn parse_message_date(header: Option<&str>, internal_date: Option<&str>) -> DateTime<Utc> {
    if let Some(value) = header {
        if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
            return dt.with_timezone(&Utc);
        }
    }
    internal_date
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(|ms| DateTime::from_timestamp_millis(ms))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Split a comma-separated address header
fn parse_addresses(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn has_attachment(payload: &MessagePart) -> bool {
    payload.parts.iter().any(|p| !p.filename.is_empty())
}

fn attachment_names(payload: &MessagePart) -> Vec<String> {
    let mut names = Vec::new();
    if !payload.filename.is_empty() {
        names.push(payload.filename.clone());
    }
    for part in &payload.parts {
        names.extend(attachment_names(part));
    }
    names
}

/// Decode a base64url body, tolerating missing padding
fn decode_body(data: &str) -> Option<String> {
    let decoded = URL_SAFE
        .decode(data)
        .or_else(|_| URL_SAFE_NO_PAD.decode(data))
        .ok()?;
    String::from_utf8(decoded).ok()
}

/// Extract a readable body, preferring text/plain over stripped text/html,
/// recursing into nested multipart structures
fn extract_body(payload: &MessagePart) -> Option<String> {
    if let Some(data) = payload.body.data.as_deref() {
        if let Some(text) = decode_body(data) {
            if payload.mime_type == "text/html" {
                return Some(strip_html(&text));
            }
            return Some(text);
        }
    }

    for part in &payload.parts {
        if part.mime_type == "text/plain" {
            if let Some(text) = part.body.data.as_deref().and_then(decode_body) {
                return Some(text);
            }
        }
    }

    for part in &payload.parts {
        if part.mime_type == "text/html" {
            if let Some(text) = part.body.data.as_deref().and_then(decode_body) {
                return Some(strip_html(&text));
            }
        }
    }

    for part in &payload.parts {
        if let Some(body) = extract_body(part) {
            return Some(body);
        }
    }

    None
}

/// Reduce HTML to readable text
fn strip_html(html: &str) -> String {
    use regex::Regex;
    let mut text = html.to_string();
    let br_tag = Regex::new(r"<br\s*/?>").unwrap();
    text = br_tag.replace_all(&text, "\n").to_string();
    text = text.replace("</p>", "\n\n");
    let anchor = Regex::new(r#"<a[^>]+href="([^"]+)"[^>]*>([^<]+)</a>"#).unwrap();
    text = anchor.replace_all(&text, "$2 ($1)").to_string();
    let tag = Regex::new(r"<[^>]+>").unwrap();
    text = tag.replace_all(&text, "").to_string();
    let multi_newline = Regex::new(r"\n{3,}").unwrap();
    text = multi_newline.replace_all(&text, "\n\n").to_string();
    text.trim().to_string()
}

// ============================================================================
// Message assembly
// ============================================================================

/// Heuristic check for bodies that should be sent as HTML
pub fn detect_html_content(body: &str) -> bool {
    use regex::Regex;
    let md_link = Regex::new(r"\[.+?\]\(.+?\)").unwrap();
    if md_link.is_match(body) {
        return true;
    }
    let bold = Regex::new(r"\*\*.+?\*\*|__.+?__").unwrap();
    if bold.is_match(body) {
        return true;
    }
    let html_tag = Regex::new(r"</?[a-zA-Z][^>]*>").unwrap();
    if html_tag.is_match(body) {
        return true;
    }
    false
}

/// Build the base64url-encoded RFC 2822 message Gmail expects in `raw`
pub fn build_raw_message(email: &OutgoingEmail) -> String {
    let mut message = format!("To: {}\r\n", email.to.join(", "));

    if !email.cc.is_empty() {
        message.push_str(&format!("Cc: {}\r\n", email.cc.join(", ")));
    }
    if !email.bcc.is_empty() {
        message.push_str(&format!("Bcc: {}\r\n", email.bcc.join(", ")));
    }

    message.push_str(&format!("Subject: {}\r\nMIME-Version: 1.0\r\n", email.subject));

    if email.is_html {
        message.push_str("Content-Type: text/html; charset=utf-8\r\n");
    } else {
        message.push_str("Content-Type: text/plain; charset=utf-8\r\n");
    }

    message.push_str("\r\n");
    message.push_str(&email.body);

    URL_SAFE_NO_PAD.encode(message.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(mime_type: &str, data: Option<&str>, parts: Vec<MessagePart>) -> MessagePart {
        MessagePart {
            mime_type: mime_type.to_string(),
            filename: String::new(),
            headers: vec![],
            body: PartBody {
                data: data.map(|d| URL_SAFE.encode(d.as_bytes())),
            },
            parts,
        }
    }

    #[test]
    fn test_build_raw_message_headers() {
        let email = OutgoingEmail {
            to: vec!["a@example.com".to_string(), "b@example.com".to_string()],
            cc: vec!["c@example.com".to_string()],
            bcc: vec![],
            subject: "Greetings".to_string(),
            body: "hello there".to_string(),
            is_html: false,
        };

        let decoded = String::from_utf8(
            URL_SAFE_NO_PAD.decode(build_raw_message(&email)).unwrap(),
        )
        .unwrap();

        assert!(decoded.starts_with("To: a@example.com, b@example.com\r\n"));
        assert!(decoded.contains("Cc: c@example.com\r\n"));
        assert!(!decoded.contains("Bcc:"));
        assert!(decoded.contains("Subject: Greetings\r\n"));
        assert!(decoded.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(decoded.ends_with("\r\nhello there"));
    }

    #[test]
    fn test_build_raw_message_html_content_type() {
        let email = OutgoingEmail {
            to: vec!["a@example.com".to_string()],
            subject: "s".to_string(),
            body: "<p>hi</p>".to_string(),
            is_html: true,
            ..Default::default()
        };
        let decoded = String::from_utf8(
            URL_SAFE_NO_PAD.decode(build_raw_message(&email)).unwrap(),
        )
        .unwrap();
        assert!(decoded.contains("Content-Type: text/html; charset=utf-8\r\n"));
    }

    #[test]
    fn test_extract_body_prefers_plain_over_html() {
        let payload = part(
            "multipart/alternative",
            None,
            vec![
                part("text/html", Some("<p>rich</p>"), vec![]),
                part("text/plain", Some("plain"), vec![]),
            ],
        );
        assert_eq!(extract_body(&payload).as_deref(), Some("plain"));
    }

    #[test]
    fn test_extract_body_falls_back_to_stripped_html() {
        let payload = part(
            "multipart/alternative",
            None,
            vec![part("text/html", Some("<p>only <b>html</b></p>"), vec![])],
        );
        assert_eq!(extract_body(&payload).as_deref(), Some("only html"));
    }

    #[test]
    fn test_extract_body_recurses_into_nested_parts() {
        let payload = part(
            "multipart/mixed",
            None,
            vec![part(
                "multipart/alternative",
                None,
                vec![part("text/plain", Some("nested"), vec![])],
            )],
        );
        assert_eq!(extract_body(&payload).as_deref(), Some("nested"));
    }

    #[test]
    fn test_decode_body_handles_unpadded_input() {
        let padded = URL_SAFE.encode("hi!");
        let unpadded = URL_SAFE_NO_PAD.encode("hi!");
        assert_eq!(decode_body(&padded).as_deref(), Some("hi!"));
        assert_eq!(decode_body(&unpadded).as_deref(), Some("hi!"));
    }

    #[test]
    fn test_parse_addresses() {
        assert_eq!(
            parse_addresses("a@example.com, B <b@example.com> ,, "),
            vec!["a@example.com", "B <b@example.com>"]
        );
        assert!(parse_addresses("").is_empty());
    }

    #[test]
    fn test_parse_message_date_fallbacks() {
        let parsed = parse_message_date(Some("Tue, 1 Jul 2003 10:52:37 +0200"), None);
        assert_eq!(parsed.to_rfc3339(), "2003-07-01T08:52:37+00:00");

        let from_internal = parse_message_date(Some("garbage"), Some("1000"));
        assert_eq!(from_internal.timestamp_millis(), 1000);

        assert_eq!(parse_message_date(None, None), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_detect_html_content() {
        assert!(detect_html_content("see [docs](https://example.com)"));
        assert!(detect_html_content("this is **bold** text"));
        assert!(detect_html_content("<div>markup</div>"));
        assert!(!detect_html_content("just a plain sentence."));
    }
}
