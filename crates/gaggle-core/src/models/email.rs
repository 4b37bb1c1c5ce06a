//! Email data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of one email for list views
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSummary {
    /// Remote message id
    pub id: String,

    /// Owning account name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    /// Sender (raw header value)
    pub from: String,

    /// Subject line
    pub subject: String,

    /// Date sent
    pub date: DateTime<Utc>,

    /// Preview snippet
    pub snippet: String,

    /// Whether any part carries a filename
    pub has_attachments: bool,
}

/// Full detail of one email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailDetail {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    pub thread_id: String,

    pub from: String,

    #[serde(default)]
    pub to: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,

    pub subject: String,

    pub date: DateTime<Utc>,

    /// Decoded body text (plain preferred, stripped HTML as fallback)
    pub body: String,

    /// Attachment filenames
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

/// An email to draft or send
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutgoingEmail {
    /// Recipient addresses
    pub to: Vec<String>,

    /// CC addresses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,

    /// BCC addresses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,

    /// Subject line
    pub subject: String,

    /// Body text
    pub body: String,

    /// Whether the body is HTML
    #[serde(default)]
    pub is_html: bool,
}
