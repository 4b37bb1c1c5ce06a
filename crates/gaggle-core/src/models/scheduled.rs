//! Scheduled-email records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scheduled email persisted in the outbox store
///
/// A record is in exactly one of three states: pending (`!sent`, no error),
/// sent, or errored. The store never moves a record out of the sent or
/// errored states automatically; an operator re-schedules instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledEmail {
    /// Unique id, assigned by the store at creation
    pub id: String,

    /// Owning account name (not validated against the config at write time)
    pub account: String,

    /// Remote draft that will be sent verbatim
    pub draft_id: String,

    /// Recipient addresses
    pub to: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,

    /// Subject, kept for display; the remote draft is authoritative
    pub subject: String,

    /// Body, kept for display
    pub body: String,

    #[serde(default)]
    pub is_html: bool,

    /// The instant before which this email must not be dispatched
    pub scheduled_at: DateTime<Utc>,

    /// Set once at creation
    pub created_at: DateTime<Utc>,

    /// Becomes true exactly once, on successful dispatch
    #[serde(default)]
    pub sent: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,

    /// Remote message id recorded on successful dispatch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// Last dispatch error; its presence makes the record ineligible for
    /// further automatic attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScheduledEmail {
    /// Neither sent nor errored
    pub fn is_pending(&self) -> bool {
        !self.sent && self.error.is_none()
    }

    /// Pending and past its scheduled time (strictly: an email scheduled for
    /// exactly `now` is not yet due)
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.scheduled_at < now
    }
}

/// Input for scheduling a new email
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub account: String,
    pub draft_id: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub is_html: bool,
    pub scheduled_at: DateTime<Utc>,
}
