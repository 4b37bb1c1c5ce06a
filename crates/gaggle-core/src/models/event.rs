//! Calendar event data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of one calendar event for list views
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSummary {
    /// Remote event id
    pub id: String,

    /// Owning account name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    /// Calendar this event belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<String>,

    /// Event title
    pub summary: String,

    /// Start time (midnight UTC for all-day events)
    pub start: DateTime<Utc>,

    /// End time
    pub end: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Event status (confirmed, tentative, cancelled)
    pub status: String,

    pub all_day: bool,
}

/// Full detail of one calendar event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDetail {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<String>,

    pub summary: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub start: DateTime<Utc>,

    pub end: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    pub status: String,

    pub all_day: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

/// Input for creating or updating an event
///
/// For updates, only the provided fields change; `None` leaves the remote
/// value untouched.
#[derive(Debug, Clone, Default)]
pub struct EventInput {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub attendees: Vec<String>,
}

/// Basic calendar information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarInfo {
    pub id: String,

    pub summary: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub primary: bool,
}
