//! Google Calendar REST adapter
//!
//! Client over the Calendar v3 API for one authenticated account. The
//! calendar queried defaults to the account's configured calendar id, falling
//! back to the primary calendar.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::AccountConfig;
use crate::error::{Error, Result};
use crate::models::{CalendarInfo, EventDetail, EventInput, EventSummary};
use crate::oauth::OAuthManager;
use crate::token_store::TokenStore;

const CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<EventResource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventResource {
    #[serde(default)]
    id: String,
    #[serde(default)]
    summary: String,
    description: Option<String>,
    location: Option<String>,
    #[serde(default)]
    status: String,
    html_link: Option<String>,
    start: Option<EventTimeSlot>,
    end: Option<EventTimeSlot>,
    organizer: Option<EventActor>,
    #[serde(default)]
    attendees: Vec<EventActor>,
    created: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTimeSlot {
    date_time: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EventActor {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarList {
    #[serde(default)]
    items: Vec<CalendarResource>,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarResource {
    #[serde(default)]
    id: String,
    #[serde(default)]
    summary: String,
    description: Option<String>,
    #[serde(default)]
    primary: bool,
}

// ============================================================================
// Client
// ============================================================================

/// Calendar client for one authenticated account
pub struct CalendarClient {
    account: String,
    calendar_id: String,
    http: Client,
    access_token: String,
}

impl CalendarClient {
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
            calendar_id: config.calendar_id().to_string(),
            http: Client::new(),
            access_token,
        })
    }

    /// The account this client is bound to
    pub fn account(&self) -> &str {
        &self.account
    }

    /// The calendar being queried
    pub fn calendar_id(&self) -> &str {
        &self.calendar_id
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            CALENDAR_API,
            urlencoding::encode(&self.calendar_id)
        )
    }

    async fn check(response: Response) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Error::Calendar(format!("{} - {}", status, body)))
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

    /// List events within a time range, expanded to single instances and
    /// ordered by start time
    pub async fn list_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<EventSummary>> {
        let url = format!(
            "{}?timeMin={}&timeMax={}&singleEvents=true&orderBy=startTime&maxResults={}",
            self.events_url(),
            urlencoding::encode(&from.to_rfc3339()),
            urlencoding::encode(&to.to_rfc3339()),
            max_results
        );

        let list: EventList = self.get_json(&url).await?;
        debug!(
            "Listing {} event(s) for {} ({})",
            list.items.len(),
            self.account,
            self.calendar_id
        );

        Ok(list
            .items
            .into_iter()
            .map(|e| self.to_summary(e))
            .collect())
    }

    /// Fetch one event
    pub async fn get_event(&self, event_id: &str) -> Result<EventDetail> {
        let url = format!("{}/{}", self.events_url(), urlencoding::encode(event_id));
        let event: EventResource = self.get_json(&url).await?;
        Ok(self.to_detail(event))
    }

    /// Create an event, returning its id
    pub async fn create_event(&self, input: &EventInput) -> Result<String> {
        let summary = input
            .summary
            .as_deref()
            .ok_or_else(|| Error::Calendar("event summary is required".to_string()))?;
        let start = input
            .start
            .ok_or_else(|| Error::Calendar("event start time is required".to_string()))?;
        let end = input
            .end
            .ok_or_else(|| Error::Calendar("event end time is required".to_string()))?;

        let mut body = serde_json::json!({
            "summary": summary,
            "start": time_slot(start, input.all_day),
            "end": time_slot(end, input.all_day),
        });
        if let Some(description) = &input.description {
            body["description"] = serde_json::json!(description);
        }
        if let Some(location) = &input.location {
            body["location"] = serde_json::json!(location);
        }
        if !input.attendees.is_empty() {
            body["attendees"] = attendees_json(&input.attendees);
        }

        let response = self
            .http
            .post(self.events_url())
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        let created: EventResource = Self::check(response).await?.json().await?;
        Ok(created.id)
    }

    /// Update an event; only the fields provided in `input` change
    pub async fn update_event(&self, event_id: &str, input: &EventInput) -> Result<()> {
        let url = format!("{}/{}", self.events_url(), urlencoding::encode(event_id));

        // Fetch the full resource, merge, and write it back whole
        let mut event: serde_json::Value = self.get_json(&url).await?;

        if let Some(summary) = &input.summary {
            event["summary"] = serde_json::json!(summary);
        }
        if let Some(description) = &input.description {
            event["description"] = serde_json::json!(description);
        }
        if let Some(location) = &input.location {
            event["location"] = serde_json::json!(location);
        }
        if let Some(start) = input.start {
            event["start"] = time_slot(start, input.all_day);
        }
        if let Some(end) = input.end {
            event["end"] = time_slot(end, input.all_day);
        }
        if !input.attendees.is_empty() {
            event["attendees"] = attendees_json(&input.attendees);
        }

        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.access_token)
            .json(&event)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Delete an event
    pub async fn delete_event(&self, event_id: &str) -> Result<()> {
        let url = format!("{}/{}", self.events_url(), urlencoding::encode(event_id));
        let response = self
            .http
            .delete(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// List the account's calendars
    pub async fn list_calendars(&self) -> Result<Vec<CalendarInfo>> {
        let url = format!("{}/users/me/calendarList", CALENDAR_API);
        let list: CalendarList = self.get_json(&url).await?;
        Ok(list
            .items
            .into_iter()
            .map(|c| CalendarInfo {
                id: c.id,
                summary: c.summary,
                description: c.description,
                primary: c.primary,
            })
            .collect())
    }

    fn to_summary(&self, event: EventResource) -> EventSummary {
        let (start, all_day) = parse_event_time(event.start.as_ref());
        let (end, _) = parse_event_time(event.end.as_ref());
        EventSummary {
            id: event.id,
            account: Some(self.account.clone()),
            calendar_id: Some(self.calendar_id.clone()),
            summary: event.summary,
            start,
            end,
            location: event.location,
            status: event.status,
            all_day,
        }
    }

    fn to_detail(&self, event: EventResource) -> EventDetail {
        let (start, all_day) = parse_event_time(event.start.as_ref());
        let (end, _) = parse_event_time(event.end.as_ref());
        EventDetail {
            id: event.id,
            account: Some(self.account.clone()),
            calendar_id: Some(self.calendar_id.clone()),
            summary: event.summary,
            description: event.description,
            start,
            end,
            location: event.location,
            status: event.status,
            all_day,
            attendees: event
                .attendees
                .into_iter()
                .filter_map(|a| a.email)
                .collect(),
            organizer: event.organizer.and_then(|o| o.email),
            html_link: event.html_link,
            created: parse_rfc3339(event.created.as_deref()),
            updated: parse_rfc3339(event.updated.as_deref()),
        }
    }
}

// ============================================================================
// Time handling
// ============================================================================

/// Build the start/end object for the API: a bare date for all-day events,
/// RFC 3339 with offset otherwise
fn time_slot(t: DateTime<Utc>, all_day: bool) -> serde_json::Value {
    if all_day {
        serde_json::json!({ "date": t.format("%Y-%m-%d").to_string() })
    } else {
        serde_json::json!({ "dateTime": t.to_rfc3339() })
    }
}

fn attendees_json(attendees: &[String]) -> serde_json::Value {
    serde_json::json!(attendees
        .iter()
        .map(|email| serde_json::json!({ "email": email }))
        .collect::<Vec<_>>())
}

/// Parse a start/end slot: `dateTime` for timed events, `date` (midnight
/// UTC) for all-day events
fn parse_event_time(slot: Option<&EventTimeSlot>) -> (DateTime<Utc>, bool) {
    if let Some(slot) = slot {
        if let Some(dt) = slot.date_time.as_deref() {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(dt) {
                return (parsed.with_timezone(&Utc), false);
            }
        }
        if let Some(d) = slot.date.as_deref() {
            if let Ok(parsed) = NaiveDate::parse_from_str(d, "%Y-%m-%d") {
                return (
                    parsed.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
                    true,
                );
            }
        }
    }
    (DateTime::UNIX_EPOCH, false)
}

fn parse_rfc3339(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_time_timed() {
        let slot = EventTimeSlot {
            date_time: Some("2024-12-25T10:00:00+02:00".to_string()),
            date: None,
        };
        let (start, all_day) = parse_event_time(Some(&slot));
        assert!(!all_day);
        assert_eq!(start.to_rfc3339(), "2024-12-25T08:00:00+00:00");
    }

    #[test]
    fn test_parse_event_time_all_day() {
        let slot = EventTimeSlot {
            date_time: None,
            date: Some("2024-12-25".to_string()),
        };
        let (start, all_day) = parse_event_time(Some(&slot));
        assert!(all_day);
        assert_eq!(start.to_rfc3339(), "2024-12-25T00:00:00+00:00");
    }

    #[test]
    fn test_parse_event_time_missing() {
        let (start, all_day) = parse_event_time(None);
        assert!(!all_day);
        assert_eq!(start, DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_time_slot_shapes() {
        let t = DateTime::parse_from_rfc3339("2024-12-25T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let all_day = time_slot(t, true);
        assert_eq!(all_day["date"], "2024-12-25");
        assert!(all_day.get("dateTime").is_none());

        let timed = time_slot(t, false);
        assert_eq!(timed["dateTime"], "2024-12-25T10:00:00+00:00");
    }

    #[test]
    fn test_event_resource_deserializes_from_api_shape() {
        let json = serde_json::json!({
            "id": "evt1",
            "summary": "Standup",
            "status": "confirmed",
            "htmlLink": "https://calendar.google.com/event?eid=evt1",
            "start": { "dateTime": "2024-06-01T09:00:00Z" },
            "end": { "dateTime": "2024-06-01T09:15:00Z" },
            "organizer": { "email": "boss@example.com" },
            "attendees": [ { "email": "a@example.com" }, { "email": "b@example.com" } ]
        });
        let event: EventResource = serde_json::from_value(json).unwrap();
        assert_eq!(event.id, "evt1");
        assert_eq!(event.attendees.len(), 2);
        assert_eq!(event.organizer.unwrap().email.as_deref(), Some("boss@example.com"));
    }
}
