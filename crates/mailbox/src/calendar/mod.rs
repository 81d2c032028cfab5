//! Google Calendar API v3: upcoming events, event lifecycle and free/busy.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use mailroom_core::config::TokenBundle;
use mailroom_core::error::{MailroomError, Result};
use mailroom_core::types::{BusyInterval, FetchedEvent};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::auth::{json_body, GoogleAuth};

const PRIMARY: &str = "primary";

/// Fields the remote calendar needs to create or replace an event.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEventInput {
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub timezone: String,
    pub attendees: Vec<String>,
}

#[async_trait]
pub trait CalendarClient: Send + Sync {
    async fn list_upcoming(&self, max_results: u32) -> Result<Vec<FetchedEvent>>;

    async fn create_event(&self, event: &RemoteEventInput) -> Result<FetchedEvent>;

    async fn update_event(&self, external_id: &str, event: &RemoteEventInput) -> Result<FetchedEvent>;

    /// `Ok(false)` when the remote event no longer exists.
    async fn delete_event(&self, external_id: &str) -> Result<bool>;

    async fn query_free_busy(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<GoogleEventRaw>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventRaw {
    #[serde(default)]
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    start: Option<EventDateTime>,
    end: Option<EventDateTime>,
    #[serde(default)]
    attendees: Vec<Attendee>,
    organizer: Option<Organizer>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Attendee {
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
struct Organizer {
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<FreeBusySpan>,
}

#[derive(Debug, Deserialize)]
struct FreeBusySpan {
    start: String,
    end: String,
}

pub struct GoogleCalendarClient {
    auth: GoogleAuth,
    api_base: String,
}

impl GoogleCalendarClient {
    pub fn new(bundle: TokenBundle, api_base: impl Into<String>) -> Self {
        Self {
            auth: GoogleAuth::new(bundle, reqwest::Client::new()),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/{}/events", self.api_base, PRIMARY)
    }
}

#[async_trait]
impl CalendarClient for GoogleCalendarClient {
    async fn list_upcoming(&self, max_results: u32) -> Result<Vec<FetchedEvent>> {
        let url = self.events_url();
        let time_min = rfc3339(Utc::now());
        let max = max_results.to_string();

        let resp = self
            .auth
            .send(|http, token| {
                http.get(&url).bearer_auth(token).query(&[
                    ("timeMin", time_min.as_str()),
                    ("maxResults", max.as_str()),
                    ("singleEvents", "true"),
                    ("orderBy", "startTime"),
                ])
            })
            .await?;
        let body: EventListResponse = json_body(resp).await?;

        info!("Fetched {} upcoming calendar events", body.items.len());
        Ok(body.items.into_iter().map(normalize_event).collect())
    }

    async fn create_event(&self, event: &RemoteEventInput) -> Result<FetchedEvent> {
        let url = self.events_url();
        let payload = event_body(event);
        let resp = self
            .auth
            .send(|http, token| http.post(&url).bearer_auth(token).json(&payload))
            .await?;
        let created: GoogleEventRaw = json_body(resp).await?;

        info!("Created calendar event {}", created.id);
        Ok(normalize_event(created))
    }

    async fn update_event(&self, external_id: &str, event: &RemoteEventInput) -> Result<FetchedEvent> {
        let url = format!("{}/{}", self.events_url(), external_id);
        let payload = event_body(event);
        let resp = self
            .auth
            .send(|http, token| http.patch(&url).bearer_auth(token).json(&payload))
            .await?;
        let updated: GoogleEventRaw = json_body(resp).await?;
        Ok(normalize_event(updated))
    }

    async fn delete_event(&self, external_id: &str) -> Result<bool> {
        let url = format!("{}/{}", self.events_url(), external_id);
        let resp = self
            .auth
            .send_raw(|http, token| http.delete(&url).bearer_auth(token))
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(false),
            s => Err(MailroomError::UpstreamUnavailable(format!(
                "Calendar delete failed with {}",
                s.as_u16()
            ))),
        }
    }

    async fn query_free_busy(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>> {
        let url = format!("{}/freeBusy", self.api_base);
        let payload = json!({
            "timeMin": rfc3339(from),
            "timeMax": rfc3339(to),
            "items": [{ "id": PRIMARY }],
        });
        let resp = self
            .auth
            .send(|http, token| http.post(&url).bearer_auth(token).json(&payload))
            .await?;
        let body: FreeBusyResponse = json_body(resp).await?;

        Ok(busy_intervals(body))
    }
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn event_body(event: &RemoteEventInput) -> serde_json::Value {
    let when = |at: DateTime<Utc>| EventDateTime {
        date_time: Some(rfc3339(at)),
        date: None,
        time_zone: Some(event.timezone.clone()),
    };
    let attendees: Vec<_> = event
        .attendees
        .iter()
        .map(|email| json!({ "email": email }))
        .collect();

    json!({
        "summary": event.title,
        "description": event.description,
        "location": event.location.clone().unwrap_or_default(),
        "start": when(event.start),
        "end": when(event.end),
        "attendees": attendees,
    })
}

fn normalize_event(raw: GoogleEventRaw) -> FetchedEvent {
    let pick = |dt: &Option<EventDateTime>| -> String {
        dt.as_ref()
            .and_then(|d| d.date_time.as_deref().or(d.date.as_deref()))
            .unwrap_or_default()
            .to_string()
    };
    let timezone = raw.start.as_ref().and_then(|s| s.time_zone.clone());

    FetchedEvent {
        start: pick(&raw.start),
        end: pick(&raw.end),
        external_id: raw.id,
        title: raw.summary.unwrap_or_else(|| "No Title".to_string()),
        description: raw.description.unwrap_or_default(),
        location: raw.location.filter(|l| !l.is_empty()),
        timezone,
        attendees: raw
            .attendees
            .into_iter()
            .map(|a| a.email)
            .filter(|e| !e.is_empty())
            .collect(),
        organizer: raw.organizer.map(|o| o.email).filter(|e| !e.is_empty()),
        status: raw.status,
    }
}

fn busy_intervals(body: FreeBusyResponse) -> Vec<BusyInterval> {
    let Some(calendar) = body.calendars.get(PRIMARY) else {
        return Vec::new();
    };

    calendar
        .busy
        .iter()
        .filter_map(|span| {
            let start = DateTime::parse_from_rfc3339(&span.start);
            let end = DateTime::parse_from_rfc3339(&span.end);
            match (start, end) {
                (Ok(start), Ok(end)) => Some(BusyInterval {
                    start: start.with_timezone(&Utc),
                    end: end.with_timezone(&Utc),
                }),
                _ => {
                    warn!("Ignoring unparseable busy span {} - {}", span.start, span.end);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn normalizes_timed_and_all_day_events() {
        let raw: EventListResponse = serde_json::from_value(json!({
            "items": [
                {
                    "id": "ev1",
                    "summary": "Standup",
                    "start": {"dateTime": "2026-10-19T09:00:00Z", "timeZone": "Europe/Berlin"},
                    "end": {"dateTime": "2026-10-19T09:15:00Z"},
                    "attendees": [{"email": "ana@example.com"}, {"email": ""}],
                    "organizer": {"email": "lead@example.com"},
                    "status": "confirmed"
                },
                {
                    "id": "ev2",
                    "start": {"date": "2026-10-20"},
                    "end": {"date": "2026-10-21"},
                    "location": ""
                }
            ]
        }))
        .unwrap();

        let events: Vec<FetchedEvent> = raw.items.into_iter().map(normalize_event).collect();
        assert_eq!(events[0].title, "Standup");
        assert_eq!(events[0].start, "2026-10-19T09:00:00Z");
        assert_eq!(events[0].timezone.as_deref(), Some("Europe/Berlin"));
        assert_eq!(events[0].attendees, vec!["ana@example.com"]);
        assert_eq!(events[0].organizer.as_deref(), Some("lead@example.com"));

        assert_eq!(events[1].title, "No Title");
        assert_eq!(events[1].start, "2026-10-20");
        assert_eq!(events[1].location, None);
        assert_eq!(events[1].status, None);
    }

    #[test]
    fn free_busy_spans_become_utc_intervals() {
        let body: FreeBusyResponse = serde_json::from_value(json!({
            "calendars": {
                "primary": {
                    "busy": [
                        {"start": "2026-10-19T12:00:00+02:00", "end": "2026-10-19T13:00:00+02:00"},
                        {"start": "garbage", "end": "2026-10-19T15:00:00Z"}
                    ]
                }
            }
        }))
        .unwrap();

        let busy = busy_intervals(body);
        assert_eq!(
            busy,
            vec![BusyInterval {
                start: Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2026, 10, 19, 11, 0, 0).unwrap(),
            }]
        );
    }

    #[test]
    fn request_body_carries_timezone_and_attendees() {
        let input = RemoteEventInput {
            title: "Review".into(),
            description: "Q3".into(),
            location: None,
            start: Utc.with_ymd_and_hms(2026, 10, 19, 14, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 10, 19, 15, 0, 0).unwrap(),
            timezone: "UTC".into(),
            attendees: vec!["ana@example.com".into()],
        };
        let body = event_body(&input);
        assert_eq!(body["start"]["dateTime"], "2026-10-19T14:00:00Z");
        assert_eq!(body["end"]["timeZone"], "UTC");
        assert!(body["start"].get("date").is_none());
        assert_eq!(body["attendees"][0]["email"], "ana@example.com");
    }
}
