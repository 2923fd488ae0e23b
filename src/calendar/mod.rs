//! Google Calendar v3 event creation

use crate::config::CalendarSection;
use crate::drafts::MeetingDraft;
use crate::oauth::{AccessTokenSource, OAuthError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Start or end of an event, in the event's own time zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    /// Local `YYYY-MM-DDTHH:MM:SS`
    pub date_time: String,
    pub time_zone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAttendee {
    pub email: String,
}

/// Body of `events.insert`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub summary: String,
    pub start: EventDateTime,
    pub end: EventDateTime,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<EventAttendee>,
}

impl CalendarEvent {
    pub fn from_draft(draft: &MeetingDraft) -> Self {
        Self {
            summary: draft.topic.clone(),
            start: EventDateTime {
                date_time: draft.start_date_time(),
                time_zone: draft.timezone.clone(),
            },
            end: EventDateTime {
                date_time: draft.end_date_time(),
                time_zone: draft.timezone.clone(),
            },
            attendees: draft
                .attendees
                .iter()
                .map(|email| EventAttendee {
                    email: email.clone(),
                })
                .collect(),
        }
    }
}

/// The fields of the created event we care about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedEvent {
    pub id: String,
    #[serde(rename = "htmlLink", default)]
    pub html_link: String,
}

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("Google Calendar not authorized: {0}")]
    NotAuthorized(String),
    #[error("Calendar API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Calendar request failed: {0}")]
    Http(String),
}

impl From<OAuthError> for CalendarError {
    fn from(error: OAuthError) -> Self {
        match error {
            OAuthError::NotAuthorized(message) => CalendarError::NotAuthorized(message),
            other => CalendarError::Http(other.to_string()),
        }
    }
}

/// Event sink
#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn insert_event(&self, event: &CalendarEvent) -> Result<CreatedEvent, CalendarError>;

    /// Whether credentials are in place
    async fn is_authorized(&self) -> bool;
}

#[derive(Debug, Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    #[serde(default)]
    message: String,
}

/// REST client for one calendar
pub struct GoogleCalendarClient {
    api_base_url: String,
    calendar_id: String,
    tokens: Arc<AccessTokenSource>,
    http: reqwest::Client,
}

impl GoogleCalendarClient {
    pub fn new(
        settings: &CalendarSection,
        tokens: Arc<AccessTokenSource>,
    ) -> Result<Self, CalendarError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CalendarError::Http(e.to_string()))?;

        Ok(Self {
            api_base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            calendar_id: settings.calendar_id.clone(),
            tokens,
            http,
        })
    }

    fn events_url(&self) -> String {
        let calendar_id: String =
            url::form_urlencoded::byte_serialize(self.calendar_id.as_bytes()).collect();
        format!("{}/calendars/{}/events", self.api_base_url, calendar_id)
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendarClient {
    async fn insert_event(&self, event: &CalendarEvent) -> Result<CreatedEvent, CalendarError> {
        let access_token = self.tokens.access_token().await?;

        debug!(calendar = %self.calendar_id, summary = %event.summary, "Inserting calendar event");
        let response = self
            .http
            .post(self.events_url())
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await
            .map_err(|e| CalendarError::Http(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CalendarError::NotAuthorized(
                "Calendar API rejected the access token".to_string(),
            ));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GoogleErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or(body);
            warn!(status = status.as_u16(), "Calendar insert failed");
            return Err(CalendarError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let created: CreatedEvent = response
            .json()
            .await
            .map_err(|e| CalendarError::Http(format!("invalid event response: {e}")))?;

        info!(event_id = %created.id, "Calendar event created");
        Ok(created)
    }

    async fn is_authorized(&self) -> bool {
        self.tokens.is_authorized().await
    }
}
