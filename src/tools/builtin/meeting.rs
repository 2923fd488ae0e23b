//! Meeting drafting and scheduling
//!
//! Scheduling is two-step: `save_meeting_details` validates the details and
//! stores a draft, and `schedule_meeting` creates the calendar event only
//! once the user has confirmed it.

use crate::calendar::{CalendarError, CalendarEvent, CreatedEvent};
use crate::drafts::{DraftStore, MeetingDraft};
use crate::mail::templates::{
    meeting_admin_html, meeting_confirmation_html, render_admin_email, render_user_email,
    MeetingSummary,
};
use crate::mail::OutgoingEmail;
use crate::tools::{Tool, ToolContext, ToolDescription, ToolError};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

pub const DEFAULT_TOPIC: &str = "Meeting";

static TIME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}:\d{2}$").expect("valid time pattern"));

static ATTENDEE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.+-]+@[\w.-]+\.\w+$").expect("valid attendee pattern"));

/// Meeting details as supplied by the model or an HTTP client
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MeetingRequest {
    /// Meeting title
    #[serde(default)]
    pub topic: Option<String>,
    /// Date as YYYY-MM-DD
    #[serde(default)]
    pub date: Option<String>,
    /// Start time as HH:MM, 24-hour clock
    #[serde(default)]
    pub start_time: Option<String>,
    /// End time as HH:MM, 24-hour clock
    #[serde(default)]
    pub end_time: Option<String>,
    /// Time zone; IST unless the user explicitly names another
    #[serde(default)]
    pub timezone: Option<String>,
    /// Attendee email addresses
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
    /// Alternative to the fields above: the whole meeting as a JSON string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_json: Option<String>,
}

/// Map common abbreviations to IANA names; anything else passes through
pub fn normalize_timezone(timezone: Option<&str>, default_timezone: &str) -> String {
    match timezone.map(str::trim) {
        None | Some("") => default_timezone.to_string(),
        Some(tz) => match tz.to_ascii_uppercase().as_str() {
            "IST" => "Asia/Kolkata".to_string(),
            "UTC" | "GMT" | "Z" => "UTC".to_string(),
            _ => tz.to_string(),
        },
    }
}

fn parse_time(value: Option<&str>, field: &str) -> Result<NaiveTime, String> {
    let invalid = || format!("Invalid {field}. Must be HH:MM (24hr format).");
    let value = value.map(str::trim).filter(|v| TIME_PATTERN.is_match(v));
    value
        .and_then(|v| NaiveTime::parse_from_str(v, "%H:%M").ok())
        .ok_or_else(invalid)
}

/// Validate a request into a draft
pub fn build_meeting_draft(
    request: MeetingRequest,
    default_timezone: &str,
) -> Result<MeetingDraft, String> {
    let request = match request.meeting_json {
        Some(ref json) => serde_json::from_str::<MeetingRequest>(json)
            .map_err(|e| format!("Invalid JSON. Error: {e}"))?,
        None => request,
    };

    let date = request
        .date
        .as_deref()
        .map(str::trim)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .ok_or_else(|| "Invalid date. Must be YYYY-MM-DD.".to_string())?;

    let start_time = parse_time(request.start_time.as_deref(), "start_time")?;
    let end_time = parse_time(request.end_time.as_deref(), "end_time")?;
    if end_time <= start_time {
        return Err("Invalid end_time. Must be after start_time.".to_string());
    }

    let attendees: Vec<String> = request
        .attendees
        .unwrap_or_default()
        .into_iter()
        .map(|attendee| attendee.trim().to_string())
        .filter(|attendee| !attendee.is_empty())
        .collect();
    if let Some(bad) = attendees.iter().find(|a| !ATTENDEE_PATTERN.is_match(a)) {
        return Err(format!("Invalid attendee email: {bad}"));
    }

    let topic = request
        .topic
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TOPIC.to_string());

    Ok(MeetingDraft {
        topic,
        date,
        start_time,
        end_time,
        timezone: normalize_timezone(request.timezone.as_deref(), default_timezone),
        attendees,
    })
}

/// Schema for the model, without the root metadata schemars adds
fn meeting_schema() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(MeetingRequest))
        .unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    schema
}

/// `save_meeting_details`
pub struct SaveMeetingDetailsTool {
    drafts: DraftStore,
    default_timezone: String,
}

impl SaveMeetingDetailsTool {
    pub fn new(drafts: DraftStore, default_timezone: String) -> Self {
        Self {
            drafts,
            default_timezone,
        }
    }

    fn summary(draft: &MeetingDraft) -> String {
        let mut summary = format!(
            "Meeting Draft Created\n\nTitle: {}\nDate: {}\nTime: {} ({})\n",
            draft.topic,
            draft.date,
            draft.time_range(),
            draft.timezone
        );
        if !draft.attendees.is_empty() {
            summary.push_str(&format!("Attendees: {}\n", draft.attendees.join(", ")));
        }
        summary.push_str("\nSay \"confirm meeting\" to schedule.");
        summary
    }
}

#[async_trait]
impl Tool for SaveMeetingDetailsTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "save_meeting_details".to_string(),
            description: "Create a meeting draft. Fields: topic, date (YYYY-MM-DD), \
                          start_time (HH:MM), end_time (HH:MM), timezone (keep IST unless the \
                          user states otherwise), attendees (optional email list)."
                .to_string(),
            parameters: meeting_schema(),
        }
    }

    async fn initialize(&mut self, config: Option<&Value>) -> Result<(), ToolError> {
        if let Some(tz) = config
            .and_then(|c| c.get("default_timezone"))
            .and_then(|t| t.as_str())
        {
            self.default_timezone = tz.to_string();
        }
        Ok(())
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let request: MeetingRequest = serde_json::from_value(parameters.clone())
            .map_err(|e| ToolError::ExecutionError(format!("Invalid JSON. Error: {e}")))?;

        let draft = build_meeting_draft(request, &self.default_timezone)
            .map_err(ToolError::ExecutionError)?;

        info!(
            topic = %draft.topic,
            date = %draft.date,
            timezone = %draft.timezone,
            attendees = draft.attendees.len(),
            "Meeting draft saved"
        );
        let summary = Self::summary(&draft);
        self.drafts.save_meeting(draft).await;

        Ok(Value::String(summary))
    }
}

/// `schedule_meeting`
pub struct ScheduleMeetingTool {
    context: ToolContext,
}

impl ScheduleMeetingTool {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }

    /// Confirmation to the attendee plus the admin copy (pure function)
    fn confirmation_emails(
        draft: &MeetingDraft,
        created: &CreatedEvent,
        attendee: &str,
        admin_email: Option<&str>,
        assistant_name: &str,
    ) -> Vec<OutgoingEmail> {
        let date = draft.date.to_string();
        let time_range = draft.time_range();
        let summary = MeetingSummary {
            topic: &draft.topic,
            date: &date,
            time_range: &time_range,
            timezone: &draft.timezone,
            link: &created.html_link,
        };

        let subject = format!("Meeting Confirmed: {}", draft.topic);
        let mut emails = vec![OutgoingEmail::html(
            attendee,
            &subject,
            render_user_email(
                &meeting_confirmation_html(&summary, assistant_name),
                assistant_name,
            ),
        )];

        if let Some(admin) = admin_email {
            emails.push(OutgoingEmail::html(
                admin,
                format!("[MEETING CONFIRMED] {}", draft.topic),
                render_admin_email(
                    &[attendee.to_string()],
                    &subject,
                    &meeting_admin_html(&summary, attendee),
                ),
            ));
        }

        emails
    }

    /// Send confirmations, returning attendees whose mail failed
    async fn notify_attendees(&self, draft: &MeetingDraft, created: &CreatedEvent) -> Vec<String> {
        let settings = &self.context.mail;
        let mut failed = Vec::new();

        for attendee in &draft.attendees {
            let emails = Self::confirmation_emails(
                draft,
                created,
                attendee,
                settings.admin_email.as_deref(),
                &settings.assistant_name,
            );
            if let Err(e) = self.context.mailer.send_all(&emails).await {
                warn!(attendee = %attendee, error = %e, "Failed to send meeting confirmation");
                failed.push(attendee.clone());
            }
        }

        failed
    }
}

#[async_trait]
impl Tool for ScheduleMeetingTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "schedule_meeting".to_string(),
            description: "Confirm and schedule the most recent meeting draft to Google \
                          Calendar. Call ONLY after the user explicitly confirmed the draft."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "confirmation": {
                        "type": "string",
                        "description": "Ignored"
                    }
                }
            }),
        }
    }

    async fn initialize(&mut self, _config: Option<&Value>) -> Result<(), ToolError> {
        Ok(())
    }

    async fn execute(&self, _parameters: &Value) -> Result<Value, ToolError> {
        let draft = self
            .context
            .drafts
            .meeting()
            .await
            .ok_or_else(|| ToolError::ExecutionError("No meeting draft found.".to_string()))?;

        if !self.context.calendar.is_authorized().await {
            return Err(ToolError::ExecutionError(
                "Google Calendar not authorized.".to_string(),
            ));
        }

        let created = self
            .context
            .calendar
            .insert_event(&CalendarEvent::from_draft(&draft))
            .await
            .map_err(|e| match e {
                CalendarError::NotAuthorized(_) => {
                    ToolError::ExecutionError("Google Calendar not authorized.".to_string())
                }
                other => ToolError::ExecutionError(format!("Failed to schedule meeting: {other}")),
            })?;

        let failed = self.notify_attendees(&draft, &created).await;
        self.context.drafts.clear_meeting().await;

        info!(event_id = %created.id, topic = %draft.topic, "Meeting scheduled");

        let mut result = format!(
            "Meeting Scheduled!\n\nTopic: {}\nDate: {}\nTime: {}\nTimezone: {}\n\nEvent Link:\n{}",
            draft.topic,
            draft.date,
            draft.time_range(),
            draft.timezone,
            created.html_link
        );
        if !failed.is_empty() {
            result.push_str(&format!(
                "\n\nConfirmation email could not be sent to: {}",
                failed.join(", ")
            ));
        }

        Ok(Value::String(result))
    }
}
