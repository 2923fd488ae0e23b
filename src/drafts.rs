//! Pending email and meeting drafts
//!
//! The save tools and the send/schedule tools run as separate tool calls,
//! often in different chat turns. `DraftStore` is the process-wide slot pair
//! that carries the most recent draft of each kind between them. Saving
//! always overwrites; a draft is cleared once it has been delivered.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Email waiting for `send_email`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailDraft {
    pub to_emails: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Meeting waiting for `schedule_meeting`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingDraft {
    pub topic: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// IANA zone name sent to the calendar
    pub timezone: String,
    pub attendees: Vec<String>,
}

impl MeetingDraft {
    /// `YYYY-MM-DDTHH:MM:00`, the local start time sent to the calendar
    pub fn start_date_time(&self) -> String {
        format!("{}T{}:00", self.date, self.start_time.format("%H:%M"))
    }

    pub fn end_date_time(&self) -> String {
        format!("{}T{}:00", self.date, self.end_time.format("%H:%M"))
    }

    /// `HH:MM → HH:MM`
    pub fn time_range(&self) -> String {
        format!(
            "{} → {}",
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}

#[derive(Debug, Default)]
struct Slots {
    email: RwLock<Option<EmailDraft>>,
    meeting: RwLock<Option<MeetingDraft>>,
}

/// Shared handle to the two draft slots
#[derive(Debug, Clone, Default)]
pub struct DraftStore {
    slots: Arc<Slots>,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pending email draft
    pub async fn save_email(&self, draft: EmailDraft) {
        *self.slots.email.write().await = Some(draft);
    }

    pub async fn email(&self) -> Option<EmailDraft> {
        self.slots.email.read().await.clone()
    }

    /// Remove and return the pending email draft
    pub async fn take_email(&self) -> Option<EmailDraft> {
        self.slots.email.write().await.take()
    }

    pub async fn clear_email(&self) {
        self.slots.email.write().await.take();
    }

    /// Replace the pending meeting draft
    pub async fn save_meeting(&self, draft: MeetingDraft) {
        *self.slots.meeting.write().await = Some(draft);
    }

    pub async fn meeting(&self) -> Option<MeetingDraft> {
        self.slots.meeting.read().await.clone()
    }

    /// Remove and return the pending meeting draft
    pub async fn take_meeting(&self) -> Option<MeetingDraft> {
        self.slots.meeting.write().await.take()
    }

    pub async fn clear_meeting(&self) {
        self.slots.meeting.write().await.take();
    }
}
