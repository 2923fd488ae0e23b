//! HTML bodies for outgoing mail
//!
//! Placeholders are plain `{name}` markers replaced verbatim, so every value
//! coming from a user must go through [`escape_html`] first.

/// Wrapper around a message sent on the owner's behalf. Placeholder: `{message}`.
pub const USER_EMAIL_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, Helvetica, sans-serif; color: #222;">
  <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
    <p>{message}</p>
    <hr style="border: none; border-top: 1px solid #ddd;">
    <p style="font-size: 12px; color: #777;">Sent by {assistant}</p>
  </div>
</body>
</html>"#;

/// Copy sent to the admin. Placeholders: `{to_email}`, `{subject}`, `{message}`.
pub const ADMIN_EMAIL_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, Helvetica, sans-serif; color: #222;">
  <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="margin-top: 0;">Outgoing email log</h2>
    <p><b>To:</b> {to_email}<br>
       <b>Subject:</b> {subject}</p>
    <div style="padding: 12px; background: #f5f5f5; border-radius: 6px;">{message}</div>
  </div>
</body>
</html>"#;

/// Escape text for inclusion in an HTML body
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Plain text with line breaks preserved as `<br>`
fn text_to_html(text: &str) -> String {
    escape_html(text).replace('\n', "<br>\n")
}

/// Message body the recipient sees; `message_html` must already be safe
pub fn render_user_email(message_html: &str, assistant_name: &str) -> String {
    USER_EMAIL_TEMPLATE
        .replace("{assistant}", &escape_html(assistant_name))
        .replace("{message}", message_html)
}

pub fn render_admin_email(to_emails: &[String], subject: &str, message_html: &str) -> String {
    ADMIN_EMAIL_TEMPLATE
        .replace("{to_email}", &escape_html(&to_emails.join(", ")))
        .replace("{subject}", &escape_html(subject))
        .replace("{message}", message_html)
}

/// User email wrapping a plain-text body
pub fn render_user_text(body: &str, assistant_name: &str) -> String {
    render_user_email(&text_to_html(body), assistant_name)
}

pub fn render_admin_text(to_emails: &[String], subject: &str, body: &str) -> String {
    render_admin_email(to_emails, subject, &text_to_html(body))
}

/// Details of a scheduled meeting, as shown in confirmation mail
#[derive(Debug, Clone)]
pub struct MeetingSummary<'a> {
    pub topic: &'a str,
    pub date: &'a str,
    pub time_range: &'a str,
    pub timezone: &'a str,
    pub link: &'a str,
}

/// Fragment for the attendee's confirmation
pub fn meeting_confirmation_html(meeting: &MeetingSummary<'_>, assistant_name: &str) -> String {
    let link = escape_html(meeting.link);
    format!(
        "Your meeting has been confirmed.<br><br>\n\
         <b>Topic:</b> {}<br>\n\
         <b>Date:</b> {}<br>\n\
         <b>Time:</b> {} ({})<br>\n\
         <b>Link:</b> <a href=\"{link}\">{link}</a><br><br>\n\
         Regards,<br>\n{}",
        escape_html(meeting.topic),
        escape_html(meeting.date),
        escape_html(meeting.time_range),
        escape_html(meeting.timezone),
        escape_html(assistant_name),
    )
}

/// Fragment for the admin's per-attendee notification
pub fn meeting_admin_html(meeting: &MeetingSummary<'_>, attendee: &str) -> String {
    let link = escape_html(meeting.link);
    format!(
        "A meeting has been scheduled.<br><br>\n\
         <b>Topic:</b> {}<br>\n\
         <b>Date:</b> {}<br>\n\
         <b>Time:</b> {} ({})<br>\n\
         <b>Attendee:</b> {}<br>\n\
         <b>Join Link:</b> <a href=\"{link}\">{link}</a>",
        escape_html(meeting.topic),
        escape_html(meeting.date),
        escape_html(meeting.time_range),
        escape_html(meeting.timezone),
        escape_html(attendee),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> MeetingSummary<'static> {
        MeetingSummary {
            topic: "Q&A <prep>",
            date: "2025-12-28",
            time_range: "16:00 → 17:00",
            timezone: "Asia/Kolkata",
            link: "https://calendar.google.com/event?eid=abc",
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>alert("x") & 'y'</script>"#),
            "&lt;script&gt;alert(&quot;x&quot;) &amp; &#39;y&#39;&lt;/script&gt;"
        );
        assert_eq!(escape_html("plain text"), "plain text");
    }

    #[test]
    fn test_user_text_is_escaped_and_keeps_line_breaks() {
        let html = render_user_text("Hi <b>there</b>\nBye", "Friday");
        assert!(html.contains("Hi &lt;b&gt;there&lt;/b&gt;<br>\nBye"));
        assert!(html.contains("Sent by Friday"));
        assert!(!html.contains("{message}"));
    }

    #[test]
    fn test_admin_template_fills_every_placeholder() {
        let to = vec!["a@example.com".to_string(), "b@example.com".to_string()];
        let html = render_admin_text(&to, "New Message", "Hello!");

        assert!(html.contains("a@example.com, b@example.com"));
        assert!(html.contains("New Message"));
        assert!(html.contains("Hello!"));
        assert!(!html.contains("{to_email}"));
        assert!(!html.contains("{subject}"));
    }

    #[test]
    fn test_meeting_fragments() {
        let meeting = summary();

        let confirmation = meeting_confirmation_html(&meeting, "Friday AI Assistant");
        assert!(confirmation.contains("Q&amp;A &lt;prep&gt;"));
        assert!(confirmation.contains("16:00 → 17:00 (Asia/Kolkata)"));
        assert!(confirmation.contains("href=\"https://calendar.google.com/event?eid=abc\""));

        let admin = meeting_admin_html(&meeting, "guest@example.com");
        assert!(admin.contains("<b>Attendee:</b> guest@example.com"));
    }
}
