//! iCalendar export for session meetings.
//!
//! Renders a single-event `VCALENDAR` (RFC 5545) that mail clients accept
//! as a meeting request. Events last one hour. Text values are escaped and
//! long lines folded; lines end in CRLF.

use crate::errors::ClientError;
use crate::models::{parse_timestamp, Meeting, Session};
use chrono::{DateTime, Duration, Utc};

const PRODID: &str = "-//Live Classes//EN";
const UID_DOMAIN: &str = "live-classes";
const EVENT_HOURS: i64 = 1;
const MAX_LINE_OCTETS: usize = 75;

/// Invitation for a scheduled meeting.
///
/// Fails with `Validation` if the meeting's time cannot be parsed.
pub fn meeting_invite(
    session: &Session,
    meeting: &Meeting,
    now: DateTime<Utc>,
) -> Result<String, ClientError> {
    let start = parse_timestamp(&meeting.scheduled_for).ok_or_else(|| {
        ClientError::Validation(format!(
            "Meeting time '{}' is not a valid timestamp",
            meeting.scheduled_for
        ))
    })?;

    let mut description = format!("Join Zoom Meeting: {}\n", meeting.join_url);
    if let Some(text) = session.description.as_deref() {
        description.push('\n');
        description.push_str(text);
    }

    Ok(render(&Event {
        uid: format!("{}@{UID_DOMAIN}", meeting.id),
        stamp: now,
        start,
        summary: session.title.clone(),
        description: Some(description),
        location: Some(meeting.join_url.clone()),
    }))
}

/// Placeholder invitation for a session without a meeting, starting `now`.
pub fn placeholder_invite(session: &Session, now: DateTime<Utc>) -> String {
    render(&Event {
        uid: format!("{}@{UID_DOMAIN}", session.id),
        stamp: now,
        start: now,
        summary: format!("{} (not yet scheduled)", session.title),
        description: None,
        location: None,
    })
}

struct Event {
    uid: String,
    stamp: DateTime<Utc>,
    start: DateTime<Utc>,
    summary: String,
    description: Option<String>,
    location: Option<String>,
}

fn render(event: &Event) -> String {
    let end = event.start + Duration::hours(EVENT_HOURS);
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{PRODID}"),
        "METHOD:REQUEST".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}", event.uid),
        format!("DTSTAMP:{}", format_utc(event.stamp)),
        format!("DTSTART:{}", format_utc(event.start)),
        format!("DTEND:{}", format_utc(end)),
        format!("SUMMARY:{}", escape_text(&event.summary)),
    ];
    if let Some(description) = &event.description {
        lines.push(format!("DESCRIPTION:{}", escape_text(description)));
    }
    if let Some(location) = &event.location {
        lines.push(format!("LOCATION:{}", escape_text(location)));
    }
    lines.push("END:VEVENT".to_string());
    lines.push("END:VCALENDAR".to_string());

    let mut out = String::new();
    for line in &lines {
        out.push_str(&fold(line));
        out.push_str("\r\n");
    }
    out
}

fn format_utc(value: DateTime<Utc>) -> String {
    value.format("%Y%m%dT%H%M%SZ").to_string()
}

fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

/// Fold a content line at 75 octets without splitting a character.
fn fold(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut octets = 0;
    for c in line.chars() {
        if octets + c.len_utf8() > MAX_LINE_OCTETS {
            out.push_str("\r\n ");
            // The leading space counts toward the continuation line.
            octets = 1;
        }
        out.push(c);
        octets += c.len_utf8();
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::types::{MeetingId, SessionId};

    fn session(description: Option<&str>) -> Session {
        Session {
            id: SessionId::from("s-1"),
            title: "Algebra 101".to_string(),
            description: description.map(str::to_string),
            created_at: "2025-02-01T09:00:00".to_string(),
            participants: Vec::new(),
            meetings: Vec::new(),
        }
    }

    fn meeting() -> Meeting {
        Meeting {
            id: MeetingId::from("85746065432"),
            join_url: "https://zoom.us/j/85746065432".to_string(),
            scheduled_for: "2025-03-01T10:00:00Z".to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 20, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_meeting_invite_fields() {
        let ics = meeting_invite(&session(Some("Linear equations")), &meeting(), now()).unwrap();

        assert!(ics.starts_with("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n"));
        assert!(ics.contains("UID:85746065432@live-classes\r\n"));
        assert!(ics.contains("DTSTAMP:20250220T083000Z\r\n"));
        assert!(ics.contains("DTSTART:20250301T100000Z\r\n"));
        assert!(ics.contains("DTEND:20250301T110000Z\r\n"));
        assert!(ics.contains("SUMMARY:Algebra 101\r\n"));
        assert!(ics.contains(
            "DESCRIPTION:Join Zoom Meeting: https://zoom.us/j/85746065432\\n\\nLinear equations\r\n"
        ));
        assert!(ics.contains("LOCATION:https://zoom.us/j/85746065432\r\n"));
        assert!(ics.ends_with("END:VEVENT\r\nEND:VCALENDAR\r\n"));
    }

    #[test]
    fn test_meeting_invite_rejects_unparseable_time() {
        let mut bad = meeting();
        bad.scheduled_for = "soon".to_string();
        let result = meeting_invite(&session(None), &bad, now());
        assert!(matches!(result, Err(ClientError::Validation(_))));
    }

    #[test]
    fn test_placeholder_invite() {
        let ics = placeholder_invite(&session(None), now());

        assert!(ics.contains("UID:s-1@live-classes\r\n"));
        assert!(ics.contains("DTSTART:20250220T083000Z\r\n"));
        assert!(ics.contains("DTEND:20250220T093000Z\r\n"));
        assert!(ics.contains("SUMMARY:Algebra 101 (not yet scheduled)\r\n"));
        assert!(!ics.contains("LOCATION:"));
    }

    #[test]
    fn test_text_escaping() {
        assert_eq!(escape_text("a,b;c\\d\r\ne"), "a\\,b\\;c\\\\d\\ne");
    }

    #[test]
    fn test_long_lines_are_folded() {
        let line = format!("SUMMARY:{}", "x".repeat(200));
        let folded = fold(&line);

        for part in folded.split("\r\n") {
            assert!(part.len() <= MAX_LINE_OCTETS);
        }
        assert_eq!(folded.replace("\r\n ", ""), line);
    }

    #[test]
    fn test_folding_keeps_multibyte_characters_whole() {
        let line = format!("SUMMARY:{}", "é".repeat(60));
        let folded = fold(&line);
        assert_eq!(folded.replace("\r\n ", ""), line);
    }
}
