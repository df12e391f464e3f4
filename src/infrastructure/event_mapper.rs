use crate::domain::models::CalendarEvent;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};

const STATUS_CANCELLED: &str = "cancelled";

/// Start or end of a Google Calendar event. Timed events carry `dateTime`; all-day events only
/// carry `date`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventDateTime {
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct GoogleCalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub start: CalendarEventDateTime,
    #[serde(default)]
    pub end: CalendarEventDateTime,
}

/// Maps a Google payload to a [`CalendarEvent`].
///
/// Returns `Ok(None)` for events that carry no tracked time: cancelled events and all-day events.
pub fn decode_calendar_event(event: &GoogleCalendarEvent) -> Result<Option<CalendarEvent>, InfraError> {
    let is_cancelled = event
        .status
        .as_deref()
        .map(|status| status.eq_ignore_ascii_case(STATUS_CANCELLED))
        .unwrap_or(false);
    if is_cancelled {
        return Ok(None);
    }

    let (Some(start_raw), Some(end_raw)) = (
        event.start.date_time.as_deref(),
        event.end.date_time.as_deref(),
    ) else {
        return Ok(None);
    };

    let start = parse_rfc3339_utc(start_raw, "start.dateTime")?;
    let end = parse_rfc3339_utc(end_raw, "end.dateTime")?;

    Ok(Some(CalendarEvent {
        id: event
            .id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned),
        title: event.summary.clone().unwrap_or_default(),
        start,
        end,
    }))
}

fn parse_rfc3339_utc(value: &str, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(value)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| {
            InfraError::InvalidEvent(format!("invalid {field_name} '{value}': {error}"))
        })
}
