use crate::domain::models::{CalendarEvent, CalendarSummary};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{decode_calendar_event, GoogleCalendarEvent};
use crate::infrastructure::event_source::{EventPage, EventSource};
use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;
use url::Url;

pub const DEFAULT_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3/";
pub const DEFAULT_PAGE_SIZE: u32 = 250;

#[derive(Debug, Clone)]
pub struct GoogleCalendarEventSource {
    client: Client,
    access_token: String,
    api_base: Url,
    page_size: u32,
}

impl GoogleCalendarEventSource {
    pub fn new(access_token: impl Into<String>) -> Result<Self, InfraError> {
        Self::with_api_base(access_token, DEFAULT_CALENDAR_API_BASE)
    }

    pub fn with_api_base(access_token: impl Into<String>, api_base: &str) -> Result<Self, InfraError> {
        let access_token = access_token.into();
        ensure_non_empty(&access_token, "access token")?;
        let api_base = Url::parse(api_base)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid calendar api base url: {error}")))?;
        Ok(Self {
            client: Client::new(),
            access_token,
            api_base,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn calendar_list_endpoint(&self) -> Result<Url, InfraError> {
        let mut url = self.api_base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("calendar api base URL cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("users");
            segments.push("me");
            segments.push("calendarList");
        }
        Ok(url)
    }

    fn events_endpoint(&self, calendar_id: &str) -> Result<Url, InfraError> {
        let mut url = self.api_base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("calendar api base URL cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("calendars");
            segments.push(calendar_id);
            segments.push("events");
        }
        Ok(url)
    }

    async fn get_body(&self, request: reqwest::RequestBuilder, context: &str) -> Result<String, InfraError> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|error| InfraError::Transport(format!("network error while {context}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Transport(format!("failed reading response while {context}: {error}")))?;

        if !status.is_success() {
            return Err(http_error(status, &body));
        }
        Ok(body)
    }
}

fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
    if value.trim().is_empty() {
        return Err(InfraError::InvalidConfig(format!("{field} must not be empty")));
    }
    Ok(())
}

fn http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
    let message = if body.trim().is_empty() {
        format!("google calendar api error: http {}", status.as_u16())
    } else {
        format!("google calendar api error: http {}; body={body}", status.as_u16())
    };
    InfraError::Transport(message)
}

#[derive(Debug, serde::Deserialize)]
struct CalendarListResponse {
    items: Option<Vec<CalendarListItem>>,
}

#[derive(Debug, serde::Deserialize)]
struct CalendarListItem {
    id: String,
    summary: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct EventsPageResponse {
    items: Option<Vec<GoogleCalendarEvent>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

fn parse_calendar_list(body: &str) -> Result<Vec<CalendarSummary>, InfraError> {
    let parsed: CalendarListResponse = serde_json::from_str(body).map_err(|error| {
        InfraError::Transport(format!("invalid calendar list payload: {error}"))
    })?;

    Ok(parsed
        .items
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| {
            let id = item.id.trim();
            if id.is_empty() {
                return None;
            }
            let summary = item
                .summary
                .unwrap_or_else(|| id.to_string())
                .trim()
                .to_string();
            Some(CalendarSummary {
                id: id.to_string(),
                summary,
            })
        })
        .collect())
}

fn parse_events_page(body: &str) -> Result<EventPage, InfraError> {
    let parsed: EventsPageResponse = serde_json::from_str(body).map_err(|error| {
        InfraError::Transport(format!("invalid events list payload: {error}"))
    })?;

    let events: Vec<CalendarEvent> = parsed
        .items
        .unwrap_or_default()
        .iter()
        .filter_map(|item| match decode_calendar_event(item) {
            Ok(event) => event,
            Err(error) => {
                warn!(event_id = ?item.id, %error, "skipping undecodable calendar event");
                None
            }
        })
        .collect();

    Ok(EventPage {
        events,
        next_page_token: parsed
            .next_page_token
            .filter(|token| !token.trim().is_empty()),
    })
}

#[async_trait]
impl EventSource for GoogleCalendarEventSource {
    async fn list_calendars(&self) -> Result<Vec<CalendarSummary>, InfraError> {
        let endpoint = self.calendar_list_endpoint()?;
        let request = self.client.get(endpoint).query(&[("maxResults", 250)]);
        let body = self.get_body(request, "listing calendars").await?;
        parse_calendar_list(&body)
    }

    async fn fetch_page(
        &self,
        calendar_id: &str,
        page_token: Option<&str>,
    ) -> Result<EventPage, InfraError> {
        ensure_non_empty(calendar_id, "calendar id")?;

        let endpoint = self.events_endpoint(calendar_id)?;
        let mut request = self.client.get(endpoint).query(&[
            ("singleEvents", "true".to_string()),
            ("maxResults", self.page_size.to_string()),
        ]);
        if let Some(page_token) = page_token {
            request = request.query(&[("pageToken", page_token)]);
        }

        let body = self.get_body(request, "listing calendar events").await?;
        parse_events_page(&body)
    }
}
