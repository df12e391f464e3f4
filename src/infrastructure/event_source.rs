use crate::domain::models::{CalendarEvent, CalendarSummary};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPage {
    pub events: Vec<CalendarEvent>,
    pub next_page_token: Option<String>,
}

/// Calendar data source consumed by the selection controller.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn list_calendars(&self) -> Result<Vec<CalendarSummary>, InfraError>;

    async fn fetch_page(
        &self,
        calendar_id: &str,
        page_token: Option<&str>,
    ) -> Result<EventPage, InfraError>;
}

/// Drains every page of a calendar.
///
/// Pages are requested one after another because each request needs the token returned by the
/// previous page. Events repeated across pages are kept once, first occurrence wins; events
/// without an id are never deduplicated.
pub async fn fetch_all<S>(source: &S, calendar_id: &str) -> Result<Vec<CalendarEvent>, InfraError>
where
    S: EventSource + ?Sized,
{
    let mut events = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = source.fetch_page(calendar_id, page_token.as_deref()).await?;
        pages += 1;
        debug!(
            calendar_id,
            page = pages,
            page_events = page.events.len(),
            has_next = page.next_page_token.is_some(),
            "fetched event page"
        );

        for event in page.events {
            let is_new = match event.id.as_deref() {
                Some(id) => seen_ids.insert(id.to_string()),
                None => true,
            };
            if is_new {
                events.push(event);
            }
        }

        match page.next_page_token {
            Some(next) => page_token = Some(next),
            None => break,
        }
    }

    debug!(calendar_id, pages, events = events.len(), "event pagination exhausted");
    Ok(events)
}
