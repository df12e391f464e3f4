use crate::domain::aggregation::aggregate;
use crate::domain::models::{
    CalendarEvent, CalendarSummary, ProjectBucket, RangeError, RangeKind, SelectionSnapshot,
    TimeInterval, WeekStart,
};
use crate::domain::range::{Direction, NowProvider, RangeNavigator};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_source::{fetch_all, EventSource};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("unknown calendar '{0}'")]
    UnknownCalendar(String),
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Infra(#[from] InfraError),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputUpdate {
    pub total_hours: f64,
    pub projects: Vec<ProjectBucket>,
    pub interval: TimeInterval,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    CalendarsLoaded { calendars: Vec<CalendarSummary> },
    CalendarLoadingStarted { calendar_id: String },
    RangeChanged { interval: TimeInterval },
    OutputUpdated(OutputUpdate),
    CalendarSelectionChanged { calendar_id: String },
    SnapshotUpdated(SelectionSnapshot),
    ConnectError { context: String },
}

pub struct ControllerOptions {
    pub time_zone: Tz,
    pub default_week_start: WeekStart,
    pub snapshot: Option<SelectionSnapshot>,
    pub now_provider: NowProvider,
}

impl ControllerOptions {
    pub fn new(time_zone: Tz) -> Self {
        Self {
            time_zone,
            default_week_start: WeekStart::Monday,
            snapshot: None,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_default_week_start(mut self, week_start: WeekStart) -> Self {
        self.default_week_start = week_start;
        self
    }

    pub fn with_snapshot(mut self, snapshot: Option<SelectionSnapshot>) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }
}

struct CalendarEntry {
    summary: CalendarSummary,
    events: Option<Vec<CalendarEvent>>,
}

struct PendingFetch {
    generation: u64,
    calendar_id: String,
    handle: JoinHandle<()>,
}

struct FetchOutcome {
    generation: u64,
    calendar_id: String,
    result: Result<Vec<CalendarEvent>, InfraError>,
}

/// Ties the selected calendar and the selected range to the aggregated output.
///
/// The controller has a single owner. Event pagination runs on a spawned task and its result is
/// applied by [`SelectionController::drive`]; at most one fetch is in flight, and a fetch that was
/// superseded by a newer selection is aborted and its result dropped. Spawning requires a tokio
/// runtime.
pub struct SelectionController<S>
where
    S: EventSource + 'static,
{
    source: Arc<S>,
    navigator: RangeNavigator,
    calendars: IndexMap<String, CalendarEntry>,
    selected_calendar: Option<String>,
    restore_calendar_id: Option<String>,
    generation: u64,
    pending: Option<PendingFetch>,
    outcome_tx: mpsc::UnboundedSender<FetchOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<FetchOutcome>,
    notifications: mpsc::UnboundedSender<Notification>,
}

impl<S> SelectionController<S>
where
    S: EventSource + 'static,
{
    pub fn new(
        source: Arc<S>,
        options: ControllerOptions,
    ) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let snapshot = options.snapshot.unwrap_or_default();
        let week_start = snapshot.week_start.unwrap_or(options.default_week_start);
        let kind = snapshot.last_selected_range_index.unwrap_or(RangeKind::Month);

        let mut navigator =
            RangeNavigator::new(options.time_zone, kind, week_start, options.now_provider);
        if kind == RangeKind::Custom {
            match (snapshot.custom_start, snapshot.custom_end) {
                (Some(start), Some(end)) => {
                    navigator.select_custom(start, end);
                }
                _ => {
                    warn!("stored custom range has no bounds, falling back to month");
                    navigator.select_kind(RangeKind::Month);
                }
            }
        }

        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (notifications, notification_rx) = mpsc::unbounded_channel();

        let controller = Self {
            source,
            navigator,
            calendars: IndexMap::new(),
            selected_calendar: None,
            restore_calendar_id: snapshot.last_selected_calendar_cid,
            generation: 0,
            pending: None,
            outcome_tx,
            outcome_rx,
            notifications,
        };
        (controller, notification_rx)
    }

    pub fn interval(&self) -> &TimeInterval {
        self.navigator.interval()
    }

    pub fn selected_calendar(&self) -> Option<&str> {
        self.selected_calendar.as_deref()
    }

    pub fn loading_calendar(&self) -> Option<&str> {
        self.pending
            .as_ref()
            .map(|pending| pending.calendar_id.as_str())
    }

    pub fn is_loaded(&self, calendar_id: &str) -> bool {
        self.calendars
            .get(calendar_id)
            .is_some_and(|entry| entry.events.is_some())
    }

    pub fn calendars(&self) -> Vec<CalendarSummary> {
        self.calendars
            .values()
            .map(|entry| entry.summary.clone())
            .collect()
    }

    /// Fetches the calendar list and re-selects the calendar named by the startup snapshot.
    pub async fn load_calendars(&mut self) -> Result<(), ControllerError> {
        let calendars = match self.source.list_calendars().await {
            Ok(calendars) => calendars,
            Err(error) => {
                warn!(%error, "failed to load calendar list");
                self.notify(Notification::ConnectError {
                    context: format!("calendar list: {error}"),
                });
                return Err(error.into());
            }
        };

        let mut previous = std::mem::take(&mut self.calendars);
        for summary in calendars {
            let events = previous
                .shift_remove(&summary.id)
                .and_then(|entry| entry.events);
            self.calendars
                .insert(summary.id.clone(), CalendarEntry { summary, events });
        }
        if let Some(selected) = self.selected_calendar.as_deref() {
            if !self.calendars.contains_key(selected) {
                self.selected_calendar = None;
            }
        }

        info!(calendars = self.calendars.len(), "calendar list loaded");
        self.notify(Notification::CalendarsLoaded {
            calendars: self.calendars(),
        });

        if let Some(calendar_id) = self.restore_calendar_id.take() {
            if self.calendars.contains_key(&calendar_id) {
                self.select_calendar(&calendar_id)?;
            } else {
                warn!(%calendar_id, "last selected calendar is no longer listed");
            }
        }
        Ok(())
    }

    pub fn select_calendar(&mut self, calendar_id: &str) -> Result<(), ControllerError> {
        let Some(entry) = self.calendars.get(calendar_id) else {
            return Err(ControllerError::UnknownCalendar(calendar_id.to_string()));
        };

        if entry.events.is_some() {
            self.cancel_pending();
            self.selected_calendar = Some(calendar_id.to_string());
            self.update_output();
            return Ok(());
        }

        if self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.calendar_id == calendar_id)
        {
            debug!(calendar_id, "calendar fetch already in flight");
            return Ok(());
        }

        self.cancel_pending();
        self.notify(Notification::CalendarLoadingStarted {
            calendar_id: calendar_id.to_string(),
        });

        self.generation += 1;
        let generation = self.generation;
        let source = Arc::clone(&self.source);
        let outcome_tx = self.outcome_tx.clone();
        let task_calendar_id = calendar_id.to_string();
        let handle = tokio::spawn(async move {
            let result = fetch_all(source.as_ref(), &task_calendar_id).await;
            let _ = outcome_tx.send(FetchOutcome {
                generation,
                calendar_id: task_calendar_id,
                result,
            });
        });

        debug!(calendar_id, generation, "calendar fetch started");
        self.pending = Some(PendingFetch {
            generation,
            calendar_id: calendar_id.to_string(),
            handle,
        });
        Ok(())
    }

    /// Waits for the in-flight fetch and applies its result.
    ///
    /// Returns `false` immediately when no fetch is in flight.
    pub async fn drive(&mut self) -> bool {
        while self.pending.is_some() {
            let Some(outcome) = self.outcome_rx.recv().await else {
                return false;
            };
            if self.apply_fetch_outcome(outcome) {
                return true;
            }
        }
        false
    }

    pub async fn settle(&mut self) {
        while self.drive().await {}
    }

    pub fn select_range_kind(&mut self, kind: RangeKind) {
        let interval = self.navigator.select_kind(kind);
        self.range_changed(interval);
    }

    pub fn select_range_index(&mut self, index: u8) -> Result<(), ControllerError> {
        let interval = self.navigator.select_kind_index(index)?;
        self.range_changed(interval);
        Ok(())
    }

    pub fn select_custom_range(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        let interval = self.navigator.select_custom(start, end);
        self.range_changed(interval);
    }

    pub fn advance(&mut self, direction: Direction) {
        let interval = self.navigator.advance(direction);
        self.range_changed(interval);
    }

    pub fn set_week_start(&mut self, week_start: WeekStart) {
        if let Some(interval) = self.navigator.set_week_start(week_start) {
            self.range_changed(interval);
        }
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        let interval = self.navigator.interval();
        let is_custom = interval.kind == RangeKind::Custom;
        SelectionSnapshot {
            last_selected_range_index: Some(self.navigator.kind()),
            last_selected_calendar_cid: self.selected_calendar.clone(),
            week_start: Some(self.navigator.week_start()),
            custom_start: is_custom.then_some(interval.start),
            custom_end: is_custom.then_some(interval.end),
        }
    }

    fn apply_fetch_outcome(&mut self, outcome: FetchOutcome) -> bool {
        let is_current = self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.generation == outcome.generation);
        if !is_current {
            debug!(
                calendar_id = %outcome.calendar_id,
                generation = outcome.generation,
                "discarding superseded fetch result"
            );
            return false;
        }
        self.pending = None;

        match outcome.result {
            Ok(events) => {
                info!(
                    calendar_id = %outcome.calendar_id,
                    events = events.len(),
                    "calendar events loaded"
                );
                if let Some(entry) = self.calendars.get_mut(&outcome.calendar_id) {
                    entry.events = Some(events);
                }
                self.selected_calendar = Some(outcome.calendar_id);
                self.update_output();
            }
            Err(error) => {
                warn!(calendar_id = %outcome.calendar_id, %error, "calendar fetch failed");
                self.notify(Notification::ConnectError {
                    context: format!("calendar {}: {error}", outcome.calendar_id),
                });
            }
        }
        true
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(calendar_id = %pending.calendar_id, "superseding in-flight calendar fetch");
            pending.handle.abort();
        }
    }

    fn range_changed(&self, interval: TimeInterval) {
        debug!(kind = %interval.kind, start = %interval.start, end = %interval.end, "range changed");
        self.notify(Notification::RangeChanged { interval });
        self.update_output();
    }

    fn update_output(&self) {
        let Some(calendar_id) = self.selected_calendar.as_deref() else {
            return;
        };
        let Some(events) = self
            .calendars
            .get(calendar_id)
            .and_then(|entry| entry.events.as_ref())
        else {
            return;
        };

        let interval = self.navigator.interval().clone();
        let result = aggregate(&interval, events);
        info!(
            calendar_id,
            kind = %interval.kind,
            total_hours = result.total_hours,
            projects = result.projects.len(),
            "output updated"
        );

        self.notify(Notification::OutputUpdated(OutputUpdate {
            total_hours: result.total_hours,
            projects: result.projects,
            interval,
        }));
        self.notify(Notification::CalendarSelectionChanged {
            calendar_id: calendar_id.to_string(),
        });
        self.notify(Notification::SnapshotUpdated(self.snapshot()));
    }

    fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            debug!("notification receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::event_source::EventPage;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Debug)]
    enum FakePage {
        Page(EventPage),
        NetworkError,
    }

    #[derive(Debug, Default)]
    struct FakeEventSource {
        calendars: Vec<CalendarSummary>,
        fail_calendar_list: bool,
        pages: Mutex<HashMap<String, VecDeque<FakePage>>>,
        gates: Mutex<HashMap<String, Arc<Notify>>>,
        page_calls: AtomicUsize,
    }

    impl FakeEventSource {
        fn with_calendars(ids: &[&str]) -> Self {
            Self {
                calendars: ids
                    .iter()
                    .map(|id| CalendarSummary {
                        id: id.to_string(),
                        summary: format!("Calendar {id}"),
                    })
                    .collect(),
                ..Self::default()
            }
        }

        fn script(self, calendar_id: &str, pages: Vec<FakePage>) -> Self {
            self.pages
                .lock()
                .expect("page lock poisoned")
                .insert(calendar_id.to_string(), pages.into());
            self
        }

        fn gated(self, calendar_id: &str) -> Self {
            self.gates
                .lock()
                .expect("gate lock poisoned")
                .insert(calendar_id.to_string(), Arc::new(Notify::new()));
            self
        }
    }

    #[async_trait]
    impl EventSource for FakeEventSource {
        async fn list_calendars(&self) -> Result<Vec<CalendarSummary>, InfraError> {
            if self.fail_calendar_list {
                return Err(InfraError::Transport(
                    "network error while listing calendars".to_string(),
                ));
            }
            Ok(self.calendars.clone())
        }

        async fn fetch_page(
            &self,
            calendar_id: &str,
            _page_token: Option<&str>,
        ) -> Result<EventPage, InfraError> {
            self.page_calls.fetch_add(1, Ordering::SeqCst);

            let gate = self
                .gates
                .lock()
                .expect("gate lock poisoned")
                .get(calendar_id)
                .cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }

            let page = self
                .pages
                .lock()
                .expect("page lock poisoned")
                .get_mut(calendar_id)
                .and_then(VecDeque::pop_front)
                .unwrap_or(FakePage::Page(EventPage::default()));
            match page {
                FakePage::Page(page) => Ok(page),
                FakePage::NetworkError => Err(InfraError::Transport(
                    "network error while listing calendar events".to_string(),
                )),
            }
        }
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn event(id: &str, title: &str, start: &str, end: &str) -> CalendarEvent {
        CalendarEvent {
            id: Some(id.to_string()),
            title: title.to_string(),
            start: fixed_time(start),
            end: fixed_time(end),
        }
    }

    fn page(events: Vec<CalendarEvent>, next: Option<&str>) -> FakePage {
        FakePage::Page(EventPage {
            events,
            next_page_token: next.map(ToOwned::to_owned),
        })
    }

    fn project_pages() -> Vec<FakePage> {
        vec![
            page(
                vec![event(
                    "e1",
                    "Proj X",
                    "2026-02-16T10:00:00Z",
                    "2026-02-16T12:00:00Z",
                )],
                Some("page-2"),
            ),
            page(
                vec![event(
                    "e2",
                    "proj x!",
                    "2026-02-17T14:00:00Z",
                    "2026-02-17T15:00:00Z",
                )],
                None,
            ),
        ]
    }

    // 2026-02-18 is a Wednesday.
    fn options(snapshot: Option<SelectionSnapshot>) -> ControllerOptions {
        ControllerOptions::new(Tz::UTC)
            .with_snapshot(snapshot)
            .with_now_provider(Arc::new(|| fixed_time("2026-02-18T15:30:00Z")))
    }

    fn week_snapshot() -> Option<SelectionSnapshot> {
        Some(SelectionSnapshot {
            last_selected_range_index: Some(RangeKind::Week),
            ..SelectionSnapshot::default()
        })
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
        let mut notifications = Vec::new();
        while let Ok(notification) = rx.try_recv() {
            notifications.push(notification);
        }
        notifications
    }

    fn outputs(notifications: &[Notification]) -> Vec<&OutputUpdate> {
        notifications
            .iter()
            .filter_map(|notification| match notification {
                Notification::OutputUpdated(output) => Some(output),
                _ => None,
            })
            .collect()
    }

    fn loading_started(notifications: &[Notification]) -> Vec<&str> {
        notifications
            .iter()
            .filter_map(|notification| match notification {
                Notification::CalendarLoadingStarted { calendar_id } => Some(calendar_id.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn uncached_calendar_is_aggregated_after_all_pages_arrive() {
        let source = Arc::new(FakeEventSource::with_calendars(&["work"]).script("work", project_pages()));
        let (mut controller, mut rx) =
            SelectionController::new(Arc::clone(&source), options(week_snapshot()));

        controller.load_calendars().await.expect("load calendars");
        controller.select_calendar("work").expect("select calendar");

        let before = drain(&mut rx);
        assert_eq!(loading_started(&before), vec!["work"]);
        assert!(outputs(&before).is_empty());
        assert_eq!(controller.loading_calendar(), Some("work"));

        controller.settle().await;
        let after = drain(&mut rx);

        assert_eq!(source.page_calls.load(Ordering::SeqCst), 2);
        let updates = outputs(&after);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].total_hours, 3.0);
        assert_eq!(updates[0].projects.len(), 1);
        assert_eq!(updates[0].projects[0].label, "Proj X");
        assert_eq!(updates[0].interval.start, fixed_time("2026-02-16T00:00:00Z"));
        assert_eq!(updates[0].interval.end, fixed_time("2026-02-23T00:00:00Z"));
        assert!(after.contains(&Notification::CalendarSelectionChanged {
            calendar_id: "work".to_string()
        }));
        assert!(matches!(
            after.last(),
            Some(Notification::SnapshotUpdated(snapshot))
                if snapshot.last_selected_calendar_cid.as_deref() == Some("work")
                    && snapshot.last_selected_range_index == Some(RangeKind::Week)
                    && snapshot.custom_start.is_none()
        ));
        assert_eq!(controller.selected_calendar(), Some("work"));
        assert!(controller.loading_calendar().is_none());
    }

    #[tokio::test]
    async fn range_changes_reaggregate_cached_events_without_fetching() {
        let source = Arc::new(FakeEventSource::with_calendars(&["work"]).script("work", project_pages()));
        let (mut controller, mut rx) =
            SelectionController::new(Arc::clone(&source), options(week_snapshot()));
        controller.load_calendars().await.expect("load calendars");
        controller.select_calendar("work").expect("select calendar");
        controller.settle().await;
        drain(&mut rx);

        controller.select_range_kind(RangeKind::Day);
        let today = drain(&mut rx);
        assert!(matches!(today.first(), Some(Notification::RangeChanged { .. })));
        assert_eq!(outputs(&today)[0].total_hours, 0.0);
        assert!(outputs(&today)[0].projects.is_empty());

        controller.advance(Direction::Back);
        controller.advance(Direction::Back);
        let monday = drain(&mut rx);
        let last = outputs(&monday).pop().expect("output after navigation");
        assert_eq!(last.interval.start, fixed_time("2026-02-16T00:00:00Z"));
        assert_eq!(last.total_hours, 2.0);

        assert_eq!(source.page_calls.load(Ordering::SeqCst), 2);
        assert!(!controller.drive().await);
    }

    #[tokio::test]
    async fn reselecting_a_cached_calendar_emits_without_loading() {
        let source = Arc::new(FakeEventSource::with_calendars(&["work"]).script("work", project_pages()));
        let (mut controller, mut rx) = SelectionController::new(source, options(week_snapshot()));
        controller.load_calendars().await.expect("load calendars");
        controller.select_calendar("work").expect("select calendar");
        controller.settle().await;
        drain(&mut rx);

        controller.select_calendar("work").expect("reselect calendar");
        let notifications = drain(&mut rx);

        assert!(loading_started(&notifications).is_empty());
        assert_eq!(outputs(&notifications).len(), 1);
    }

    #[tokio::test]
    async fn superseded_fetch_never_reaches_the_output() {
        let source = Arc::new(
            FakeEventSource::with_calendars(&["slow", "fast"])
                .script("slow", project_pages())
                .script(
                    "fast",
                    vec![page(
                        vec![event(
                            "f1",
                            "Admin",
                            "2026-02-18T08:00:00Z",
                            "2026-02-18T09:30:00Z",
                        )],
                        None,
                    )],
                )
                .gated("slow"),
        );
        let (mut controller, mut rx) = SelectionController::new(source, options(week_snapshot()));
        controller.load_calendars().await.expect("load calendars");

        controller.select_calendar("slow").expect("select slow");
        controller.select_calendar("fast").expect("select fast");
        controller.settle().await;

        let notifications = drain(&mut rx);
        assert_eq!(loading_started(&notifications), vec!["slow", "fast"]);
        let updates = outputs(&notifications);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].projects[0].label, "Admin");
        assert_eq!(updates[0].total_hours, 1.5);
        assert_eq!(controller.selected_calendar(), Some("fast"));
        assert!(!controller.is_loaded("slow"));
    }

    #[tokio::test]
    async fn reselecting_the_loading_calendar_keeps_a_single_fetch() {
        let source = Arc::new(FakeEventSource::with_calendars(&["work"]).script("work", project_pages()));
        let (mut controller, mut rx) =
            SelectionController::new(Arc::clone(&source), options(week_snapshot()));
        controller.load_calendars().await.expect("load calendars");

        controller.select_calendar("work").expect("select calendar");
        controller.select_calendar("work").expect("select calendar again");
        controller.settle().await;

        let notifications = drain(&mut rx);
        assert_eq!(loading_started(&notifications), vec!["work"]);
        assert_eq!(outputs(&notifications).len(), 1);
        assert_eq!(source.page_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transport_error_keeps_previous_output() {
        let source = Arc::new(
            FakeEventSource::with_calendars(&["good", "broken"])
                .script("good", project_pages())
                .script("broken", vec![FakePage::NetworkError]),
        );
        let (mut controller, mut rx) = SelectionController::new(source, options(week_snapshot()));
        controller.load_calendars().await.expect("load calendars");
        controller.select_calendar("good").expect("select good");
        controller.settle().await;
        drain(&mut rx);

        controller.select_calendar("broken").expect("select broken");
        controller.settle().await;
        let notifications = drain(&mut rx);

        assert!(outputs(&notifications).is_empty());
        assert!(notifications.iter().any(|notification| matches!(
            notification,
            Notification::ConnectError { context } if context.contains("broken")
        )));
        assert_eq!(controller.selected_calendar(), Some("good"));
        assert!(!controller.is_loaded("broken"));

        controller.advance(Direction::Forward);
        let notifications = drain(&mut rx);
        assert!(notifications.contains(&Notification::CalendarSelectionChanged {
            calendar_id: "good".to_string()
        }));
    }

    #[tokio::test]
    async fn load_calendars_restores_calendar_and_custom_range() {
        let snapshot = SelectionSnapshot {
            last_selected_range_index: Some(RangeKind::Custom),
            last_selected_calendar_cid: Some("work".to_string()),
            week_start: Some(WeekStart::Sunday),
            custom_start: Some(fixed_time("2026-02-16T09:00:00Z")),
            custom_end: Some(fixed_time("2026-02-17T00:00:00Z")),
        };
        let source = Arc::new(FakeEventSource::with_calendars(&["home", "work"]).script("work", project_pages()));
        let (mut controller, mut rx) = SelectionController::new(source, options(Some(snapshot.clone())));

        controller.load_calendars().await.expect("load calendars");
        controller.settle().await;
        let notifications = drain(&mut rx);

        assert!(matches!(
            notifications.first(),
            Some(Notification::CalendarsLoaded { calendars }) if calendars.len() == 2
        ));
        assert_eq!(loading_started(&notifications), vec!["work"]);
        let updates = outputs(&notifications);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].total_hours, 2.0);
        assert_eq!(updates[0].interval.kind, RangeKind::Custom);
        assert_eq!(controller.snapshot(), snapshot);
    }

    #[tokio::test]
    async fn custom_snapshot_without_bounds_falls_back_to_month() {
        let snapshot = SelectionSnapshot {
            last_selected_range_index: Some(RangeKind::Custom),
            ..SelectionSnapshot::default()
        };
        let source = Arc::new(FakeEventSource::with_calendars(&["work"]));
        let (controller, _rx) = SelectionController::new(source, options(Some(snapshot)));

        assert_eq!(controller.interval().kind, RangeKind::Month);
        assert_eq!(controller.interval().start, fixed_time("2026-02-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn unchanged_week_start_emits_nothing() {
        let source = Arc::new(FakeEventSource::with_calendars(&["work"]));
        let (mut controller, mut rx) = SelectionController::new(source, options(week_snapshot()));

        controller.set_week_start(WeekStart::Monday);
        assert!(drain(&mut rx).is_empty());

        controller.set_week_start(WeekStart::Sunday);
        let notifications = drain(&mut rx);
        assert!(matches!(
            notifications.as_slice(),
            [Notification::RangeChanged { interval }]
                if interval.start == fixed_time("2026-02-15T00:00:00Z")
        ));
    }

    #[tokio::test]
    async fn unknown_calendar_is_rejected_silently() {
        let source = Arc::new(FakeEventSource::with_calendars(&["work"]));
        let (mut controller, mut rx) = SelectionController::new(source, options(None));
        controller.load_calendars().await.expect("load calendars");
        drain(&mut rx);

        let result = controller.select_calendar("missing");

        assert!(matches!(result, Err(ControllerError::UnknownCalendar(id)) if id == "missing"));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn calendar_list_failure_is_reported() {
        let source = Arc::new(FakeEventSource {
            fail_calendar_list: true,
            ..FakeEventSource::default()
        });
        let (mut controller, mut rx) = SelectionController::new(source, options(None));

        let result = controller.load_calendars().await;

        assert!(matches!(result, Err(ControllerError::Infra(InfraError::Transport(_)))));
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [Notification::ConnectError { .. }]
        ));
    }

    #[tokio::test]
    async fn out_of_range_index_is_rejected() {
        let source = Arc::new(FakeEventSource::with_calendars(&["work"]));
        let (mut controller, mut rx) = SelectionController::new(source, options(None));

        let result = controller.select_range_index(6);

        assert!(matches!(
            result,
            Err(ControllerError::Range(RangeError::InvalidKindIndex(6)))
        ));
        assert!(drain(&mut rx).is_empty());
        assert_eq!(controller.interval().kind, RangeKind::Month);
    }
}
