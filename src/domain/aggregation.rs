use crate::domain::models::{AggregationResult, CalendarEvent, ProjectBucket, TimeInterval};
use indexmap::IndexMap;

/// Derives the project key for an event title: lowercase, then drop everything outside
/// `[A-Za-z0-9_.]`.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_' || *ch == '.')
        .collect()
}

/// Sums the hours of every event strictly inside `interval`, grouped by normalized title.
///
/// Buckets are ordered by hours descending. Buckets with equal hours stay in the order their first
/// event was seen.
pub fn aggregate<'a, I>(interval: &TimeInterval, events: I) -> AggregationResult
where
    I: IntoIterator<Item = &'a CalendarEvent>,
{
    let mut total_hours = 0.0;
    let mut buckets: IndexMap<String, ProjectBucket> = IndexMap::new();

    for event in events {
        if !interval.strictly_contains(event.start, event.end) {
            continue;
        }

        let hours = event.duration_hours();
        total_hours += hours;

        let key = normalize_title(&event.title);
        buckets
            .entry(key)
            .and_modify(|bucket| bucket.hours += hours)
            .or_insert_with_key(|key| ProjectBucket {
                key: key.clone(),
                label: event.title.clone(),
                hours,
            });
    }

    let mut projects: Vec<ProjectBucket> = buckets.into_values().collect();
    projects.sort_by(|a, b| b.hours.total_cmp(&a.hours));

    AggregationResult {
        total_hours,
        projects,
    }
}
