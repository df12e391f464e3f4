use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("range kind index {0} is out of range 0..=5")]
    InvalidKindIndex(u8),
    #[error("unknown range kind '{0}'")]
    UnknownKind(String),
    #[error("unknown week start '{0}', expected sunday or monday")]
    InvalidWeekStart(String),
}

/// Range descriptor selected by the user.
///
/// The ordinal is the externally persisted index, so the variant order must not change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub enum RangeKind {
    Day,
    Week,
    Month,
    Year,
    Total,
    Custom,
}

impl RangeKind {
    pub const ALL: [RangeKind; 6] = [
        RangeKind::Day,
        RangeKind::Week,
        RangeKind::Month,
        RangeKind::Year,
        RangeKind::Total,
        RangeKind::Custom,
    ];

    pub fn index(self) -> u8 {
        match self {
            Self::Day => 0,
            Self::Week => 1,
            Self::Month => 2,
            Self::Year => 3,
            Self::Total => 4,
            Self::Custom => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
            Self::Total => "total",
            Self::Custom => "custom",
        }
    }
}

impl TryFrom<u8> for RangeKind {
    type Error = RangeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(usize::from(value))
            .copied()
            .ok_or(RangeError::InvalidKindIndex(value))
    }
}

impl From<RangeKind> for u8 {
    fn from(value: RangeKind) -> Self {
        value.index()
    }
}

impl FromStr for RangeKind {
    type Err = RangeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| RangeError::UnknownKind(value.to_string()))
    }
}

impl fmt::Display for RangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    Sunday,
    #[default]
    Monday,
}

impl WeekStart {
    pub fn weekday(self) -> Weekday {
        match self {
            Self::Sunday => Weekday::Sun,
            Self::Monday => Weekday::Mon,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sunday => "sunday",
            Self::Monday => "monday",
        }
    }
}

impl FromStr for WeekStart {
    type Err = RangeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sunday" => Ok(Self::Sunday),
            "monday" => Ok(Self::Monday),
            _ => Err(RangeError::InvalidWeekStart(value.to_string())),
        }
    }
}

impl fmt::Display for WeekStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete interval produced for a range selection.
///
/// Containment is strict on both ends: an event starting exactly at `start` or ending exactly at
/// `end` is outside the interval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub kind: RangeKind,
    pub week_start: WeekStart,
}

impl TimeInterval {
    pub fn strictly_contains(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < start && end < self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarSummary {
    pub id: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: Option<String>,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CalendarEvent {
    /// Duration in fractional hours at millisecond resolution.
    pub fn duration_hours(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 3_600_000.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectBucket {
    pub key: String,
    pub label: String,
    pub hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    pub total_hours: f64,
    pub projects: Vec<ProjectBucket>,
}

/// Selection state handed back to the host after each output update so it can be restored on the
/// next start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSnapshot {
    #[serde(default)]
    pub last_selected_range_index: Option<RangeKind>,
    #[serde(default)]
    pub last_selected_calendar_cid: Option<String>,
    #[serde(default)]
    pub week_start: Option<WeekStart>,
    #[serde(default)]
    pub custom_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub custom_end: Option<DateTime<Utc>>,
}
