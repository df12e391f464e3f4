use crate::domain::models::{RangeError, RangeKind, TimeInterval, WeekStart};
use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const TOTAL_RANGE_END_YEAR: i32 = 2040;
const TOTAL_RANGE_END_MONTH: u32 = 12;
const TOTAL_RANGE_END_DAY: u32 = 31;

/// Resolves a range kind against its anchors into a concrete interval.
///
/// Calendar arithmetic happens on local dates of the anchor's time zone; the returned bounds are
/// the corresponding instants. `anchor_end` is only read for [`RangeKind::Custom`].
pub fn resolve(
    kind: RangeKind,
    anchor_start: &DateTime<Tz>,
    anchor_end: &DateTime<Tz>,
    week_start: WeekStart,
) -> TimeInterval {
    let tz = anchor_start.timezone();
    let anchor_date = anchor_start.date_naive();

    let (start, end) = match kind {
        RangeKind::Day => (
            local_midnight(&tz, anchor_date),
            local_midnight(&tz, add_days(anchor_date, 1)),
        ),
        RangeKind::Week => {
            let first = week_start_on_or_before(anchor_date, week_start);
            (
                local_midnight(&tz, first),
                local_midnight(&tz, add_days(first, 7)),
            )
        }
        RangeKind::Month => {
            let first = anchor_date.with_day(1).unwrap_or(anchor_date);
            (
                local_midnight(&tz, first),
                local_midnight(&tz, add_months(first, 1)),
            )
        }
        RangeKind::Year => {
            let first = NaiveDate::from_ymd_opt(anchor_date.year(), 1, 1).unwrap_or(anchor_date);
            (
                local_midnight(&tz, first),
                local_midnight(&tz, add_months(first, 12)),
            )
        }
        RangeKind::Total => {
            let last = NaiveDate::from_ymd_opt(
                TOTAL_RANGE_END_YEAR,
                TOTAL_RANGE_END_MONTH,
                TOTAL_RANGE_END_DAY,
            )
            .unwrap_or(NaiveDate::MAX);
            // The default UTC instant is the Unix epoch.
            (
                DateTime::<Utc>::default().with_timezone(&tz),
                local_midnight(&tz, last),
            )
        }
        RangeKind::Custom => (*anchor_start, *anchor_end),
    };

    TimeInterval {
        start: start.with_timezone(&Utc),
        end: end.with_timezone(&Utc),
        kind,
        week_start,
    }
}

pub fn start_of_day(instant: &DateTime<Tz>) -> DateTime<Tz> {
    local_midnight(&instant.timezone(), instant.date_naive())
}

fn week_start_on_or_before(date: NaiveDate, week_start: WeekStart) -> NaiveDate {
    let back = (7 + date.weekday().num_days_from_monday()
        - week_start.weekday().num_days_from_monday())
        % 7;
    add_days(date, -i64::from(back))
}

fn local_midnight(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    localize(tz, date.and_time(NaiveTime::MIN))
}

// A local time skipped by a DST jump resolves to the first valid instant after it.
fn localize(tz: &Tz, local: NaiveDateTime) -> DateTime<Tz> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
        .unwrap_or_else(|| tz.from_utc_datetime(&local))
}

fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    let magnitude = Days::new(days.unsigned_abs());
    if days >= 0 {
        date.checked_add_days(magnitude).unwrap_or(NaiveDate::MAX)
    } else {
        date.checked_sub_days(magnitude).unwrap_or(NaiveDate::MIN)
    }
}

fn add_months(date: NaiveDate, months: i64) -> NaiveDate {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).unwrap_or(u32::MAX));
    if months >= 0 {
        date.checked_add_months(magnitude).unwrap_or(NaiveDate::MAX)
    } else {
        date.checked_sub_months(magnitude).unwrap_or(NaiveDate::MIN)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Back,
    Today,
    Forward,
}

impl Direction {
    pub fn from_step(step: i64) -> Self {
        match step {
            step if step < 0 => Self::Back,
            0 => Self::Today,
            _ => Self::Forward,
        }
    }

    fn signum(self) -> i64 {
        match self {
            Self::Back => -1,
            Self::Today => 0,
            Self::Forward => 1,
        }
    }
}

/// Holds the selected range kind and its anchors.
///
/// Every mutating operation returns the freshly resolved interval; `set_week_start` returns
/// `None` when nothing changed.
pub struct RangeNavigator {
    time_zone: Tz,
    anchor_start: DateTime<Tz>,
    anchor_end: DateTime<Tz>,
    kind: RangeKind,
    week_start: WeekStart,
    interval: TimeInterval,
    now_provider: NowProvider,
}

impl RangeNavigator {
    pub fn new(
        time_zone: Tz,
        kind: RangeKind,
        week_start: WeekStart,
        now_provider: NowProvider,
    ) -> Self {
        let today = start_of_day(&(now_provider)().with_timezone(&time_zone));
        let interval = resolve(kind, &today, &today, week_start);
        Self {
            time_zone,
            anchor_start: today,
            anchor_end: today,
            kind,
            week_start,
            interval,
            now_provider,
        }
    }

    pub fn interval(&self) -> &TimeInterval {
        &self.interval
    }

    pub fn kind(&self) -> RangeKind {
        self.kind
    }

    pub fn week_start(&self) -> WeekStart {
        self.week_start
    }

    pub fn anchors(&self) -> (&DateTime<Tz>, &DateTime<Tz>) {
        (&self.anchor_start, &self.anchor_end)
    }

    pub fn select_kind(&mut self, kind: RangeKind) -> TimeInterval {
        self.kind = kind;
        self.refresh()
    }

    pub fn select_kind_index(&mut self, index: u8) -> Result<TimeInterval, RangeError> {
        let kind = RangeKind::try_from(index)?;
        Ok(self.select_kind(kind))
    }

    pub fn select_custom(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> TimeInterval {
        self.kind = RangeKind::Custom;
        self.anchor_start = start.with_timezone(&self.time_zone);
        self.anchor_end = end.with_timezone(&self.time_zone);
        self.refresh()
    }

    pub fn advance(&mut self, direction: Direction) -> TimeInterval {
        if direction == Direction::Today {
            let today = start_of_day(&(self.now_provider)().with_timezone(&self.time_zone));
            if self.kind == RangeKind::Custom {
                self.anchor_end = local_midnight(&self.time_zone, add_days(today.date_naive(), 1));
            }
            self.anchor_start = today;
            return self.refresh();
        }

        let steps = direction.signum();
        let local = self.anchor_start.naive_local();
        let shifted = match self.kind {
            RangeKind::Day => add_days(local.date(), steps),
            RangeKind::Week => add_days(local.date(), 7 * steps),
            RangeKind::Month => add_months(local.date(), steps),
            RangeKind::Year => add_months(local.date(), 12 * steps),
            RangeKind::Total | RangeKind::Custom => return self.refresh(),
        };
        self.anchor_start = localize(&self.time_zone, shifted.and_time(local.time()));
        self.refresh()
    }

    pub fn set_week_start(&mut self, week_start: WeekStart) -> Option<TimeInterval> {
        if self.week_start == week_start {
            return None;
        }
        self.week_start = week_start;
        Some(self.refresh())
    }

    fn refresh(&mut self) -> TimeInterval {
        self.interval = resolve(self.kind, &self.anchor_start, &self.anchor_end, self.week_start);
        self.interval.clone()
    }
}
