use time::{error::ComponentRange, Date, Duration, Month, PrimitiveDateTime, Time};

/// Sampling intervals (minutes) a meter export can be snapped to.
pub const VALID_INTERVALS: [i64; 6] = [5, 10, 15, 20, 30, 60];
pub const DEFAULT_INTERVAL_MINUTES: i64 = 15;

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Derive the dominant sampling interval from observed timestamps.
///
/// The mode of the consecutive differences (rounded to whole minutes) is
/// snapped to the nearest member of [`VALID_INTERVALS`]. Equal counts
/// resolve to the shorter difference, equal distances to the shorter
/// interval. Without at least two distinct instants `default` is returned.
pub fn infer_interval_minutes(timestamps: &[PrimitiveDateTime], default: i64) -> i64 {
    let mut sorted = timestamps.to_vec();
    sorted.sort();
    sorted.dedup();

    let mut counts: std::collections::BTreeMap<i64, usize> = std::collections::BTreeMap::new();
    for pair in sorted.windows(2) {
        let minutes = ((pair[1] - pair[0]).as_seconds_f64() / 60.0).round() as i64;
        *counts.entry(minutes).or_default() += 1;
    }

    let mode = counts
        .iter()
        .fold(None::<(i64, usize)>, |best, (&minutes, &count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((minutes, count)),
        })
        .map(|(minutes, _)| minutes);

    match mode {
        Some(minutes) if minutes > 0 => snap_interval(minutes),
        _ => default,
    }
}

fn snap_interval(minutes: i64) -> i64 {
    VALID_INTERVALS
        .iter()
        .copied()
        .min_by_key(|valid| ((valid - minutes).abs(), *valid))
        .unwrap_or(DEFAULT_INTERVAL_MINUTES)
}

/// Parse a `HH:MM` time of day.
pub fn parse_clock(raw: &str) -> Option<Time> {
    let (hour, minute) = raw.trim().split_once(':')?;
    Time::from_hms(hour.trim().parse().ok()?, minute.trim().parse().ok()?, 0).ok()
}

/// A requested calendar month with the configured start-of-day and
/// end-of-day markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthPeriod {
    first_day: Date,
    next_first_day: Date,
    start_of_day: Time,
    end_of_day: Time,
}

impl MonthPeriod {
    pub fn new(year: i32, month: u8, start_of_day: Time, end_of_day: Time) -> Result<Self, ComponentRange> {
        let month = Month::try_from(month)?;
        let first_day = Date::from_calendar_date(year, month, 1)?;
        let next_year = if month == Month::December { year + 1 } else { year };
        let next_first_day = Date::from_calendar_date(next_year, month.next(), 1)?;
        Ok(Self {
            first_day,
            next_first_day,
            start_of_day,
            end_of_day,
        })
    }

    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    pub fn month(&self) -> Month {
        self.first_day.month()
    }

    pub fn days(&self) -> i64 {
        (self.next_first_day - self.first_day).whole_days()
    }

    /// First grid instant: day 1 at the start-of-day marker.
    pub fn start(&self) -> PrimitiveDateTime {
        PrimitiveDateTime::new(self.first_day, self.start_of_day)
    }

    /// First instant of the following month at the end-of-day marker.
    pub fn end(&self) -> PrimitiveDateTime {
        PrimitiveDateTime::new(self.next_first_day, self.end_of_day)
    }

    /// Number of grid points implied by the calendar length of the month.
    pub fn expected_points(&self, interval_minutes: i64) -> usize {
        usize::try_from(self.days() * MINUTES_PER_DAY / interval_minutes.max(1)).unwrap_or(0)
    }
}

/// The complete, regular sequence of instants a company's reading set
/// covers for one month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeGrid {
    interval_minutes: i64,
    points: Vec<PrimitiveDateTime>,
}

impl TimeGrid {
    /// Materialize the grid for `period`.
    ///
    /// The inclusive `[start, end]` range is generated first and then
    /// reconciled with the calendar: a short range is extended past `end`
    /// and a long one truncated, so the result always holds
    /// `days_in_month * 1440 / interval` points.
    pub fn for_month(period: &MonthPeriod, interval_minutes: i64) -> Self {
        let interval_minutes = interval_minutes.max(1);
        let step = Duration::minutes(interval_minutes);
        let expected = period.expected_points(interval_minutes);

        let mut points = Vec::with_capacity(expected + 1);
        let end = period.end();
        let mut ts = period.start();
        while ts <= end {
            points.push(ts);
            ts += step;
        }

        if points.len() > expected {
            points.truncate(expected);
        } else {
            let mut next = points.last().map(|last| *last + step).unwrap_or_else(|| period.start());
            while points.len() < expected {
                points.push(next);
                next += step;
            }
        }

        Self {
            interval_minutes,
            points,
        }
    }

    pub fn interval_minutes(&self) -> i64 {
        self.interval_minutes
    }

    pub fn points(&self) -> &[PrimitiveDateTime] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<PrimitiveDateTime> {
        self.points.first().copied()
    }

    pub fn last(&self) -> Option<PrimitiveDateTime> {
        self.points.last().copied()
    }
}
