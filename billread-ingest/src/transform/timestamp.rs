use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Month, PrimitiveDateTime, Time};

use super::text::normalize_am_pm;

type Format = &'static [BorrowedFormatItem<'static>];

/// Tried in order; the first format that consumes the whole value wins.
/// Day-first variants come before their month-first twins.
const EXPLICIT_FORMATS: &[Format] = &[
    format_description!(
        "[day padding:none]/[month padding:none]/[year] [hour repr:12 padding:none]:[minute]:[second] [period case_sensitive:false]"
    ),
    format_description!(
        "[month padding:none]/[day padding:none]/[year] [hour repr:12 padding:none]:[minute]:[second] [period case_sensitive:false]"
    ),
    format_description!("[year]-[month]-[day] [hour padding:none]:[minute]:[second]"),
    format_description!("[day padding:none]/[month padding:none]/[year] [hour padding:none]:[minute]:[second]"),
    format_description!("[month padding:none]/[day padding:none]/[year] [hour padding:none]:[minute]:[second]"),
    format_description!(
        "[day padding:none]/[month padding:none]/[year] [hour repr:12 padding:none]:[minute] [period case_sensitive:false]"
    ),
    format_description!("[day padding:none]/[month padding:none]/[year] [hour padding:none]:[minute]"),
    format_description!("[year]-[month]-[day] [hour padding:none]:[minute]"),
];

static PERMISSIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{1,4})[/\-.](\d{1,2})[/\-.](\d{1,4})(?:[T\s]+(\d{1,2}):(\d{1,2})(?::(\d{1,2}))?(?:[.,]\d+)?)?\s*(?:([AaPp])\.?\s?[Mm]\.?)?$",
    )
    .expect("permissive timestamp pattern is valid")
});

/// Day, month name, year: `01-Feb-2024`, `1 feb 24`, `1 de febrero de 2024`.
static NAMED_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{1,2})[\s\-/.]+(?:de\s+)?(\p{L}{3,10})\.?[\s\-/.,]+(?:de\s+)?(\d{2}|\d{4})(?:[T\s]+(\d{1,2}):(\d{1,2})(?::(\d{1,2}))?(?:[.,]\d+)?)?\s*(?:([AaPp])\.?\s?[Mm]\.?)?$",
    )
    .expect("named month timestamp pattern is valid")
});

/// Trailing `Z`, `UTC` or numeric offset after a time of day.
static UTC_DESIGNATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d:\d{2}(?::\d{2}(?:[.,]\d+)?)?)\s*(?:z|utc|gmt|[+\-]\d{2}(?::?\d{2})?)$")
        .expect("utc designator pattern is valid")
});

/// English and Spanish month abbreviations, matched on the first three
/// letters of the name.
const MONTH_ABBREVIATIONS: &[(&str, Month)] = &[
    ("jan", Month::January),
    ("ene", Month::January),
    ("feb", Month::February),
    ("mar", Month::March),
    ("apr", Month::April),
    ("abr", Month::April),
    ("may", Month::May),
    ("jun", Month::June),
    ("jul", Month::July),
    ("aug", Month::August),
    ("ago", Month::August),
    ("sep", Month::September),
    ("set", Month::September),
    ("oct", Month::October),
    ("nov", Month::November),
    ("dec", Month::December),
    ("dic", Month::December),
];

/// Parse one raw timestamp cell.
///
/// Returns `None` for anything unreadable; callers drop those rows from
/// aggregation instead of failing the file. A UTC designator or offset is
/// dropped and the wall clock time kept as written.
pub fn parse_timestamp(raw: &str) -> Option<PrimitiveDateTime> {
    let normalized = normalize_am_pm(raw);
    let text = UTC_DESIGNATOR.replace(&normalized, "$1");
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    EXPLICIT_FORMATS
        .iter()
        .find_map(|format| PrimitiveDateTime::parse(text, format).ok())
        .or_else(|| parse_permissive(text))
        .or_else(|| parse_named_month(text))
}

fn expand_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    match raw.len() {
        1 | 2 => Some(2000 + year),
        4 => Some(year),
        _ => None,
    }
}

/// Lenient fallback: any `d/m/y`, `y-m-d` or dotted date with an optional
/// time of day. Ambiguous numeric dates are read day first; a month above
/// 12 swaps day and month.
fn parse_permissive(text: &str) -> Option<PrimitiveDateTime> {
    let caps = PERMISSIVE.captures(text)?;
    let num = |i: usize| -> Option<u32> { caps.get(i).and_then(|m| m.as_str().parse().ok()) };

    let (first, second, third) = (&caps[1], &caps[2], &caps[3]);
    let (year, mut month, mut day) = if first.len() == 4 {
        (expand_year(first)?, num(2)?, num(3)?)
    } else {
        (expand_year(third)?, second.parse().ok()?, first.parse().ok()?)
    };
    if month > 12 && day <= 12 {
        std::mem::swap(&mut month, &mut day);
    }

    let month = Month::try_from(u8::try_from(month).ok()?).ok()?;
    let date = Date::from_calendar_date(year, month, u8::try_from(day).ok()?).ok()?;
    Some(PrimitiveDateTime::new(date, clock(&caps, 4)?))
}

/// Day first dates with a month name in English or Spanish.
fn parse_named_month(text: &str) -> Option<PrimitiveDateTime> {
    let caps = NAMED_MONTH.captures(text)?;
    let month = month_from_name(&caps[2])?;
    let day: u8 = caps[1].parse().ok()?;
    let date = Date::from_calendar_date(expand_year(&caps[3])?, month, day).ok()?;
    Some(PrimitiveDateTime::new(date, clock(&caps, 4)?))
}

fn month_from_name(name: &str) -> Option<Month> {
    let prefix: String = name.to_lowercase().chars().take(3).collect();
    MONTH_ABBREVIATIONS
        .iter()
        .find(|(abbr, _)| *abbr == prefix)
        .map(|&(_, month)| month)
}

/// Time of day from the hour, minute, second and meridiem groups starting
/// at `first`. Missing groups read as midnight.
fn clock(caps: &Captures<'_>, first: usize) -> Option<Time> {
    let num = |i: usize| -> Option<u32> { caps.get(i).and_then(|m| m.as_str().parse().ok()) };
    let mut hour = num(first).unwrap_or(0);
    let minute = num(first + 1).unwrap_or(0);
    let second = num(first + 2).unwrap_or(0);

    if let Some(marker) = caps.get(first + 3) {
        if !(1..=12).contains(&hour) {
            return None;
        }
        let pm = marker.as_str().eq_ignore_ascii_case("p");
        hour = match (pm, hour) {
            (false, 12) => 0,
            (true, h) if h < 12 => h + 12,
            (_, h) => h,
        };
    }

    Time::from_hms(
        u8::try_from(hour).ok()?,
        u8::try_from(minute).ok()?,
        u8::try_from(second).ok()?,
    )
    .ok()
}
