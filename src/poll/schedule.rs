//! Wall-clock scheduling: the weekly reset time and relative date expressions.

// lazy_regex! statics rely on once_cell internally
#![allow(clippy::non_std_lazy_statics)]

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use lazy_regex::lazy_regex;
use tracing::error;

/// `last|next|this <weekday> [at H[:MM][am|pm]]`
static RE_RELATIVE_WEEKDAY: lazy_regex::Lazy<regex::Regex> = lazy_regex!(
    r"(?i)^\s*(last|next|this)\s+(mon|tue|wed|thu|fri|sat|sun)[a-z]*(?:\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?)?\s*$"
);

/// `today|tomorrow|yesterday [at H[:MM][am|pm]]`
static RE_RELATIVE_DAY: lazy_regex::Lazy<regex::Regex> = lazy_regex!(
    r"(?i)^\s*(today|tomorrow|yesterday)(?:\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?)?\s*$"
);

/// Hour used when a relative expression names no time
pub const DEFAULT_START_HOUR: u32 = 9;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;

    /// Convert an instant to local wall-clock time
    fn local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&Local).naive_local()
    }

    /// Current local wall-clock time
    fn now_local(&self) -> NaiveDateTime {
        self.local(self.now())
    }
}

/// The system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Next weekly reset strictly after `now`.
///
/// Before `weekday` this week → that day; on `weekday` → today if before
/// `hour`, else a week later; after `weekday` → next week.
#[must_use]
pub fn next_reset(now: NaiveDateTime, weekday: Weekday, hour: u32) -> NaiveDateTime {
    let reset_time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date();
    let today_index = i64::from(today.weekday().num_days_from_monday());
    let target_index = i64::from(weekday.num_days_from_monday());

    let days_ahead = match today_index.cmp(&target_index) {
        std::cmp::Ordering::Less => target_index - today_index,
        std::cmp::Ordering::Equal if now.time() < reset_time => 0,
        std::cmp::Ordering::Equal => 7,
        std::cmp::Ordering::Greater => 7 - (today_index - target_index),
    };

    let candidate = (today + Duration::days(days_ahead)).and_time(reset_time);
    if candidate <= now {
        error!(
            "Computed reset time {} is not after now ({}); pushing it back a week",
            candidate, now
        );
        return candidate + Duration::days(7);
    }
    candidate
}

fn parse_weekday(token: &str) -> Option<Weekday> {
    let prefix: String = token.chars().take(3).collect::<String>().to_lowercase();
    match prefix.as_str() {
        "mon" => Some(Weekday::Mon),
        "tue" => Some(Weekday::Tue),
        "wed" => Some(Weekday::Wed),
        "thu" => Some(Weekday::Thu),
        "fri" => Some(Weekday::Fri),
        "sat" => Some(Weekday::Sat),
        "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

fn parse_time(
    hour: Option<regex::Match<'_>>,
    minute: Option<regex::Match<'_>>,
    meridiem: Option<regex::Match<'_>>,
) -> Option<NaiveTime> {
    let Some(hour) = hour else {
        return NaiveTime::from_hms_opt(DEFAULT_START_HOUR, 0, 0);
    };
    let mut hour: u32 = hour.as_str().parse().ok()?;
    let minute: u32 = minute.map_or(Some(0), |m| m.as_str().parse().ok())?;

    if let Some(meridiem) = meridiem {
        if !(1..=12).contains(&hour) {
            return None;
        }
        let pm = meridiem.as_str().eq_ignore_ascii_case("pm");
        hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
    }

    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Resolve a relative date expression anchored to `now`.
///
/// `next <weekday>` is that weekday in the following Monday-based week,
/// `last <weekday>` the most recent strictly past occurrence, `this <weekday>`
/// the occurrence in the current week.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use ocb_poll_bot::poll::schedule::resolve_relative;
///
/// // Friday 16 October 2026, 08:00
/// let now = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap().and_hms_opt(8, 0, 0).unwrap();
/// let next = resolve_relative("next thursday", now).unwrap();
/// assert_eq!(next.date(), NaiveDate::from_ymd_opt(2026, 10, 22).unwrap());
/// ```
#[must_use]
pub fn resolve_relative(expr: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let today = now.date();

    if let Some(caps) = RE_RELATIVE_WEEKDAY.captures(expr) {
        let modifier = caps.get(1)?.as_str().to_lowercase();
        let weekday = parse_weekday(caps.get(2)?.as_str())?;
        let time = parse_time(caps.get(3), caps.get(4), caps.get(5))?;

        let diff_base = i64::from(weekday.num_days_from_monday())
            - i64::from(today.weekday().num_days_from_monday());
        let diff = match modifier.as_str() {
            "next" => diff_base + 7,
            "last" if diff_base - 7 < -7 => diff_base,
            "last" => diff_base - 7,
            _ => diff_base,
        };
        return Some((today + Duration::days(diff)).and_time(time));
    }

    if let Some(caps) = RE_RELATIVE_DAY.captures(expr) {
        let offset = match caps.get(1)?.as_str().to_lowercase().as_str() {
            "tomorrow" => 1,
            "yesterday" => -1,
            _ => 0,
        };
        let time = parse_time(caps.get(2), caps.get(3), caps.get(4))?;
        return Some((today + Duration::days(offset)).and_time(time));
    }

    None
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%b %d, %Y",
];

/// Parse an absolute date or date-time written in a template's `when` field.
///
/// Date-only values resolve to midnight.
#[must_use]
pub fn parse_when(expr: &str) -> Option<NaiveDateTime> {
    let expr = expr.trim();

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(expr, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(expr, fmt).ok())
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}
