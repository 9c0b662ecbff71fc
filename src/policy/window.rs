//! Maintenance window evaluation
//!
//! A window is active when an instant falls inside `[start, start + duration]`
//! of one of its occurrences. Occurrences are laid out in wall time of the
//! window's own zone, so a daily 01:00 window opens at 01:00 local time on
//! both sides of a DST change and ends at local `01:00 + duration`.

use chrono::{DateTime, Utc};
use jiff::civil;
use jiff::tz::TimeZone;
use jiff::{SignedDuration, Span, Timestamp};
use thiserror::Error;

use crate::crd::{MaintenanceWindow, Recurrence};

/// Longest lookback when searching for an occurrence that is still open
const MAX_LOOKBACK_DAYS: i64 = 400;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("invalid start '{0}': expected YYYY-MM-DDTHH:MM:SS")]
    InvalidStart(String),

    #[error("invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("duration '{0}' is negative")]
    NegativeDuration(String),

    #[error("unknown time zone '{0}'")]
    UnknownTimeZone(String),

    #[error("occurrence cannot be placed in time zone '{0}'")]
    Unrepresentable(String),
}

/// Outcome of evaluating a list of windows at one instant
#[derive(Clone, Debug, PartialEq)]
pub struct WindowStatus<'a> {
    pub active: bool,
    pub window: Option<&'a MaintenanceWindow>,
}

/// Human-readable label of a window, `#<index>` when unnamed
pub fn window_label(window: &MaintenanceWindow, index: usize) -> String {
    window
        .name
        .clone()
        .unwrap_or_else(|| format!("#{}", index))
}

struct ParsedWindow {
    start: civil::DateTime,
    duration: SignedDuration,
    recurrence: Recurrence,
    tz: TimeZone,
}

fn parse(window: &MaintenanceWindow) -> Result<ParsedWindow, WindowError> {
    let start: civil::DateTime = window
        .start
        .trim()
        .parse()
        .map_err(|_| WindowError::InvalidStart(window.start.clone()))?;
    let duration: SignedDuration = window
        .duration
        .trim()
        .parse()
        .map_err(|_| WindowError::InvalidDuration(window.duration.clone()))?;
    if duration.is_negative() {
        return Err(WindowError::NegativeDuration(window.duration.clone()));
    }
    let tz = TimeZone::get(window.timezone.trim())
        .map_err(|_| WindowError::UnknownTimeZone(window.timezone.clone()))?;

    Ok(ParsedWindow {
        start,
        duration,
        recurrence: window.recurrence,
        tz,
    })
}

fn to_timestamp(instant: DateTime<Utc>) -> Timestamp {
    Timestamp::new(instant.timestamp(), instant.timestamp_subsec_nanos() as i32)
        .unwrap_or(Timestamp::UNIX_EPOCH)
}

impl ParsedWindow {
    /// Whether the occurrence starting at `start` (wall time) covers `now`
    fn covers(&self, start: civil::DateTime, now: Timestamp) -> Result<bool, WindowError> {
        let unrepresentable = |_| WindowError::Unrepresentable(self.tz_name());
        let end = start.checked_add(self.duration).map_err(unrepresentable)?;
        let start = start.to_zoned(self.tz.clone()).map_err(unrepresentable)?;
        let end = end.to_zoned(self.tz.clone()).map_err(unrepresentable)?;
        Ok(start.timestamp() <= now && now <= end.timestamp())
    }

    fn tz_name(&self) -> String {
        self.tz.iana_name().unwrap_or("unknown").to_string()
    }

    fn occurs_on(&self, date: civil::Date) -> bool {
        match self.recurrence {
            Recurrence::None => date == self.start.date(),
            Recurrence::Daily => true,
            Recurrence::Weekly => date.weekday() == self.start.date().weekday(),
            // Months without the anchor day simply never produce that date
            Recurrence::Monthly => date.day() == self.start.date().day(),
        }
    }

    fn is_active(&self, now: Timestamp) -> Result<bool, WindowError> {
        if self.recurrence == Recurrence::None {
            return self.covers(self.start, now);
        }

        let today = now.to_zoned(self.tz.clone()).date();
        let lookback = (self.duration.as_secs() / 86_400 + 1).min(MAX_LOOKBACK_DAYS);

        for days_back in 0..=lookback {
            let Ok(date) = today.checked_sub(Span::new().days(days_back)) else {
                break;
            };
            if !self.occurs_on(date) {
                continue;
            }
            let occurrence = date.to_datetime(self.start.time());
            if occurrence < self.start {
                break;
            }
            if self.covers(occurrence, now)? {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

/// Whether `window` is active at `now`
pub fn is_active(window: &MaintenanceWindow, now: DateTime<Utc>) -> Result<bool, WindowError> {
    parse(window)?.is_active(to_timestamp(now))
}

/// Validate a window without evaluating it
pub fn validate(window: &MaintenanceWindow) -> Result<(), WindowError> {
    parse(window).map(|_| ())
}

/// First active window of `windows` at `now`; invalid windows never match
pub fn evaluate(windows: &[MaintenanceWindow], now: DateTime<Utc>) -> WindowStatus<'_> {
    let window = windows
        .iter()
        .find(|w| is_active(w, now).unwrap_or(false));
    WindowStatus {
        active: window.is_some(),
        window,
    }
}
