//! Human readable durations.
//!
//! Configuration refers to durations in the form used by people, such as
//! `"12 hours"` or `"30s"`. A duration consists of an unsigned amount
//! followed by a unit, optionally separated by white space.

use std::{error, fmt};
use chrono::TimeDelta;


/// Parses a human readable duration.
///
/// Understood units are seconds, minutes, hours, days, and weeks, each in
/// the singular, plural, and in a short form (`s`, `sec`, `m`, `min`, `h`,
/// `d`, `w`). Units are case insensitive.
pub fn parse(s: &str) -> Result<TimeDelta, DurationError> {
    let s = s.trim();
    let split = s.find(|ch: char| !ch.is_ascii_digit()).unwrap_or(s.len());
    let (amount, unit) = s.split_at(split);
    if amount.is_empty() {
        return Err(DurationError::new(s))
    }
    let amount = amount.parse::<i64>().map_err(|_| DurationError::new(s))?;
    let seconds = match unit.trim().to_ascii_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600,
        "d" | "day" | "days" => 86_400,
        "w" | "week" | "weeks" => 604_800,
        _ => return Err(DurationError::new(s))
    };
    amount.checked_mul(seconds).and_then(TimeDelta::try_seconds).ok_or_else(
        || DurationError::new(s)
    )
}


//------------ DurationError -------------------------------------------------

/// A string did not contain a valid duration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DurationError(String);

impl DurationError {
    pub(crate) fn new(s: &str) -> Self {
        DurationError(s.into())
    }
}

impl fmt::Display for DurationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid duration '{}'", self.0)
    }
}

impl error::Error for DurationError { }


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_durations() {
        assert_eq!(parse("12 hours").unwrap(), TimeDelta::hours(12));
        assert_eq!(parse("48 hours").unwrap(), TimeDelta::hours(48));
        assert_eq!(parse("30s").unwrap(), TimeDelta::seconds(30));
        assert_eq!(parse("30 seconds").unwrap(), TimeDelta::seconds(30));
        assert_eq!(parse("5 minutes").unwrap(), TimeDelta::minutes(5));
        assert_eq!(parse("1 Day").unwrap(), TimeDelta::days(1));
        assert_eq!(parse(" 2 weeks ").unwrap(), TimeDelta::weeks(2));
        assert_eq!(parse("30d").unwrap(), TimeDelta::days(30));
    }

    #[test]
    fn reject_garbage() {
        assert!(parse("").is_err());
        assert!(parse("hours").is_err());
        assert!(parse("12").is_err());
        assert!(parse("12 fortnights").is_err());
        assert!(parse("-5 minutes").is_err());
    }
}
