//! Defines the time frequencies used for aggregation windows and the cyclical
//! frequencies used to key climatologies.

use crate::error::TimeSeriesError;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The granularity of an aggregation window.
///
/// `Minute`, `Hour`, `Day` and `Week` are fixed-length. `Month` and `Year` use
/// calendar arithmetic, so windows at those frequencies have different lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Frequency {
    pub const ALL: [Frequency; 6] = [
        Frequency::Year,
        Frequency::Month,
        Frequency::Week,
        Frequency::Day,
        Frequency::Hour,
        Frequency::Minute,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Frequency::Minute => "minute",
            Frequency::Hour => "hour",
            Frequency::Day => "day",
            Frequency::Week => "week",
            Frequency::Month => "month",
            Frequency::Year => "year",
        }
    }

    /// The exact length of one unit, or `None` for calendar frequencies.
    pub fn fixed_duration(&self) -> Option<Duration> {
        match self {
            Frequency::Minute => Some(Duration::minutes(1)),
            Frequency::Hour => Some(Duration::hours(1)),
            Frequency::Day => Some(Duration::days(1)),
            Frequency::Week => Some(Duration::weeks(1)),
            Frequency::Month | Frequency::Year => None,
        }
    }

    pub fn is_calendar(&self) -> bool {
        self.fixed_duration().is_none()
    }

    /// Advances `anchor` by `steps` units.
    ///
    /// Month and year steps are applied to the anchor in one go, so a day that
    /// does not exist in the target month is clamped to that month's last day
    /// (Jan 31 + 1 month = Feb 28/29) without carrying into later boundaries.
    /// Returns `None` on overflow.
    pub fn advance(&self, anchor: DateTime<Utc>, steps: u32) -> Option<DateTime<Utc>> {
        match self {
            Frequency::Month => anchor.checked_add_months(Months::new(steps)),
            Frequency::Year => anchor.checked_add_months(Months::new(steps.checked_mul(12)?)),
            fixed => {
                let unit = fixed.fixed_duration()?;
                anchor.checked_add_signed(unit.checked_mul(i32::try_from(steps).ok()?)?)
            }
        }
    }

    /// Floors `time` to the calendar start of its unit. Weeks start on Monday.
    pub fn truncate(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let date = time.date_naive();
        let floored = match self {
            Frequency::Minute => time.with_second(0).and_then(|t| t.with_nanosecond(0)),
            Frequency::Hour => time
                .with_minute(0)
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_nanosecond(0)),
            Frequency::Day => start_of_day(date),
            Frequency::Week => {
                start_of_day(date - Duration::days(date.weekday().num_days_from_monday() as i64))
            }
            Frequency::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
                .and_then(start_of_day),
            Frequency::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).and_then(start_of_day),
        };
        // Flooring only moves backwards inside valid chrono ranges.
        floored.unwrap_or(time)
    }
}

fn start_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Frequency {
    type Err = TimeSeriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Frequency::ALL
            .into_iter()
            .find(|f| f.name() == lower)
            .ok_or_else(|| TimeSeriesError::InvalidFrequency {
                given: s.to_string(),
                options: Frequency::ALL.iter().map(|f| f.name()).collect(),
            })
    }
}

/// The cyclical unit a climatology is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClimatologyFrequency {
    /// Calendar month, keys `1..=12`.
    Month,
    /// Ordinal day of the year, keys `1..=366`.
    #[serde(rename = "dayofyear")]
    DayOfYear,
}

impl ClimatologyFrequency {
    pub const ALL: [ClimatologyFrequency; 2] =
        [ClimatologyFrequency::Month, ClimatologyFrequency::DayOfYear];

    pub fn name(&self) -> &'static str {
        match self {
            ClimatologyFrequency::Month => "month",
            ClimatologyFrequency::DayOfYear => "dayofyear",
        }
    }

    /// The window frequency used to pre-aggregate a series before bucketing.
    pub fn base_frequency(&self) -> Frequency {
        match self {
            ClimatologyFrequency::Month => Frequency::Month,
            ClimatologyFrequency::DayOfYear => Frequency::Day,
        }
    }

    pub fn default_start(&self) -> u32 {
        1
    }

    pub fn default_end(&self) -> u32 {
        match self {
            ClimatologyFrequency::Month => 12,
            ClimatologyFrequency::DayOfYear => 366,
        }
    }

    pub fn contains_key(&self, key: u32) -> bool {
        (self.default_start()..=self.default_end()).contains(&key)
    }

    /// The cyclical key of `time`, always inside `default_start()..=default_end()`.
    pub fn key_of(&self, time: DateTime<Utc>) -> u32 {
        match self {
            ClimatologyFrequency::Month => time.month(),
            ClimatologyFrequency::DayOfYear => time.ordinal(),
        }
    }
}

impl fmt::Display for ClimatologyFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ClimatologyFrequency {
    type Err = TimeSeriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "month" => Ok(ClimatologyFrequency::Month),
            "day" | "dayofyear" => Ok(ClimatologyFrequency::DayOfYear),
            _ => Err(TimeSeriesError::InvalidFrequency {
                given: s.to_string(),
                options: ClimatologyFrequency::ALL.iter().map(|f| f.name()).collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_month_advance_clamps_without_drift() {
        let jan31 = utc(2020, 1, 31, 6);
        assert_eq!(Frequency::Month.advance(jan31, 1), Some(utc(2020, 2, 29, 6)));
        assert_eq!(Frequency::Month.advance(jan31, 2), Some(utc(2020, 3, 31, 6)));
        assert_eq!(Frequency::Month.advance(jan31, 3), Some(utc(2020, 4, 30, 6)));

        let jan31_2021 = utc(2021, 1, 31, 0);
        assert_eq!(
            Frequency::Month.advance(jan31_2021, 1),
            Some(utc(2021, 2, 28, 0))
        );
    }

    #[test]
    fn test_year_advance_from_leap_day() {
        let leap = utc(2020, 2, 29, 0);
        assert_eq!(Frequency::Year.advance(leap, 1), Some(utc(2021, 2, 28, 0)));
        assert_eq!(Frequency::Year.advance(leap, 4), Some(utc(2024, 2, 29, 0)));
    }

    #[test]
    fn test_truncate() {
        let t = Utc.with_ymd_and_hms(2020, 9, 10, 13, 45, 12).unwrap();
        assert_eq!(Frequency::Hour.truncate(t), utc(2020, 9, 10, 13));
        assert_eq!(Frequency::Day.truncate(t), utc(2020, 9, 10, 0));
        // 2020-09-10 is a Thursday
        assert_eq!(Frequency::Week.truncate(t), utc(2020, 9, 7, 0));
        assert_eq!(Frequency::Month.truncate(t), utc(2020, 9, 1, 0));
        assert_eq!(Frequency::Year.truncate(t), utc(2020, 1, 1, 0));
    }

    #[test]
    fn test_parse_frequency() {
        assert_eq!("Day".parse::<Frequency>().unwrap(), Frequency::Day);
        let err = "fortnight".parse::<Frequency>().unwrap_err();
        assert!(matches!(err, TimeSeriesError::InvalidFrequency { .. }));
        assert!(err.to_string().contains("fortnight"));

        assert_eq!(
            "day".parse::<ClimatologyFrequency>().unwrap(),
            ClimatologyFrequency::DayOfYear
        );
    }

    #[test]
    fn test_climatology_keys() {
        let dec31_leap = utc(2020, 12, 31, 0);
        assert_eq!(ClimatologyFrequency::DayOfYear.key_of(dec31_leap), 366);
        assert_eq!(ClimatologyFrequency::Month.key_of(dec31_leap), 12);
        assert!(!ClimatologyFrequency::Month.contains_key(13));
    }
}
