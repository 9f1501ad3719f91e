//! Calendar-aware partitioning of a time range into aggregation windows.

use crate::types::frequency::Frequency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A half-open interval `[start, end)` at a given [`Frequency`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub frequency: Frequency,
    partial: bool,
}

impl TimeWindow {
    /// The timestamp used to tag the output of this window: its start.
    pub fn representative(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && time < self.end
    }

    pub fn contains_millis(&self, millis: i64) -> bool {
        self.start.timestamp_millis() <= millis && millis < self.end.timestamp_millis()
    }

    /// True when the window was cut short by the end of the requested range.
    pub fn is_partial(&self) -> bool {
        self.partial
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}) {}",
            self.start.format("%Y-%m-%d %H:%M:%S"),
            self.end.format("%Y-%m-%d %H:%M:%S"),
            self.frequency
        )
    }
}

/// A lazy, restartable sequence of contiguous windows.
///
/// Created by [`generate_windows`]. Iterating does not consume the `Windows`
/// value, so the same sequence can be walked any number of times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Windows {
    anchor: DateTime<Utc>,
    end: DateTime<Utc>,
    frequency: Frequency,
}

impl Windows {
    pub fn iter(&self) -> WindowIter {
        WindowIter {
            windows: *self,
            step: 0,
            done: false,
        }
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }
}

impl IntoIterator for Windows {
    type Item = TimeWindow;
    type IntoIter = WindowIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for &Windows {
    type Item = TimeWindow;
    type IntoIter = WindowIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct WindowIter {
    windows: Windows,
    step: u32,
    done: bool,
}

impl Iterator for WindowIter {
    type Item = TimeWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let Windows {
            anchor,
            end,
            frequency,
        } = self.windows;

        let Some(start) = frequency.advance(anchor, self.step) else {
            self.done = true;
            return None;
        };
        // A zero-length range still gets the one window containing it.
        let degenerate = self.step == 0 && anchor == end;
        if start >= end && !degenerate {
            self.done = true;
            return None;
        }
        let Some(next) = self
            .step
            .checked_add(1)
            .and_then(|s| frequency.advance(anchor, s))
        else {
            self.done = true;
            return None;
        };

        self.step += 1;
        let partial = !degenerate && next > end;
        Some(TimeWindow {
            start,
            end: if partial { end } else { next },
            frequency,
            partial,
        })
    }
}

/// Partitions `[start, end)` into windows of one `frequency` unit each.
///
/// Boundaries are computed from `start` directly (`start + k` units), so month
/// windows anchored on the 31st land on the last day of shorter months and
/// return to the 31st afterwards. The final window is truncated at `end` when
/// the range does not divide evenly. `start == end` yields one full window and
/// `start > end` yields none.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use wxts::{generate_windows, Frequency};
///
/// let start = Utc.with_ymd_and_hms(2020, 1, 31, 0, 0, 0).unwrap();
/// let end = Utc.with_ymd_and_hms(2020, 4, 1, 0, 0, 0).unwrap();
/// let starts: Vec<_> = generate_windows(start, end, Frequency::Month)
///     .iter()
///     .map(|w| w.start.format("%m-%d").to_string())
///     .collect();
/// assert_eq!(starts, vec!["01-31", "02-29", "03-31"]);
/// ```
pub fn generate_windows(start: DateTime<Utc>, end: DateTime<Utc>, frequency: Frequency) -> Windows {
    Windows {
        anchor: start,
        end,
        frequency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn assert_tiles(windows: &[TimeWindow], start: DateTime<Utc>, end: DateTime<Utc>) {
        assert_eq!(windows.first().map(|w| w.start), Some(start));
        assert_eq!(windows.last().map(|w| w.end), Some(end));
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "gap or overlap at {}", pair[0]);
            assert!(pair[0].start < pair[0].end);
        }
    }

    #[test]
    fn test_windows_tile_range_for_every_frequency() {
        let start = Utc.with_ymd_and_hms(2019, 11, 17, 5, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2021, 3, 2, 11, 0, 0).unwrap();
        for frequency in [
            Frequency::Hour,
            Frequency::Day,
            Frequency::Week,
            Frequency::Month,
            Frequency::Year,
        ] {
            let windows: Vec<_> = generate_windows(start, end, frequency).iter().collect();
            assert_tiles(&windows, start, end);
            assert!(windows.iter().rev().skip(1).all(|w| !w.is_partial()));
        }
    }

    #[test]
    fn test_daily_windows_divide_evenly() {
        let windows: Vec<_> =
            generate_windows(utc(2020, 9, 8), utc(2020, 9, 15), Frequency::Day).iter().collect();
        assert_eq!(windows.len(), 7);
        assert!(windows.iter().all(|w| w.end - w.start == Duration::days(1)));
        assert!(!windows[6].is_partial());
    }

    #[test]
    fn test_final_window_is_partial() {
        let end = utc(2020, 9, 10) + Duration::hours(6);
        let windows: Vec<_> = generate_windows(utc(2020, 9, 8), end, Frequency::Day).iter().collect();
        assert_eq!(windows.len(), 3);
        assert!(windows[2].is_partial());
        assert_eq!(windows[2].end, end);
    }

    #[test]
    fn test_month_windows_have_calendar_lengths() {
        let windows: Vec<_> =
            generate_windows(utc(2021, 1, 1), utc(2022, 1, 1), Frequency::Month).iter().collect();
        let lengths: Vec<i64> = windows.iter().map(|w| (w.end - w.start).num_days()).collect();
        assert_eq!(lengths, vec![31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]);
    }

    #[test]
    fn test_month_windows_anchored_on_31st() {
        let windows: Vec<_> =
            generate_windows(utc(2021, 1, 31), utc(2021, 6, 1), Frequency::Month).iter().collect();
        let starts: Vec<_> = windows.iter().map(|w| w.start).collect();
        assert_eq!(
            starts,
            vec![
                utc(2021, 1, 31),
                utc(2021, 2, 28),
                utc(2021, 3, 31),
                utc(2021, 4, 30),
                utc(2021, 5, 31)
            ]
        );
        assert!(windows[4].is_partial());
    }

    #[test]
    fn test_degenerate_and_inverted_ranges() {
        let t = utc(2020, 1, 1);
        let one: Vec<_> = generate_windows(t, t, Frequency::Day).iter().collect();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].end, utc(2020, 1, 2));
        assert!(one[0].contains(t));

        assert_eq!(generate_windows(utc(2020, 1, 2), t, Frequency::Day).iter().count(), 0);
    }

    #[test]
    fn test_windows_are_restartable() {
        let windows = generate_windows(utc(2020, 1, 1), utc(2020, 3, 1), Frequency::Week);
        let first: Vec<_> = windows.iter().collect();
        let second: Vec<_> = windows.into_iter().collect();
        assert_eq!(first, second);
    }
}
