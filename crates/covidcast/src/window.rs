use std::fmt;

use chrono::{Datelike, NaiveDate, TimeDelta, Weekday};

use crate::partition::{PartitionDescriptor, TimeType};

/// A contiguous `[start, end]` range requested in one API call.
///
/// Weekly windows carry the Monday of each ISO week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub time_type: TimeType,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    /// `time_values` query parameter, e.g. `20200101-20200110` or `202001-202004`.
    pub fn time_values(&self) -> String {
        format!(
            "{}-{}",
            format_time_value(self.time_type, self.start),
            format_time_value(self.time_type, self.end)
        )
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.time_values())
    }
}

/// Parse an Epidata time value: `YYYYMMDD` for days, `YYYYWW` for ISO weeks.
pub fn parse_time_value(time_type: TimeType, value: i64) -> Option<NaiveDate> {
    if value <= 0 {
        return None;
    }
    match time_type {
        TimeType::Day => {
            let year = i32::try_from(value / 10_000).ok()?;
            let month = ((value / 100) % 100) as u32;
            let day = (value % 100) as u32;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        TimeType::Week => {
            let year = i32::try_from(value / 100).ok()?;
            let week = (value % 100) as u32;
            NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
        }
    }
}

/// Inverse of [`parse_time_value`]. Weekly dates are reported by the ISO
/// week they fall in, so any day of the week formats the same.
pub fn format_time_value(time_type: TimeType, date: NaiveDate) -> i64 {
    match time_type {
        TimeType::Day => {
            i64::from(date.year()) * 10_000 + i64::from(date.month()) * 100 + i64::from(date.day())
        }
        TimeType::Week => {
            let week = date.iso_week();
            i64::from(week.year()) * 100 + i64::from(week.week())
        }
    }
}

fn units(time_type: TimeType, count: i64) -> Option<TimeDelta> {
    match time_type {
        TimeType::Day => TimeDelta::try_days(count),
        TimeType::Week => TimeDelta::try_weeks(count),
    }
}

/// Number of time units per call so that `units * num_locations` stays under
/// the row cap. Never less than one unit.
pub fn window_size(max_rows_per_call: u64, num_locations: u64) -> u64 {
    (max_rows_per_call / num_locations.max(1)).max(1)
}

/// Split a partition's `[min_time, max_time]` into consecutive windows.
///
/// Windows start at `min_time` and advance by [`window_size`] units until the
/// start passes `max_time`. The last window may extend past `max_time`; the
/// API only returns rows that exist.
pub fn plan_windows(descriptor: &PartitionDescriptor, max_rows_per_call: u64) -> Vec<TimeWindow> {
    let time_type = descriptor.time_type;
    let size = window_size(max_rows_per_call, descriptor.num_locations);
    let size = i64::try_from(size).ok();
    let stride = size.and_then(|n| units(time_type, n));
    let first_end = size
        .and_then(|n| units(time_type, n - 1))
        .and_then(|span| descriptor.min_time.checked_add_signed(span));

    // A stride too large to represent covers the whole range in one call.
    let (Some(stride), Some(mut end)) = (stride, first_end) else {
        if descriptor.min_time > descriptor.max_time {
            return Vec::new();
        }
        return vec![TimeWindow {
            time_type,
            start: descriptor.min_time,
            end: descriptor.max_time,
        }];
    };

    let mut windows = Vec::new();
    let mut start = descriptor.min_time;

    while start <= descriptor.max_time {
        windows.push(TimeWindow {
            time_type,
            start,
            end,
        });

        match (start.checked_add_signed(stride), end.checked_add_signed(stride)) {
            (Some(next_start), Some(next_end)) => {
                start = next_start;
                end = next_end;
            }
            _ => break,
        }
    }

    windows
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn descriptor(
        time_type: TimeType,
        min_time: NaiveDate,
        max_time: NaiveDate,
        num_locations: u64,
    ) -> PartitionDescriptor {
        PartitionDescriptor {
            source: "src".into(),
            signal: "sig".into(),
            time_type,
            geo_type: "state".into(),
            min_time,
            max_time,
            num_locations,
            last_update: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
        }
    }

    fn assert_tiles(windows: &[TimeWindow], d: &PartitionDescriptor) {
        assert!(!windows.is_empty());
        assert_eq!(windows[0].start, d.min_time);
        for pair in windows.windows(2) {
            let next_start = pair[0]
                .end
                .checked_add_signed(units(d.time_type, 1).unwrap())
                .unwrap();
            assert_eq!(pair[1].start, next_start, "gap or overlap between windows");
        }
        for w in windows {
            assert!(w.start <= w.end);
        }
        let last = windows.last().unwrap();
        assert!(last.start <= d.max_time);
        assert!(last.end >= d.max_time);
    }

    #[test]
    fn window_size_respects_row_cap() {
        assert_eq!(window_size(3650, 10), 365);
        assert_eq!(window_size(3650, 3651), 1);
        assert_eq!(window_size(3650, 3650), 1);
        assert_eq!(window_size(10, 0), 10);
    }

    #[test]
    fn single_day_partition_is_one_window() {
        let d = descriptor(TimeType::Day, date(2020, 1, 1), date(2020, 1, 1), 10);
        let windows = plan_windows(&d, 3650);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start, date(2020, 1, 1));
        assert_eq!(windows[0].time_values(), "20200101-20201230");
    }

    #[test]
    fn daily_windows_tile_range() {
        let d = descriptor(TimeType::Day, date(2020, 2, 1), date(2021, 3, 15), 400);
        let windows = plan_windows(&d, 3650);
        assert_eq!(windows[0].end, date(2020, 2, 9));
        assert_tiles(&windows, &d);
    }

    #[test]
    fn daily_windows_with_single_unit_size() {
        let d = descriptor(TimeType::Day, date(2020, 12, 30), date(2021, 1, 2), 5000);
        let windows = plan_windows(&d, 3650);
        let values: Vec<String> = windows.iter().map(TimeWindow::time_values).collect();
        assert_eq!(
            values,
            vec![
                "20201230-20201230",
                "20201231-20201231",
                "20210101-20210101",
                "20210102-20210102"
            ]
        );
    }

    #[test]
    fn weekly_windows_use_iso_weeks() {
        let min = parse_time_value(TimeType::Week, 202051).unwrap();
        let max = parse_time_value(TimeType::Week, 202103).unwrap();
        let d = descriptor(TimeType::Week, min, max, 1200);
        let windows = plan_windows(&d, 3650);

        let values: Vec<String> = windows.iter().map(TimeWindow::time_values).collect();
        assert_eq!(values, vec!["202051-202053", "202101-202103"]);
        assert_tiles(&windows, &d);
    }

    #[test]
    fn weekly_windows_tile_long_range() {
        let min = parse_time_value(TimeType::Week, 201901).unwrap();
        let max = parse_time_value(TimeType::Week, 202240).unwrap();
        let d = descriptor(TimeType::Week, min, max, 700);
        assert_tiles(&plan_windows(&d, 3650), &d);
    }

    #[test]
    fn tiling_holds_across_location_counts() {
        for num_locations in [1, 2, 7, 52, 365, 999, 3200, 10_000] {
            let d = descriptor(TimeType::Day, date(2020, 1, 1), date(2022, 6, 30), num_locations);
            assert_tiles(&plan_windows(&d, 3650), &d);
        }
    }

    #[test]
    fn inverted_bounds_produce_no_windows() {
        let d = descriptor(TimeType::Day, date(2020, 1, 5), date(2020, 1, 1), 10);
        assert!(plan_windows(&d, 3650).is_empty());
    }

    #[test]
    fn time_values_round_trip() {
        assert_eq!(parse_time_value(TimeType::Day, 20200229), Some(date(2020, 2, 29)));
        assert_eq!(parse_time_value(TimeType::Day, 20210229), None);
        assert_eq!(format_time_value(TimeType::Day, date(2020, 2, 29)), 20200229);

        let monday = parse_time_value(TimeType::Week, 202053).unwrap();
        assert_eq!(monday, date(2020, 12, 28));
        assert_eq!(format_time_value(TimeType::Week, monday), 202053);
        assert_eq!(format_time_value(TimeType::Week, date(2021, 1, 3)), 202053);
        assert_eq!(parse_time_value(TimeType::Week, 202153), None);
    }
}
