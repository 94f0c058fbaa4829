use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate, TimeZone};
use serde::Serialize;
use tracing::warn;

use crate::recurrence::is_active_day;
use crate::reminder::{MainReminderConfig, TaskReminder};

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct DayFlags {
    pub has_main: bool,
    pub has_task: bool,
}

impl DayFlags {
    pub fn any(&self) -> bool {
        self.has_main || self.has_task
    }
}

/// Every date of the month, in order. Empty for an invalid month.
pub fn days_of_month(year: i32, month: u32) -> Vec<NaiveDate> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return vec![];
    };

    let mut days = Vec::with_capacity(31);
    let mut day = first;
    while day.month() == month {
        days.push(day);
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    days
}

/// Moves `(year, month)` by `delta` months.
pub fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 + delta;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// Main/task presence for each day of a month, keyed by day of month.
#[tracing::instrument(skip(config, tasks, tz))]
pub fn month_flags<Tz: TimeZone>(
    year: i32,
    month: u32,
    config: &MainReminderConfig,
    tasks: &[TaskReminder],
    tz: &Tz,
) -> BTreeMap<u32, DayFlags> {
    let days = days_of_month(year, month);
    if days.is_empty() {
        warn!(year, month, "invalid month requested");
        return BTreeMap::new();
    }

    let task_dates: BTreeSet<NaiveDate> = tasks
        .iter()
        .filter(|task| task.active)
        .map(|task| task.local_date(tz))
        .collect();

    days.into_iter()
        .map(|date| {
            (
                date.day(),
                DayFlags {
                    has_main: is_active_day(date, config),
                    has_task: task_dates.contains(&date),
                },
            )
        })
        .collect()
}

/// Leading blank cells before day 1 in a Sunday-first week grid.
pub fn leading_blanks(year: i32, month: u32) -> u32 {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|first| first.weekday().num_days_from_sunday())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc, Weekday};

    use super::{DayFlags, days_of_month, leading_blanks, month_flags, shift_month};
    use crate::reminder::{MainReminderConfig, TaskReminder, TimeOfDay};

    #[test]
    fn month_lengths() {
        assert_eq!(days_of_month(2026, 2).len(), 28);
        assert_eq!(days_of_month(2028, 2).len(), 29);
        assert_eq!(days_of_month(2026, 12).len(), 31);
        assert!(days_of_month(2026, 13).is_empty());
    }

    #[test]
    fn shifts_across_year_boundaries() {
        assert_eq!(shift_month(2026, 12, 1), (2027, 1));
        assert_eq!(shift_month(2026, 1, -1), (2025, 12));
        assert_eq!(shift_month(2026, 6, -18), (2024, 12));
    }

    #[test]
    fn grid_starts_on_sunday() {
        // 2026-03-01 is a Sunday, 2026-04-01 a Wednesday.
        assert_eq!(leading_blanks(2026, 3), 0);
        assert_eq!(leading_blanks(2026, 4), 3);
    }

    #[test]
    fn flags_mark_exactly_main_and_task_days() {
        let start = NaiveDate::from_ymd_opt(2026, 3, 10).expect("valid date");
        let config =
            MainReminderConfig::daily_interval("Quarterly", TimeOfDay::new(9, 0), start, 90, 1);
        let task = TaskReminder::new(
            1,
            "Taxes".to_string(),
            Utc.with_ymd_and_hms(2026, 3, 21, 17, 0, 0)
                .single()
                .expect("valid timestamp"),
        );

        let flags = month_flags(2026, 3, &config, &[task], &Utc);
        assert_eq!(flags.len(), 31);
        for (day, flag) in &flags {
            let expected = DayFlags {
                has_main: *day == 10,
                has_task: *day == 21,
            };
            assert_eq!(*flag, expected, "day {day}");
        }
    }

    #[test]
    fn inactive_config_and_tasks_leave_month_empty() {
        let mut config = MainReminderConfig::hourly("Move", 0, &[Weekday::Mon]);
        config.active = false;
        let mut task = TaskReminder::new(
            1,
            "Off".to_string(),
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
                .single()
                .expect("valid timestamp"),
        );
        task.active = false;

        let flags = month_flags(2026, 3, &config, &[task], &Utc);
        assert!(flags.values().all(|flag| !flag.any()));
    }
}
