use chrono::{Datelike, NaiveDate};

use crate::reminder::{MainReminderConfig, RepeatType};

/// Whether `date` is a day on which the main reminder fires.
///
/// Incomplete configs (no start date, non-positive interval, no weekdays)
/// are simply never active. Interval days are counted in both directions
/// from the start date, so dates before it can match as well.
pub fn is_active_day(date: NaiveDate, config: &MainReminderConfig) -> bool {
    if !config.active {
        return false;
    }

    match config.repeat_type {
        RepeatType::Hourly => config.days_of_week.contains(&date.weekday()),
        RepeatType::DailyInterval => {
            let Some(start) = config.start_date else {
                return false;
            };
            if config.interval_days < 1 {
                return false;
            }
            let diff_days = date.signed_duration_since(start).num_days().abs();
            diff_days % config.interval_days == 0
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Duration, NaiveDate, Weekday};

    use super::is_active_day;
    use crate::reminder::{MainReminderConfig, TimeOfDay};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn hourly_follows_selected_weekdays() {
        let config = MainReminderConfig::hourly("Stand up", 0, &[Weekday::Mon, Weekday::Wed]);
        let start = date(2026, 3, 1);

        for offset in 0..28 {
            let day = start + Duration::days(offset);
            let expected = matches!(day.weekday(), Weekday::Mon | Weekday::Wed);
            assert_eq!(is_active_day(day, &config), expected, "{day}");
        }
    }

    #[test]
    fn hourly_without_weekdays_is_never_active() {
        let config = MainReminderConfig::hourly("Stand up", 0, &[]);
        assert!(!is_active_day(date(2026, 3, 2), &config));
    }

    #[test]
    fn daily_interval_repeats_every_n_days() {
        let start = date(2026, 1, 10);
        let config =
            MainReminderConfig::daily_interval("Water plants", TimeOfDay::new(9, 0), start, 3, 1);

        assert!(is_active_day(start, &config));
        assert!(!is_active_day(start + Duration::days(1), &config));
        assert!(!is_active_day(start + Duration::days(2), &config));
        assert!(is_active_day(start + Duration::days(3), &config));
        assert!(is_active_day(start + Duration::days(6), &config));
    }

    #[test]
    fn daily_interval_counts_backwards_from_start() {
        let start = date(2026, 1, 10);
        let config =
            MainReminderConfig::daily_interval("Water plants", TimeOfDay::new(9, 0), start, 3, 1);

        assert!(is_active_day(start - Duration::days(3), &config));
        assert!(!is_active_day(start - Duration::days(4), &config));
    }

    #[test]
    fn degenerate_configs_are_never_active() {
        let start = date(2026, 1, 10);
        let mut config =
            MainReminderConfig::daily_interval("Water plants", TimeOfDay::new(9, 0), start, 0, 1);
        assert!(!is_active_day(start, &config));

        config.interval_days = 2;
        config.start_date = None;
        assert!(!is_active_day(start, &config));

        config.start_date = Some(start);
        config.active = false;
        assert!(!is_active_day(start, &config));
    }
}
