use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{trace, warn};

use crate::datetime::{local_midnight, resolve_local};
use crate::recurrence::is_active_day;
use crate::reminder::{
    MAX_OCCURRENCES_PER_DAY, MainReminderConfig, RepeatType, TaskId, TaskReminder,
};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Main,
    Task,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    At(DateTime<Utc>),
    /// Hourly main reminder: fires every hour at this minute.
    EveryHour { minute: u32 },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Occurrence {
    pub source: Source,
    pub message: String,
    pub trigger: Trigger,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

/// Wall-clock reading of the `index`-th main occurrence on `date`.
///
/// Hours past 23 carry into the following day. `None` when the configured
/// time is out of range or the reading falls outside chrono's calendar.
pub fn main_slot(
    date: NaiveDate,
    config: &MainReminderConfig,
    index: i64,
) -> Option<NaiveDateTime> {
    if !config.time_of_day.is_valid() {
        return None;
    }
    let hours = i64::from(config.time_of_day.hour).checked_add(index)?;
    local_midnight(date)
        .checked_add_signed(Duration::try_hours(hours)?)?
        .checked_add_signed(Duration::minutes(i64::from(config.time_of_day.minute)))
}

/// Concrete instants of a `DailyInterval` main reminder on `date`, in slot
/// order.
///
/// Empty for hourly configs, inactive days, and non-positive counts. At most
/// [`MAX_OCCURRENCES_PER_DAY`] slots are produced, and expansion stops at
/// the first slot that cannot be represented.
pub fn main_instants<'a, Tz: TimeZone>(
    date: NaiveDate,
    config: &'a MainReminderConfig,
    tz: &'a Tz,
) -> impl Iterator<Item = DateTime<Tz>> + 'a {
    let count = if config.repeat_type == RepeatType::DailyInterval && is_active_day(date, config)
    {
        config.occurrences_per_active_day.clamp(0, MAX_OCCURRENCES_PER_DAY)
    } else {
        0
    };

    (0..count)
        .map_while(move |index| main_slot(date, config, index))
        .filter_map(move |slot| resolve_local(tz, slot))
}

/// Everything that lands on `date`, ordered by time of day.
///
/// The hourly marker is placed at the configured `hour:minute`; entries with
/// equal times keep their insertion order, main reminder first.
#[tracing::instrument(skip(config, tasks, tz), fields(tasks = tasks.len()))]
pub fn occurrences_on_date<Tz: TimeZone>(
    date: NaiveDate,
    config: &MainReminderConfig,
    tasks: &[TaskReminder],
    tz: &Tz,
) -> Vec<Occurrence> {
    let mut keyed: Vec<(NaiveDateTime, Occurrence)> = Vec::new();

    if is_active_day(date, config) {
        match config.repeat_type {
            RepeatType::Hourly => match main_slot(date, config, 0) {
                Some(slot) => keyed.push((
                    slot,
                    Occurrence {
                        source: Source::Main,
                        message: config.message.clone(),
                        trigger: Trigger::EveryHour {
                            minute: config.time_of_day.minute,
                        },
                        task_id: None,
                    },
                )),
                None => warn!(time = ?config.time_of_day, "main reminder time out of range"),
            },
            RepeatType::DailyInterval => {
                for instant in main_instants(date, config, tz) {
                    keyed.push((
                        instant.naive_local(),
                        Occurrence {
                            source: Source::Main,
                            message: config.message.clone(),
                            trigger: Trigger::At(instant.with_timezone(&Utc)),
                            task_id: None,
                        },
                    ));
                }
            }
        }
    }

    for task in tasks.iter().filter(|task| task.active) {
        let local = task.timestamp.with_timezone(tz);
        if local.date_naive() != date {
            continue;
        }
        trace!(task_id = task.id, "task lands on date");
        keyed.push((
            local.naive_local(),
            Occurrence {
                source: Source::Task,
                message: task.message.clone(),
                trigger: Trigger::At(task.timestamp),
                task_id: Some(task.id),
            },
        ));
    }

    keyed.sort_by_key(|(key, _)| *key);
    keyed.into_iter().map(|(_, occurrence)| occurrence).collect()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc, Weekday};
    use chrono_tz::America::New_York;

    use super::{Source, Trigger, main_instants, occurrences_on_date};
    use crate::reminder::{MAX_OCCURRENCES_PER_DAY, MainReminderConfig, TaskReminder, TimeOfDay};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn daily_interval_expands_count_hours() {
        let day = date(2026, 4, 1);
        let config =
            MainReminderConfig::daily_interval("Meds", TimeOfDay::new(9, 0), day, 1, 2);

        let occurrences = occurrences_on_date(day, &config, &[], &Utc);
        let triggers: Vec<Trigger> = occurrences.iter().map(|o| o.trigger).collect();
        assert_eq!(
            triggers,
            vec![
                Trigger::At(at(2026, 4, 1, 9, 0)),
                Trigger::At(at(2026, 4, 1, 10, 0)),
            ]
        );
        assert!(occurrences.iter().all(|o| o.source == Source::Main));
    }

    #[test]
    fn late_occurrences_roll_into_next_day() {
        let day = date(2026, 4, 1);
        let config =
            MainReminderConfig::daily_interval("Night", TimeOfDay::new(23, 15), day, 1, 3);

        let occurrences = occurrences_on_date(day, &config, &[], &Utc);
        assert_eq!(occurrences.len(), 3);
        assert_eq!(occurrences[2].trigger, Trigger::At(at(2026, 4, 2, 1, 15)));
    }

    #[test]
    fn non_positive_count_yields_nothing() {
        let day = date(2026, 4, 1);
        let config =
            MainReminderConfig::daily_interval("Meds", TimeOfDay::new(9, 0), day, 1, 0);
        assert!(occurrences_on_date(day, &config, &[], &Utc).is_empty());
    }

    #[test]
    fn merges_and_sorts_main_and_tasks() {
        // 2026-04-01 is a Wednesday.
        let day = date(2026, 4, 1);
        let mut config = MainReminderConfig::hourly("Posture", 0, &[Weekday::Wed]);
        config.time_of_day = TimeOfDay::new(12, 0);

        let mut inactive = TaskReminder::new(4, "Cancelled".to_string(), at(2026, 4, 1, 8, 0));
        inactive.active = false;
        let tasks = vec![
            TaskReminder::new(1, "Lunch".to_string(), at(2026, 4, 1, 12, 0)),
            TaskReminder::new(2, "Standup".to_string(), at(2026, 4, 1, 9, 30)),
            TaskReminder::new(3, "Tomorrow".to_string(), at(2026, 4, 2, 9, 30)),
            inactive,
        ];

        let occurrences = occurrences_on_date(day, &config, &tasks, &Utc);
        let summary: Vec<(Source, &str)> = occurrences
            .iter()
            .map(|o| (o.source, o.message.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Source::Task, "Standup"),
                (Source::Main, "Posture"),
                (Source::Task, "Lunch"),
            ]
        );
        assert_eq!(occurrences[1].trigger, Trigger::EveryHour { minute: 0 });
        assert_eq!(occurrences[2].task_id, Some(1));
    }

    #[test]
    fn inactive_day_only_lists_tasks() {
        let day = date(2026, 4, 2);
        let config = MainReminderConfig::hourly("Posture", 0, &[Weekday::Wed]);
        let tasks = vec![TaskReminder::new(
            3,
            "Tomorrow".to_string(),
            at(2026, 4, 2, 9, 30),
        )];

        let occurrences = occurrences_on_date(day, &config, &tasks, &Utc);
        assert_eq!(occurrences.len(), 1);
        assert_eq!(occurrences[0].source, Source::Task);
    }

    #[test]
    fn out_of_range_time_yields_no_main_occurrence() {
        let day = date(2026, 1, 1);
        let mut config =
            MainReminderConfig::daily_interval("Broken", TimeOfDay::new(9, 0), day, 1, 1);
        config.time_of_day = TimeOfDay::new(4_000_000_000, 0);
        let tasks = vec![TaskReminder::new(1, "Still here".to_string(), at(2026, 1, 1, 8, 0))];

        let occurrences = occurrences_on_date(day, &config, &tasks, &Utc);
        assert_eq!(occurrences.len(), 1);
        assert_eq!(occurrences[0].source, Source::Task);

        let mut hourly = MainReminderConfig::hourly("Broken", 0, &[Weekday::Thu]);
        hourly.time_of_day = TimeOfDay::new(9, 75);
        assert!(occurrences_on_date(day, &hourly, &[], &Utc).is_empty());
    }

    #[test]
    fn huge_count_is_capped_per_day() {
        let day = date(2026, 4, 1);
        let config = MainReminderConfig::daily_interval(
            "Spam",
            TimeOfDay::new(0, 0),
            day,
            1,
            1_000_000_000,
        );

        assert_eq!(
            main_instants(day, &config, &Utc).count() as i64,
            MAX_OCCURRENCES_PER_DAY
        );
    }

    #[test]
    fn slot_in_spring_forward_gap_is_skipped() {
        // 2026-03-08 02:00 EST jumps to 03:00 EDT in New York.
        let day = date(2026, 3, 8);
        let config =
            MainReminderConfig::daily_interval("Gap", TimeOfDay::new(2, 30), day, 1, 1);
        assert!(occurrences_on_date(day, &config, &[], &New_York).is_empty());

        let two = MainReminderConfig::daily_interval("Gap", TimeOfDay::new(1, 30), day, 1, 2);
        let triggers: Vec<Trigger> = occurrences_on_date(day, &two, &[], &New_York)
            .iter()
            .map(|o| o.trigger)
            .collect();
        // 01:30 EST is 06:30 UTC; 02:30 does not exist.
        assert_eq!(triggers, vec![Trigger::At(at(2026, 3, 8, 6, 30))]);
    }

    #[test]
    fn repeated_fall_back_slot_uses_earlier_instant() {
        // 2026-11-01 01:00-02:00 happens twice in New York; EDT comes first.
        let day = date(2026, 11, 1);
        let config =
            MainReminderConfig::daily_interval("Fold", TimeOfDay::new(1, 30), day, 1, 1);

        let occurrences = occurrences_on_date(day, &config, &[], &New_York);
        assert_eq!(occurrences.len(), 1);
        assert_eq!(occurrences[0].trigger, Trigger::At(at(2026, 11, 1, 5, 30)));
    }
}
