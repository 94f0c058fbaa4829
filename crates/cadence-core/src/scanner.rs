use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::datetime::{local_midnight, resolve_local};
use crate::occurrence::main_instants;
use crate::recurrence::is_active_day;
use crate::reminder::{MainReminderConfig, RepeatType, TaskReminder};

/// Number of days, starting today, searched for the next main reminder.
pub const HORIZON_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct NextTrigger {
    pub instant: DateTime<Utc>,
    /// Less than a whole second remains; the caller should treat the trigger
    /// as fired and evaluate again instead of showing a zero countdown.
    pub is_imminent: bool,
}

impl NextTrigger {
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.instant - now
    }
}

/// Earliest trigger strictly after `now` across the main reminder and all
/// active tasks, or `None` when nothing fires within the horizon.
#[tracing::instrument(skip(config, tasks, now), fields(tasks = tasks.len()))]
pub fn next_trigger<Tz: TimeZone>(
    config: &MainReminderConfig,
    tasks: &[TaskReminder],
    now: &DateTime<Tz>,
) -> Option<NextTrigger> {
    let now_utc = now.with_timezone(&Utc);

    let main = if config.active {
        match config.repeat_type {
            RepeatType::Hourly => next_hourly_mark(config, now),
            RepeatType::DailyInterval => next_interval_instant(config, now),
        }
    } else {
        None
    };
    let main = main.map(|instant| instant.with_timezone(&Utc));

    let task = tasks
        .iter()
        .filter(|task| task.active && task.timestamp > now_utc)
        .map(|task| task.timestamp)
        .min();

    let best = match (main, task) {
        (Some(main), Some(task)) => Some(main.min(task)),
        (main, task) => main.or(task),
    }?;

    let is_imminent = (best - now_utc).num_seconds() <= 0;
    debug!(instant = %best, is_imminent, "next trigger");
    Some(NextTrigger {
        instant: best,
        is_imminent,
    })
}

/// Hour marks only count on the configured weekdays, the same rule the
/// calendar and day views apply.
fn next_hourly_mark<Tz: TimeZone>(
    config: &MainReminderConfig,
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    if !config.time_of_day.is_valid() {
        warn!(time = ?config.time_of_day, "main reminder time out of range");
        return None;
    }

    let tz = now.timezone();
    let today = now.date_naive();
    let minute = Duration::minutes(i64::from(config.time_of_day.minute));

    for offset in 0..HORIZON_DAYS {
        let date = shift_days(today, offset)?;
        if !is_active_day(date, config) {
            continue;
        }

        let first_hour = if offset == 0 { now.hour() } else { 0 };
        for hour in first_hour..24 {
            let Some(slot) = local_midnight(date)
                .checked_add_signed(Duration::hours(i64::from(hour)) + minute)
            else {
                continue;
            };
            let Some(candidate) = resolve_local(&tz, slot) else {
                continue;
            };
            if candidate > *now {
                trace!(offset, hour, "hourly mark found");
                return Some(candidate);
            }
        }
    }

    debug!(horizon = HORIZON_DAYS, "no hourly mark within horizon");
    None
}

fn next_interval_instant<Tz: TimeZone>(
    config: &MainReminderConfig,
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let today = now.date_naive();
    let mut best: Option<DateTime<Tz>> = None;

    for offset in 0..HORIZON_DAYS {
        let date = shift_days(today, offset)?;
        if !is_active_day(date, config) {
            continue;
        }

        // Slots ascend, so the first one after `now` is this day's earliest.
        if let Some(instant) = main_instants(date, config, &tz).find(|instant| instant > now)
            && best.as_ref().is_none_or(|current| instant < *current)
        {
            best = Some(instant);
        }

        // Later days only produce instants from their own midnight onwards.
        let Some(next_midnight) = local_midnight(date).checked_add_signed(Duration::days(1))
        else {
            return best;
        };
        if let Some(found) = &best
            && found.naive_local() < next_midnight
        {
            trace!(offset, "stopping scan at first active day with a trigger");
            return best;
        }
    }

    if best.is_none() {
        debug!(
            horizon = HORIZON_DAYS,
            "no interval occurrence within horizon"
        );
    }
    best
}

fn shift_days(date: NaiveDate, offset: i64) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::days(offset))
}
