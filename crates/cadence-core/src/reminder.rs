use chrono::{DateTime, NaiveDate, TimeZone, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type TaskId = u64;

/// Upper bound on main occurrences per active day; one per hour of the day.
pub const MAX_OCCURRENCES_PER_DAY: i64 = 24;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RepeatType {
    #[default]
    Hourly,
    #[value(name = "daily-interval", alias = "daily_interval")]
    DailyInterval,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeOfDay {
    #[serde(serialize_with = "padded", deserialize_with = "clock_hour")]
    pub hour: u32,
    #[serde(serialize_with = "padded", deserialize_with = "clock_minute")]
    pub minute: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Self {
        Self { hour, minute }
    }

    pub fn is_valid(&self) -> bool {
        self.hour < 24 && self.minute < 60
    }
}

impl Default for TimeOfDay {
    fn default() -> Self {
        Self::new(9, 0)
    }
}

/// The single recurring reminder.
///
/// Field names on the wire follow the payloads the storage layer has always
/// exchanged (`time`, `days`, `interval`, `count`, `isActive`), so records
/// written by older clients load unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MainReminderConfig {
    #[serde(default)]
    pub message: String,

    #[serde(rename = "time", default)]
    pub time_of_day: TimeOfDay,

    #[serde(rename = "days", default, with = "weekday_names")]
    pub days_of_week: Vec<Weekday>,

    #[serde(default)]
    pub repeat_type: RepeatType,

    #[serde(rename = "interval", default = "default_interval", deserialize_with = "interval_days")]
    pub interval_days: i64,

    /// Missing or non-positive counts produce no occurrences.
    #[serde(rename = "count", default, deserialize_with = "occurrence_count")]
    pub occurrences_per_active_day: i64,

    #[serde(default, with = "optional_date")]
    pub start_date: Option<NaiveDate>,

    #[serde(rename = "isActive", default)]
    pub active: bool,
}

impl Default for MainReminderConfig {
    fn default() -> Self {
        Self {
            message: "Time for a break!".to_string(),
            time_of_day: TimeOfDay::default(),
            days_of_week: vec![],
            repeat_type: RepeatType::Hourly,
            interval_days: 1,
            occurrences_per_active_day: 1,
            start_date: None,
            active: false,
        }
    }
}

impl MainReminderConfig {
    pub fn hourly(message: &str, minute: u32, days: &[Weekday]) -> Self {
        Self {
            message: message.to_string(),
            time_of_day: TimeOfDay::new(0, minute),
            days_of_week: days.to_vec(),
            repeat_type: RepeatType::Hourly,
            active: true,
            ..Self::default()
        }
    }

    pub fn daily_interval(
        message: &str,
        time_of_day: TimeOfDay,
        start_date: NaiveDate,
        interval_days: i64,
        occurrences_per_active_day: i64,
    ) -> Self {
        Self {
            message: message.to_string(),
            time_of_day,
            days_of_week: vec![],
            repeat_type: RepeatType::DailyInterval,
            interval_days,
            occurrences_per_active_day,
            start_date: Some(start_date),
            active: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskReminder {
    pub id: TaskId,

    pub message: String,

    #[serde(rename = "dateTime")]
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "isActive", default = "default_true")]
    pub active: bool,
}

impl TaskReminder {
    pub fn new(id: TaskId, message: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            message,
            timestamp,
            active: true,
        }
    }

    /// Calendar date of the task in the wall clock of `tz`.
    pub fn local_date<Tz: TimeZone>(&self, tz: &Tz) -> NaiveDate {
        self.timestamp.with_timezone(tz).date_naive()
    }
}

/// Everything the engine reads for one evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub main: MainReminderConfig,
    #[serde(default)]
    pub tasks: Vec<TaskReminder>,
}

fn default_interval() -> i64 {
    1
}

fn default_true() -> bool {
    true
}

/// Integers arrive as numbers, numeric strings (form inputs), or null.
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Int(value)) => Ok(Some(value)),
        Some(Raw::Float(value)) => Ok(Some(value.trunc() as i64)),
        Some(Raw::Text(raw)) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<i64>()
                .map(Some)
                .map_err(|err| serde::de::Error::custom(format!("invalid integer {raw:?}: {err}")))
        }
    }
}

fn interval_days<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_int(deserializer)?.unwrap_or_else(default_interval))
}

fn occurrence_count<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let count = lenient_int(deserializer)?.unwrap_or(0);
    if count > MAX_OCCURRENCES_PER_DAY {
        tracing::warn!(
            count,
            max = MAX_OCCURRENCES_PER_DAY,
            "occurrence count too large; clamping"
        );
        return Ok(MAX_OCCURRENCES_PER_DAY);
    }
    Ok(count)
}

fn clock_hour<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    clock_component(deserializer, "hour", 23)
}

fn clock_minute<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    clock_component(deserializer, "minute", 59)
}

fn clock_component<'de, D>(deserializer: D, field: &str, max: u32) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = lenient_int(deserializer)?.unwrap_or(0);
    u32::try_from(value)
        .ok()
        .filter(|v| *v <= max)
        .ok_or_else(|| {
            serde::de::Error::custom(format!("{field} out of range 0-{max}: {value}"))
        })
}

fn padded<S>(value: &u32, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("{value:02}"))
}

mod weekday_names {
    use chrono::Weekday;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::datetime::{parse_weekday_name, weekday_name};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S>(days: &Vec<Weekday>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(days.iter().map(|day| weekday_name(*day)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Weekday>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default();
        let mut days = Vec::with_capacity(raw.len());
        for name in raw {
            match parse_weekday_name(&name.to_ascii_lowercase()) {
                Some(day) if !days.contains(&day) => days.push(day),
                Some(_) => {}
                None => tracing::warn!(name = %name, "ignoring unknown weekday name"),
            }
        }
        Ok(days)
    }
}

mod optional_date {
    use chrono::{DateTime, NaiveDate};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(value) => serializer.serialize_str(&value.format("%Y-%m-%d").to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(Some(date));
        }
        DateTime::parse_from_rfc3339(trimmed)
            .map(|dt| Some(dt.date_naive()))
            .map_err(|err| serde::de::Error::custom(format!("invalid start date {raw:?}: {err}")))
    }
}
