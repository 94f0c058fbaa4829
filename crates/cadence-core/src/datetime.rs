use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Timelike,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;

pub const TIMEZONE_ENV_VAR: &str =
  "CADENCE_TIMEZONE";

/// Picks the evaluation clock: the
/// environment wins over the rc value,
/// and `None` means the host's local
/// clock.
pub fn configured_timezone(
  rc_value: Option<&str>
) -> Option<Tz> {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return Some(tz);
  }

  rc_value.and_then(|raw| {
    parse_timezone(raw, "rc:timezone")
  })
}

pub fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured evaluation timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

#[must_use]
pub fn local_midnight(
  date: NaiveDate
) -> NaiveDateTime {
  date.and_time(NaiveTime::MIN)
}

/// Maps a wall-clock reading onto an
/// instant. Readings skipped by a DST
/// gap have no instant; repeated ones
/// resolve to the earlier instant.
pub fn resolve_local<Tz2: TimeZone>(
  tz: &Tz2,
  local_naive: NaiveDateTime
) -> Option<DateTime<Tz2>> {
  match tz
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Some(local_dt)
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::debug!(
        local = %local_naive,
        "ambiguous local datetime; using earliest"
      );
      Some(if first <= second {
        first
      } else {
        second
      })
    }
    | LocalResult::None => {
      tracing::debug!(
        local = %local_naive,
        "local datetime does not exist; skipping"
      );
      None
    }
  }
}

fn to_utc_from_local<Tz2: TimeZone>(
  tz: &Tz2,
  local_naive: NaiveDateTime,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  resolve_local(tz, local_naive)
    .map(|dt| dt.with_timezone(&Utc))
    .ok_or_else(|| {
      anyhow!(
        "local datetime does not \
         exist in the evaluation \
         timezone: {context}"
      )
    })
}

#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_date_expr<Tz2: TimeZone>(
  input: &str,
  now: &DateTime<Tz2>
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let tz = now.timezone();
  let today = now.date_naive();

  match lower.as_str() {
    | "now" => {
      return Ok(
        now.with_timezone(&Utc)
      );
    }
    | "today" => {
      return to_utc_from_local(
        &tz,
        local_midnight(today),
        "today"
      );
    }
    | "tomorrow" => {
      return to_utc_from_local(
        &tz,
        local_midnight(today)
          + Duration::days(1),
        "tomorrow"
      );
    }
    | "yesterday" => {
      return to_utc_from_local(
        &tz,
        local_midnight(today)
          - Duration::days(1),
        "yesterday"
      );
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    let target_date = next_weekday_date(
      today,
      target_weekday
    );
    return to_utc_from_local(
      &tz,
      local_midnight(target_date),
      "weekday-name"
    );
  }

  if let Some((hour, minute)) =
    parse_clock_time(token)
  {
    let clock =
      NaiveTime::from_hms_opt(
        hour, minute, 0
      )
      .ok_or_else(|| {
        anyhow!(
          "failed to construct clock \
           time candidate"
        )
      })?;
    let mut candidate =
      today.and_time(clock);
    if candidate <= now.naive_local() {
      candidate += Duration::days(1);
    }
    return to_utc_from_local(
      &tz,
      candidate,
      "clock-time"
    );
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dhm])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(token)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative unit")
      })?;

    let duration = match unit {
      | "d" => Duration::days(num),
      | "h" => Duration::hours(num),
      | "m" => Duration::minutes(num),
      | _ => {
        return Err(anyhow!(
          "unknown relative unit: \
           {unit}"
        ))
      }
    };

    let now_utc =
      now.with_timezone(&Utc);
    return Ok(
      if sign == "-" {
        now_utc - duration
      } else {
        now_utc + duration
      }
    );
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return to_utc_from_local(
      &tz,
      local_midnight(date),
      "date"
    );
  }

  for fmt in
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
  {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return to_utc_from_local(
        &tz, ndt, fmt
      );
    }
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     now/today/tomorrow/yesterday, \
     weekday names (e.g. monday), \
     clock times (e.g. 3:23pm or \
     15:23), +Nd/+Nh/+Nm, RFC3339, \
     YYYY-MM-DD, YYYY-MM-DDTHH:MM, \
     YYYY-MM-DD HH:MM"
  })
}

/// Resolves a calendar day in the wall
/// clock of `now`.
pub fn parse_day_expr<Tz2: TimeZone>(
  input: &str,
  now: &DateTime<Tz2>
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(date);
  }

  let instant =
    parse_date_expr(token, now)?;
  Ok(
    instant
      .with_timezone(&now.timezone())
      .date_naive()
  )
}

/// Resolves `YYYY-MM`, a month name,
/// or `this`/`next`/`prev` relative to
/// `today`.
pub fn parse_month_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<(i32, u32)> {
  let lower =
    input.trim().to_ascii_lowercase();

  match lower.as_str() {
    | "" | "this" | "current" => {
      return Ok((
        today.year(),
        today.month()
      ));
    }
    | "next" => {
      return Ok(crate::calendar::shift_month(
        today.year(),
        today.month(),
        1
      ));
    }
    | "prev" | "previous" | "last" => {
      return Ok(crate::calendar::shift_month(
        today.year(),
        today.month(),
        -1
      ));
    }
    | _ => {}
  }

  if let Some(month) =
    parse_month_name(&lower)
  {
    return Ok((today.year(), month));
  }

  let (year, month) = lower
    .split_once('-')
    .ok_or_else(|| {
      anyhow!(
        "unrecognized month \
         expression: {input} \
         (expected YYYY-MM)"
      )
    })?;
  let year: i32 = year
    .parse()
    .with_context(|| {
      format!("invalid year in {input}")
    })?;
  let month: u32 = month
    .parse()
    .with_context(|| {
      format!(
        "invalid month in {input}"
      )
    })?;
  if !(1..=12).contains(&month) {
    return Err(anyhow!(
      "month out of range: {month}"
    ));
  }

  Ok((year, month))
}

pub fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

#[must_use]
pub fn weekday_name(
  day: Weekday
) -> &'static str {
  match day {
    | Weekday::Mon => "Monday",
    | Weekday::Tue => "Tuesday",
    | Weekday::Wed => "Wednesday",
    | Weekday::Thu => "Thursday",
    | Weekday::Fri => "Friday",
    | Weekday::Sat => "Saturday",
    | Weekday::Sun => "Sunday"
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}

pub fn parse_clock_time(
  token: &str
) -> Option<(u32, u32)> {
  let clock_re = Regex::new(
    r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]m)?$",
  )
  .ok()?;
  let captures =
    clock_re.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = captures
    .name("minute")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  if minute > 59 {
    return None;
  }

  let hour = if let Some(ampm_match) =
    captures.name("ampm")
  {
    let ampm = ampm_match
      .as_str()
      .to_ascii_lowercase();
    if raw_hour == 0 || raw_hour > 12 {
      return None;
    }
    match ampm.as_str() {
      | "am" => {
        if raw_hour == 12 {
          0
        } else {
          raw_hour
        }
      }
      | "pm" => {
        if raw_hour == 12 {
          12
        } else {
          raw_hour + 12
        }
      }
      | _ => return None
    }
  } else {
    if raw_hour > 23 {
      return None;
    }
    raw_hour
  };

  Some((hour, minute))
}

fn parse_month_name(
  token: &str
) -> Option<u32> {
  match token.trim() {
    | "january" | "jan" => Some(1),
    | "february" | "feb" => Some(2),
    | "march" | "mar" => Some(3),
    | "april" | "apr" => Some(4),
    | "may" => Some(5),
    | "june" | "jun" => Some(6),
    | "july" | "jul" => Some(7),
    | "august" | "aug" => Some(8),
    | "september" | "sep" | "sept" => {
      Some(9)
    }
    | "october" | "oct" => Some(10),
    | "november" | "nov" => Some(11),
    | "december" | "dec" => Some(12),
    | _ => None
  }
}

#[must_use]
pub fn format_clock<Tz2: TimeZone>(
  dt: &DateTime<Tz2>
) -> String {
  format!(
    "{:02}:{:02}",
    dt.hour(),
    dt.minute()
  )
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    parse_date_expr,
    parse_day_expr,
    parse_month_expr
  };

  fn now() -> chrono::DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now")
  }

  #[test]
  fn parses_weekday_name() {
    let parsed =
      parse_date_expr("wednesday", &now())
        .expect("parse weekday");
    assert_eq!(
      parsed
        .format("%Y-%m-%d %H:%M")
        .to_string(),
      "2026-02-18 00:00"
    );
  }

  #[test]
  fn clock_time_rolls_to_tomorrow_once_passed()
  {
    let parsed =
      parse_date_expr("9:15am", &now())
        .expect("parse clock time");
    assert_eq!(
      parsed
        .format("%Y-%m-%d %H:%M")
        .to_string(),
      "2026-02-18 09:15"
    );

    let later =
      parse_date_expr("15:23", &now())
        .expect("parse clock time");
    assert_eq!(
      later
        .format("%Y-%m-%d %H:%M")
        .to_string(),
      "2026-02-17 15:23"
    );
  }

  #[test]
  fn parses_relative_and_absolute_forms() {
    let plus = parse_date_expr(
      "+90m",
      &now()
    )
    .expect("parse relative");
    assert_eq!(
      plus.format("%H:%M").to_string(),
      "13:30"
    );

    let absolute = parse_date_expr(
      "2026-03-01 08:45",
      &now()
    )
    .expect("parse absolute");
    assert_eq!(
      absolute
        .format("%Y-%m-%d %H:%M")
        .to_string(),
      "2026-03-01 08:45"
    );

    assert!(
      parse_date_expr("someday", &now())
        .is_err()
    );
  }

  #[test]
  fn day_and_month_expressions() {
    assert_eq!(
      parse_day_expr("tomorrow", &now())
        .expect("parse day"),
      NaiveDate::from_ymd_opt(
        2026, 2, 18
      )
      .expect("valid date")
    );

    let today = now().date_naive();
    assert_eq!(
      parse_month_expr("next", today)
        .expect("parse month"),
      (2026, 3)
    );
    assert_eq!(
      parse_month_expr("2025-12", today)
        .expect("parse month"),
      (2025, 12)
    );
    assert!(
      parse_month_expr("2025-13", today)
        .is_err()
    );
  }
}
