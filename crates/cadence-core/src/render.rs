use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, TimeZone};
use unicode_width::UnicodeWidthStr;

use crate::calendar::{DayFlags, leading_blanks};
use crate::config::Config;
use crate::countdown::CountdownState;
use crate::datetime::{format_clock, weekday_name};
use crate::occurrence::{Occurrence, Source, Trigger};
use crate::reminder::{MainReminderConfig, RepeatType, TaskReminder};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or("on");
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, config))]
    pub fn print_main(&mut self, config: &MainReminderConfig) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let status = if config.active {
            self.paint("on", "32")
        } else {
            self.paint("off", "31")
        };
        writeln!(out, "message   {}", config.message)?;
        writeln!(out, "status    {status}")?;
        writeln!(
            out,
            "time      {:02}:{:02}",
            config.time_of_day.hour, config.time_of_day.minute
        )?;

        match config.repeat_type {
            RepeatType::Hourly => {
                let days = config
                    .days_of_week
                    .iter()
                    .map(|day| weekday_name(*day))
                    .collect::<Vec<_>>()
                    .join(", ");
                writeln!(out, "repeat    hourly")?;
                writeln!(out, "days      {days}")?;
            }
            RepeatType::DailyInterval => {
                writeln!(out, "repeat    every {} day(s)", config.interval_days)?;
                writeln!(out, "count     {}", config.occurrences_per_active_day)?;
                writeln!(
                    out,
                    "start     {}",
                    config
                        .start_date
                        .map(|date| date.format("%Y-%m-%d").to_string())
                        .unwrap_or_else(|| "-".to_string())
                )?;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, tasks, now))]
    pub fn print_task_table<Tz: TimeZone>(
        &mut self,
        tasks: &[TaskReminder],
        now: &DateTime<Tz>,
    ) -> anyhow::Result<()>
    where
        Tz::Offset: std::fmt::Display,
    {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "When".to_string(),
            "Active".to_string(),
            "Message".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let local = task.timestamp.with_timezone(&now.timezone());
            let when = local.format("%Y-%m-%d %H:%M").to_string();
            let when = if task.active && local < *now {
                self.paint(&when, "31")
            } else {
                when
            };
            let active = if task.active { "yes" } else { "no" }.to_string();

            rows.push(vec![
                self.paint(&task.id.to_string(), "33"),
                when,
                active,
                task.message.clone(),
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, occurrences, tz))]
    pub fn print_day<Tz: TimeZone>(
        &mut self,
        date: NaiveDate,
        occurrences: &[Occurrence],
        tz: &Tz,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", date.format("%A, %B %-d, %Y"))?;

        if occurrences.is_empty() {
            writeln!(out, "No reminders for this day.")?;
            return Ok(());
        }

        let headers = vec![
            "Type".to_string(),
            "Time".to_string(),
            "ID".to_string(),
            "Message".to_string(),
        ];
        let rows = occurrences
            .iter()
            .map(|occurrence| {
                let kind = match occurrence.source {
                    Source::Main => self.paint("main", "36"),
                    Source::Task => self.paint("task", "35"),
                };
                vec![
                    kind,
                    trigger_label(&occurrence.trigger, tz),
                    occurrence
                        .task_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    occurrence.message.clone(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, flags))]
    pub fn print_month(
        &mut self,
        year: i32,
        month: u32,
        flags: &BTreeMap<u32, DayFlags>,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for line in month_grid_lines(year, month, flags, today, |text| self.paint(text, "7")) {
            writeln!(out, "{line}")?;
        }
        writeln!(out)?;
        writeln!(out, "* main reminder   + task reminder")?;
        Ok(())
    }

    pub fn print_countdown(&mut self, state: &CountdownState, live: bool) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if live && io::stdout().is_terminal() {
            write!(out, "\r\x1b[2K{state}")?;
            out.flush()?;
        } else {
            writeln!(out, "{state}")?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// Time column for an occurrence, in the wall clock of `tz`.
pub fn trigger_label<Tz: TimeZone>(trigger: &Trigger, tz: &Tz) -> String {
    match trigger {
        Trigger::At(instant) => format_clock(&instant.with_timezone(tz)),
        Trigger::EveryHour { minute } => format!("Every hour at {minute:02} past the hour"),
    }
}

/// Sunday-first month grid. Each cell is the day number followed by `*`
/// (main reminder) and `+` (task reminder) markers; `highlight` decorates
/// today's cell.
pub fn month_grid_lines<F>(
    year: i32,
    month: u32,
    flags: &BTreeMap<u32, DayFlags>,
    today: NaiveDate,
    highlight: F,
) -> Vec<String>
where
    F: Fn(&str) -> String,
{
    let title = MONTH_NAMES
        .get(month.saturating_sub(1) as usize)
        .map(|name| format!("{name} {year}"))
        .unwrap_or_else(|| format!("{year}-{month:02}"));

    let mut lines = vec![
        format!("{title:^34}"),
        ["Su", "Mo", "Tu", "We", "Th", "Fr", "Sa"]
            .iter()
            .map(|name| format!("{name:<5}"))
            .collect::<String>()
            .trim_end()
            .to_string(),
    ];

    let mut row: Vec<String> = (0..leading_blanks(year, month))
        .map(|_| " ".repeat(4))
        .collect();

    for (day, flag) in flags {
        let cell = format!(
            "{day:>2}{}{}",
            if flag.has_main { '*' } else { ' ' },
            if flag.has_task { '+' } else { ' ' }
        );
        let is_today = NaiveDate::from_ymd_opt(year, month, *day) == Some(today);
        row.push(if is_today { highlight(&cell) } else { cell });

        if row.len() == 7 {
            lines.push(row.join(" ").trim_end().to_string());
            row.clear();
        }
    }
    if !row.is_empty() {
        lines.push(row.join(" ").trim_end().to_string());
    }

    lines
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
