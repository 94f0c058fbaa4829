use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use chrono::Weekday;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::datetime::{parse_clock_time, parse_weekday_name};
use crate::reminder::{MAX_OCCURRENCES_PER_DAY, RepeatType, TaskId, TimeOfDay};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "cadence",
    version,
    about = "Cadence: one recurring reminder and any number of one-off tasks",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rcfile", global = true)]
    pub rcfile: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show or change the recurring main reminder
    #[command(subcommand)]
    Main(MainCommand),

    /// Manage one-off task reminders
    #[command(subcommand)]
    Task(TaskCommand),

    /// List everything that fires on one day
    Day {
        #[arg(default_value = "today")]
        date: String,
    },

    /// Month calendar with reminder markers
    Month {
        /// YYYY-MM, a month name, or this/next/prev
        #[arg(default_value = "this")]
        month: String,
    },

    /// Print the time left until the next reminder
    Next,

    /// Live countdown to the next reminder (Ctrl-C to stop)
    Countdown,

    /// Print the effective configuration
    Show,
}

#[derive(Subcommand, Debug, Clone)]
pub enum MainCommand {
    Show,
    Set(MainSetArgs),
    /// Flip the main reminder on or off
    Toggle,
}

#[derive(Args, Debug, Clone, Default)]
pub struct MainSetArgs {
    #[arg(long)]
    pub message: Option<String>,

    /// HH:MM, 24-hour or with am/pm
    #[arg(long, value_parser = parse_time_of_day)]
    pub time: Option<TimeOfDay>,

    #[arg(long, value_enum)]
    pub repeat: Option<RepeatType>,

    /// Comma-separated weekdays for hourly repeats; "none" clears them
    #[arg(long)]
    pub days: Option<String>,

    #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
    pub interval: Option<i64>,

    /// Occurrences per active day, one hour apart (at most 24)
    #[arg(long, value_parser = clap::value_parser!(i64).range(1..=MAX_OCCURRENCES_PER_DAY))]
    pub count: Option<i64>,

    /// First active day (YYYY-MM-DD, today, ...) or "none"
    #[arg(long)]
    pub start: Option<String>,

    #[arg(long, conflicts_with = "off")]
    pub on: bool,

    #[arg(long)]
    pub off: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommand {
    Add {
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,

        /// When the task fires (e.g. "2026-05-01 14:00", tomorrow, +2h, 3:15pm)
        #[arg(long)]
        at: String,
    },
    List,
    Edit {
        id: TaskId,

        #[arg(long)]
        message: Option<String>,

        #[arg(long)]
        at: Option<String>,
    },
    Enable {
        id: TaskId,
    },
    Disable {
        id: TaskId,
    },
    Delete {
        id: TaskId,
    },
}

pub fn parse_time_of_day(raw: &str) -> Result<TimeOfDay, String> {
    parse_clock_time(raw)
        .map(|(hour, minute)| TimeOfDay::new(hour, minute))
        .ok_or_else(|| format!("invalid time {raw:?}; expected HH:MM"))
}

/// Parses a comma-separated weekday list; `none` yields an empty list.
pub fn parse_weekday_list(raw: &str) -> anyhow::Result<Vec<Weekday>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(vec![]);
    }

    let mut days = Vec::new();
    for token in trimmed.split(',') {
        let lower = token.trim().to_ascii_lowercase();
        let day = match lower.as_str() {
            "all" | "every" => {
                return Ok(vec![
                    Weekday::Mon,
                    Weekday::Tue,
                    Weekday::Wed,
                    Weekday::Thu,
                    Weekday::Fri,
                    Weekday::Sat,
                    Weekday::Sun,
                ]);
            }
            other => parse_weekday_name(other)
                .ok_or_else(|| anyhow!("unknown weekday: {}", token.trim()))?,
        };
        if !days.contains(&day) {
            days.push(day);
        }
    }
    Ok(days)
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls bare `rc.key=value` / `rc.key:value` tokens out of the argument
/// list before clap sees them.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
